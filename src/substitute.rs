// src/substitute.rs
//
// =============================================================================
// SDFORGE: SUBSTITUTOR
// =============================================================================
//
// Replaces every remaining `{Name}` placeholder (chunks already expanded
// by src/chunks.rs) with its bound text, then normalizes. Walks the
// placeholder AST rather than doing ad-hoc string replace; unresolved-
// placeholder suggestion ranking is grounded in the pack's
// `thoughtgate-thoughtjack` scenario matcher, which ranks candidates with
// `strsim::damerau_levenshtein` the same way.

use crate::error::EngineError;
use crate::placeholder::{tokenize, Placeholder, Token};
use std::collections::BTreeMap;

/// Replaces every `{Name}` token with its bound text and normalizes the
/// result. Chunks must already be expanded -- a surviving `ChunkCall`
/// token is a bug in the caller, not a user-facing error.
pub fn substitute(body: &str, bindings: &BTreeMap<String, String>) -> Result<String, EngineError> {
    let tokens = tokenize(body)?;
    let mut out = String::new();
    for tok in tokens {
        match tok {
            Token::Text(t) => out.push_str(&t),
            Token::Placeholder(Placeholder::Simple { name, .. }) => match bindings.get(&name) {
                Some(value) => out.push_str(value),
                None => {
                    out.push('{');
                    out.push_str(&name);
                    out.push('}');
                }
            },
            Token::Placeholder(Placeholder::ChunkCall { name, .. }) => {
                return Err(EngineError::validation(format!(
                    "internal error: chunk call '{{{name} with ...}}' reached the substitutor unexpanded"
                )));
            }
        }
    }
    Ok(normalize(&out))
}

/// Collapses whitespace runs to a single space, collapses repeated commas
/// (with optional surrounding whitespace) into `, `, and trims leading/
/// trailing whitespace and punctuation. A single linear pass -- no regex
/// dependency for this hot path.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    let mut last_was_comma = false;

    for c in s.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
            continue;
        }
        if c == ',' {
            if last_was_comma {
                continue;
            }
            while out.ends_with(' ') {
                out.pop();
            }
            out.push(',');
            out.push(' ');
            last_was_space = true;
            last_was_comma = true;
            continue;
        }
        out.push(c);
        last_was_space = false;
        last_was_comma = false;
    }

    out.trim()
        .trim_matches(|c: char| c == ',' || c == '.' || c.is_whitespace())
        .to_string()
}

/// Scans for a surviving `{Name}` placeholder after substitution -- any
/// token still wrapped in braces at this point is an error. Returns the
/// first offending name, or `None` if the text is fully resolved.
pub fn find_unresolved(s: &str) -> Option<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            if let Some(rel_end) = chars[i + 1..].iter().position(|&c| c == '}') {
                let name: String = chars[i + 1..i + 1 + rel_end].iter().collect();
                if is_identifier(&name) {
                    return Some(name);
                }
            }
        }
        i += 1;
    }
    None
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Ranks `known` names by edit distance to `name`, returning up to
/// `limit` closest matches -- same crate/usage as the pack's
/// `thoughtgate-thoughtjack` scenario matcher.
pub fn suggest_candidates(name: &str, known: &[String], limit: usize) -> Vec<String> {
    let mut scored: Vec<(usize, &String)> = known
        .iter()
        .map(|k| (strsim::damerau_levenshtein(name, k), k))
        .collect();
    scored.sort_by_key(|(dist, _)| *dist);
    scored.into_iter().take(limit).map(|(_, k)| k.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_plain_placeholder() {
        let mut bindings = BTreeMap::new();
        bindings.insert("Expression".to_string(), "smiling".to_string());
        let out = substitute("portrait, {Expression}", &bindings).unwrap();
        assert_eq!(out, "portrait, smiling");
    }

    #[test]
    fn normalize_collapses_whitespace_and_commas() {
        assert_eq!(normalize("a,  , b   c"), "a, b c");
        assert_eq!(normalize("  , leading and trailing, . "), "leading and trailing");
    }

    #[test]
    fn normalize_is_idempotent() {
        let cases = [
            "a, b, c",
            "  ,,x,,  y  ",
            "already normal text",
            ",.,  ,.",
            "trailing comma,",
        ];
        for s in cases {
            let once = normalize(s);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for input {s:?}");
        }
    }

    #[test]
    fn finds_unresolved_placeholder() {
        assert_eq!(find_unresolved("a fully {Resolved} text").is_some(), true);
        assert_eq!(find_unresolved("a fully resolved text"), None);
    }

    #[test]
    fn suggests_closest_candidates() {
        let known = vec!["Expression".to_string(), "Outfit".to_string(), "Pose".to_string()];
        let suggestions = suggest_candidates("Outfitt", &known, 1);
        assert_eq!(suggestions, vec!["Outfit".to_string()]);
    }
}
