// src/placeholder.rs
//
// =============================================================================
// SDFORGE: PLACEHOLDER AST
// =============================================================================
//
// `{Name}` and `{ChunkName with field=Source[selector], field=Source, ...}`
// parsed into a small AST ahead of substitution, instead of a one-shot
// regex replace. Hand-written tokenizer: the grammar is small and fixed,
// so a char-by-char walk stays simpler than shepherding a regex through
// nested brackets.

use crate::error::EngineError;
use crate::selector::Selector;

/// One `field=Source[selector]` binding inside a chunk call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub field: String,
    pub source: String,
    pub selector: Option<Selector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `{Name}` or `{Name[selector]}` — a plain reference to an import or
    /// chunk field axis, optionally narrowed by a selector that narrows
    /// the per-placeholder iteration space.
    Simple { name: String, selector: Option<Selector> },
    /// `{ChunkName with field=Source[selector], ...}`.
    ChunkCall { name: String, bindings: Vec<Binding> },
}

impl Placeholder {
    pub fn simple(name: impl Into<String>) -> Self {
        Placeholder::Simple { name: name.into(), selector: None }
    }
}

/// One token of template body text: either literal text or a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    Placeholder(Placeholder),
}

/// Parses a template/chunk body into literal-text and placeholder tokens.
/// Brace-balanced: `{{` is not supported (the grammar has no escape), a
/// lone unmatched `{` or `}` is treated as literal text and is later
/// caught by the substitutor's post-pass unresolved-placeholder scan.
pub fn tokenize(body: &str) -> Result<Vec<Token>, EngineError> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '{' {
            if let Some(end) = find_matching_brace(&chars, i) {
                if !literal.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut literal)));
                }
                let inner: String = chars[i + 1..end].iter().collect();
                tokens.push(Token::Placeholder(parse_placeholder(&inner)?));
                i = end + 1;
                continue;
            }
        }
        literal.push(chars[i]);
        i += 1;
    }
    if !literal.is_empty() {
        tokens.push(Token::Text(literal));
    }
    Ok(tokens)
}

fn find_matching_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (offset, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_placeholder(inner: &str) -> Result<Placeholder, EngineError> {
    let trimmed = inner.trim();
    match trimmed.split_once(" with ") {
        Some((name, rest)) => {
            let name = name.trim().to_string();
            let bindings = parse_bindings(rest)?;
            Ok(Placeholder::ChunkCall { name, bindings })
        }
        None => match trimmed.find('[') {
            Some(bracket_start) => {
                if !trimmed.ends_with(']') {
                    return Err(EngineError::selector(format!(
                        "malformed selector in placeholder '{{{trimmed}}}': missing closing ']'"
                    )));
                }
                let name = trimmed[..bracket_start].trim().to_string();
                let sel_text = &trimmed[bracket_start + 1..trimmed.len() - 1];
                Ok(Placeholder::Simple {
                    name,
                    selector: Some(Selector::parse(sel_text)?),
                })
            }
            None => Ok(Placeholder::Simple { name: trimmed.to_string(), selector: None }),
        },
    }
}

/// Parses `field=Source[selector], field2=Source2` honoring brackets so
/// commas inside a selector (`[#1,2]`) don't split a binding in two.
fn parse_bindings(rest: &str) -> Result<Vec<Binding>, EngineError> {
    let mut bindings = Vec::new();
    for raw in split_top_level_commas(rest) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (field, value) = raw.split_once('=').ok_or_else(|| {
            EngineError::selector(format!("malformed binding '{raw}': expected field=Source"))
        })?;
        let field = field.trim().to_string();
        let value = value.trim();

        let (source, selector) = match value.find('[') {
            None => (value.to_string(), None),
            Some(bracket_start) => {
                if !value.ends_with(']') {
                    return Err(EngineError::selector(format!(
                        "malformed selector in binding '{raw}': missing closing ']'"
                    )));
                }
                let source = value[..bracket_start].to_string();
                let sel_text = &value[bracket_start + 1..value.len() - 1];
                (source, Some(Selector::parse(sel_text)?))
            }
        };
        bindings.push(Binding { field, source, selector });
    }
    Ok(bindings)
}

fn split_top_level_commas(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_plain_text() {
        let tokens = tokenize("a photo of a cat").unwrap();
        assert_eq!(tokens, vec![Token::Text("a photo of a cat".to_string())]);
    }

    #[test]
    fn tokenizes_simple_placeholder() {
        let tokens = tokenize("a photo of a {Subject}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Text("a photo of a ".to_string()),
                Token::Placeholder(Placeholder::simple("Subject")),
            ]
        );
    }

    #[test]
    fn tokenizes_simple_placeholder_with_selector() {
        let tokens = tokenize("{Expression[keys:happy,neutral]}").unwrap();
        match &tokens[0] {
            Token::Placeholder(Placeholder::Simple { name, selector }) => {
                assert_eq!(name, "Expression");
                assert_eq!(
                    *selector,
                    Some(crate::selector::Selector::Keys(vec![
                        "happy".to_string(),
                        "neutral".to_string()
                    ]))
                );
            }
            other => panic!("expected simple placeholder with selector, got {other:?}"),
        }
    }

    #[test]
    fn tokenizes_chunk_call_with_selector() {
        let tokens = tokenize("{Expression with mood=Moods[0]}").unwrap();
        match &tokens[0] {
            Token::Placeholder(Placeholder::ChunkCall { name, bindings }) => {
                assert_eq!(name, "Expression");
                assert_eq!(bindings.len(), 1);
                assert_eq!(bindings[0].field, "mood");
                assert_eq!(bindings[0].source, "Moods");
                assert!(bindings[0].selector.is_some());
            }
            other => panic!("expected chunk call, got {other:?}"),
        }
    }

    #[test]
    fn tokenizes_multiple_bindings_with_range_selector() {
        let tokens = tokenize("{Pose with angle=Angles[#0,2], limbs=Limbs}").unwrap();
        match &tokens[0] {
            Token::Placeholder(Placeholder::ChunkCall { bindings, .. }) => {
                assert_eq!(bindings.len(), 2);
                assert_eq!(bindings[0].field, "angle");
                assert_eq!(bindings[1].field, "limbs");
                assert!(bindings[1].selector.is_none());
            }
            other => panic!("expected chunk call, got {other:?}"),
        }
    }
}
