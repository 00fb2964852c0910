// src/chunks.rs
//
// =============================================================================
// SDFORGE: CHUNK RESOLVER
// =============================================================================
//
// Expands `{ChunkName}` / `{ChunkName with field=Source[selector], ...}`
// placeholders into text fragments, walking the placeholder AST from
// src/placeholder.rs top-down rather than doing ad-hoc string replace, so
// nested chunks inside chunk fields remain resolvable. Field resolution
// priority: (1) `with`-clause override, (2) chunk-declared default, (3)
// bubble up as an ordinary document-level placeholder -- the enclosing
// document is expected to supply an import of the same name. Restructures
// `dsl::expand_macros`'s recursive node-generation style around text
// fragments instead of graph nodes.

use crate::document::{ChunkDoc, ChunkField};
use crate::error::EngineError;
use crate::placeholder::{tokenize, Binding, Placeholder, Token};
use crate::selector::Selector;
use std::collections::{BTreeMap, HashMap};

/// Guards against runaway recursion from a chunk cycle (chunk A's body
/// invoking chunk B invoking chunk A, etc.) -- same bound as the
/// inheritance resolver's `implements` depth cap.
pub const MAX_CHUNK_EXPANSION_DEPTH: usize = 32;

/// A `with`-bound chunk field, registered as an independent enumeration
/// axis -- it contributes to the enumeration as if it were a top-level
/// placeholder.
#[derive(Debug, Clone)]
pub struct WithAxis {
    pub name: String,
    pub source_import: String,
    pub selector: Option<Selector>,
    /// The chunk field this binding feeds -- needed to pick the right
    /// sub-value out of a `multi_field` source entry at substitution time.
    pub field: String,
}

/// The result of expanding all chunk calls out of one body (`prompt` or
/// `negative_prompt`): fully chunk-free text (plain `{Name}` placeholders
/// may still remain, resolved later by the Substitutor), the `with`-bound
/// axes discovered along the way, and any selector attached directly to a
/// plain placeholder (`{Name[selector]}`).
#[derive(Debug, Clone, Default)]
pub struct ExpandedBody {
    pub text: String,
    pub with_axes: Vec<WithAxis>,
    pub selectors: BTreeMap<String, Selector>,
}

enum FieldResolution {
    Axis(String),
    Default(String),
}

pub fn expand_chunks(
    body: &str,
    chunks: &BTreeMap<String, ChunkDoc>,
) -> Result<ExpandedBody, EngineError> {
    let mut acc = ExpandedBody::default();
    let mut counter: HashMap<String, u32> = HashMap::new();
    let tokens = tokenize(body)?;
    let empty_scope = BTreeMap::new();
    let text = expand_token_stream(tokens, &empty_scope, chunks, &mut acc, 0, &mut counter)?;
    acc.text = text;
    Ok(acc)
}

fn resolve_chunk_def(
    chunks: &BTreeMap<String, ChunkDoc>,
    name: &str,
) -> Result<(BTreeMap<String, ChunkField>, String), EngineError> {
    let mut chain: Vec<ChunkDoc> = Vec::new();
    let mut visited: Vec<String> = Vec::new();
    let mut current = name.to_string();
    loop {
        if visited.contains(&current) {
            let mut shown = visited.clone();
            shown.push(current.clone());
            return Err(EngineError::validation(format!(
                "chunk inheritance cycle: {}",
                shown.join(" -> ")
            )));
        }
        if visited.len() >= MAX_CHUNK_EXPANSION_DEPTH {
            return Err(EngineError::validation(
                "chunk 'implements' chain exceeds maximum depth",
            ));
        }
        visited.push(current.clone());
        let doc = chunks
            .get(&current)
            .ok_or_else(|| EngineError::validation(format!("unknown chunk '{current}'")))?;
        chain.push(doc.clone());
        match doc.implements.clone() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    chain.reverse();

    let mut fields: BTreeMap<String, ChunkField> = BTreeMap::new();
    let mut body = String::new();
    for doc in chain {
        for (k, v) in doc.fields {
            fields.insert(k, v);
        }
        if !doc.body.trim().is_empty() {
            body = doc.body;
        }
    }
    Ok((fields, body))
}

fn expand_token_stream(
    tokens: Vec<Token>,
    field_scope: &BTreeMap<String, FieldResolution>,
    chunks: &BTreeMap<String, ChunkDoc>,
    acc: &mut ExpandedBody,
    depth: usize,
    counter: &mut HashMap<String, u32>,
) -> Result<String, EngineError> {
    let mut out = String::new();
    for tok in tokens {
        match tok {
            Token::Text(t) => out.push_str(&t),
            Token::Placeholder(Placeholder::Simple { name, selector }) => match field_scope.get(&name) {
                Some(FieldResolution::Axis(axis_name)) => {
                    out.push('{');
                    out.push_str(axis_name);
                    out.push('}');
                }
                Some(FieldResolution::Default(default_text)) => {
                    let inner = tokenize(default_text)?;
                    out.push_str(&expand_token_stream(
                        inner,
                        &BTreeMap::new(),
                        chunks,
                        acc,
                        depth + 1,
                        counter,
                    )?);
                }
                None => {
                    if chunks.contains_key(&name) {
                        out.push_str(&expand_chunk_call(&name, &[], chunks, acc, depth, counter)?);
                    } else {
                        if let Some(sel) = selector {
                            acc.selectors.entry(name.clone()).or_insert(sel);
                        }
                        out.push('{');
                        out.push_str(&name);
                        out.push('}');
                    }
                }
            },
            Token::Placeholder(Placeholder::ChunkCall { name, bindings }) => {
                out.push_str(&expand_chunk_call(&name, &bindings, chunks, acc, depth, counter)?);
            }
        }
    }
    Ok(out)
}

fn expand_chunk_call(
    name: &str,
    bindings: &[Binding],
    chunks: &BTreeMap<String, ChunkDoc>,
    acc: &mut ExpandedBody,
    depth: usize,
    counter: &mut HashMap<String, u32>,
) -> Result<String, EngineError> {
    if depth > MAX_CHUNK_EXPANSION_DEPTH {
        return Err(EngineError::validation(
            "chunk expansion exceeded maximum depth (possible cycle)",
        ));
    }
    let (field_defs, body) = resolve_chunk_def(chunks, name)?;
    let bound: BTreeMap<&str, &Binding> = bindings.iter().map(|b| (b.field.as_str(), b)).collect();

    let mut field_scope: BTreeMap<String, FieldResolution> = BTreeMap::new();
    for (fname, fdef) in &field_defs {
        if let Some(binding) = bound.get(fname.as_str()) {
            let axis_name = unique_axis_name(name, fname, counter);
            acc.with_axes.push(WithAxis {
                name: axis_name.clone(),
                source_import: binding.source.clone(),
                selector: binding.selector.clone(),
                field: fname.clone(),
            });
            field_scope.insert(fname.clone(), FieldResolution::Axis(axis_name));
        } else if let Some(default) = &fdef.default {
            field_scope.insert(fname.clone(), FieldResolution::Default(default.clone()));
        }
        // Neither bound nor defaulted: no entry -- bubbles up as an
        // ordinary document-level placeholder.
    }
    // A binding for a field the chunk never declared is simply inert; only
    // the three-tier priority order matters, not that every binding gets
    // consumed.

    let body_tokens = tokenize(&body)?;
    expand_token_stream(body_tokens, &field_scope, chunks, acc, depth + 1, counter)
}

fn unique_axis_name(chunk_name: &str, field: &str, counter: &mut HashMap<String, u32>) -> String {
    let base = format!("{chunk_name}.{field}");
    let count = counter.entry(base.clone()).or_insert(0);
    let name = if *count == 0 {
        base.clone()
    } else {
        format!("{base}#{count}")
    };
    *count += 1;
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkField;

    fn chunk(body: &str, fields: &[(&str, Option<&str>)]) -> ChunkDoc {
        let mut f = BTreeMap::new();
        for (name, default) in fields {
            f.insert(
                name.to_string(),
                ChunkField {
                    field_type: None,
                    default: default.map(|s| s.to_string()),
                },
            );
        }
        ChunkDoc {
            version: Some("2.0".to_string()),
            implements: None,
            fields: f,
            body: body.to_string(),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn simple_chunk_call_uses_default() {
        let mut chunks = BTreeMap::new();
        chunks.insert(
            "Expression".to_string(),
            chunk("expression: {mood}", &[("mood", Some("neutral"))]),
        );
        let expanded = expand_chunks("a photo, {Expression}", &chunks).unwrap();
        assert_eq!(expanded.text, "a photo, expression: neutral");
    }

    #[test]
    fn unbound_undefaulted_field_bubbles_up() {
        let mut chunks = BTreeMap::new();
        chunks.insert("Pose".to_string(), chunk("pose: {angle}", &[("angle", None)]));
        let expanded = expand_chunks("{Pose}", &chunks).unwrap();
        assert_eq!(expanded.text, "pose: {angle}");
    }

    #[test]
    fn with_binding_registers_axis() {
        let mut chunks = BTreeMap::new();
        chunks.insert(
            "Expression".to_string(),
            chunk("expression: {mood}", &[("mood", Some("neutral"))]),
        );
        let expanded =
            expand_chunks("{Expression with mood=Moods[#0,1]}", &chunks).unwrap();
        assert_eq!(expanded.with_axes.len(), 1);
        assert_eq!(expanded.with_axes[0].source_import, "Moods");
        assert!(expanded.text.contains(&expanded.with_axes[0].name));
    }

    #[test]
    fn nested_chunk_inside_default_expands() {
        let mut chunks = BTreeMap::new();
        chunks.insert(
            "Inner".to_string(),
            chunk("inner-text", &[]),
        );
        chunks.insert(
            "Outer".to_string(),
            chunk("outer: {body}", &[("body", Some("{Inner}"))]),
        );
        let expanded = expand_chunks("{Outer}", &chunks).unwrap();
        assert_eq!(expanded.text, "outer: inner-text");
    }

    #[test]
    fn chunk_implements_inherits_fields_and_body() {
        let mut chunks = BTreeMap::new();
        chunks.insert(
            "Base".to_string(),
            chunk("base: {mood}", &[("mood", Some("calm"))]),
        );
        let mut child = chunk("", &[]);
        child.implements = Some("Base".to_string());
        chunks.insert("Child".to_string(), child);
        let expanded = expand_chunks("{Child}", &chunks).unwrap();
        assert_eq!(expanded.text, "base: calm");
    }

    #[test]
    fn selector_on_plain_placeholder_is_captured() {
        let chunks = BTreeMap::new();
        let expanded = expand_chunks("{Expression[keys:happy,sad]}", &chunks).unwrap();
        assert_eq!(expanded.text, "{Expression}");
        assert!(expanded.selectors.contains_key("Expression"));
    }
}
