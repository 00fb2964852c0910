// src/validate.rs
//
// =============================================================================
// SDFORGE: VALIDATOR
// =============================================================================
//
// Two free functions, static (pre-enumeration) and per-variant (dynamic),
// grounded on `dsl::validate`'s "fail fast, collect nothing, return the
// first violation" style -- this engine's error categories are mutually
// exclusive per run, so first-error-wins is the right fit here too.

use crate::chunks::ExpandedBody;
use crate::document::FlatDoc;
use crate::error::EngineError;
use crate::imports::ResolvedImport;
use crate::placeholder::{tokenize, Placeholder, Token};
use crate::substitute::{find_unresolved, suggest_candidates};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet};

/// Cross-cutting static checks that hold before enumeration starts.
/// Version/required-field/enum-membership checks already happened in the
/// parser and the document model's typed fields; this function re-checks
/// what spans multiple modules: every surviving `{Name}` in either
/// expanded body resolves to a declared import or a `with`-bound axis, and
/// every selector attached to a name is in bounds for that name's set.
pub fn validate_static(
    imports: &BTreeMap<String, ResolvedImport>,
    positive: &ExpandedBody,
    negative: &ExpandedBody,
) -> Result<(), EngineError> {
    let mut known: BTreeSet<String> = imports.keys().cloned().collect();
    for axis in positive.with_axes.iter().chain(negative.with_axes.iter()) {
        known.insert(axis.name.clone());
    }
    let known_list: Vec<String> = known.iter().cloned().collect();

    for body in [positive, negative] {
        for tok in tokenize(&body.text)? {
            if let Token::Placeholder(Placeholder::Simple { name, .. }) = tok {
                if !known.contains(&name) {
                    let candidates = suggest_candidates(&name, &known_list, 3);
                    return Err(EngineError::unresolved_placeholder(&name, candidates));
                }
                // A bare `{Name}` (no chunk `with` binding naming a field)
                // can only resolve a `Simple` entry's whole text --
                // `multi_field` entries have no value for an unnamed field
                // and would otherwise only fail at enumeration time.
                if let Some(import) = imports.get(&name) {
                    if import.set.multi_field {
                        return Err(EngineError::validation(format!(
                            "placeholder '{{{name}}}' references a multi_field import directly; \
                             bind it through a chunk 'with field=...' clause instead"
                        )));
                    }
                }
            }
        }
    }

    // Dry-run every selector against its declared source's variation set to
    // surface out-of-range indices/keys before any image generation starts.
    // A throwaway deterministic RNG is sufficient here: `Selector::Random`
    // never fails on bounds, only `Indices`/`Range`/`Keys` do, and those
    // never consult the RNG.
    let mut scratch_rng = ChaCha8Rng::seed_from_u64(0);
    for body in [positive, negative] {
        for (name, selector) in &body.selectors {
            let import = imports.get(name).ok_or_else(|| {
                EngineError::selector(format!("selector on unknown placeholder '{name}'"))
            })?;
            selector.apply(&import.set.entries, &mut scratch_rng)?;
        }
        for axis in &body.with_axes {
            if let Some(selector) = &axis.selector {
                let import = imports.get(&axis.source_import).ok_or_else(|| {
                    EngineError::selector(format!(
                        "'with' binding references unknown import '{}'",
                        axis.source_import
                    ))
                })?;
                selector.apply(&import.set.entries, &mut scratch_rng)?;
            }
        }
    }

    Ok(())
}

/// Confirms `flat`'s generation settings were fully resolved (no ambient
/// document-level concern, just a defensive recheck that inheritance left
/// exactly one `GenerationSettings`/`OutputSettings` block behind).
pub fn validate_generation_settings(flat: &FlatDoc) -> Result<(), EngineError> {
    if flat.prompt.trim().is_empty() {
        return Err(EngineError::validation(
            "resolved prompt body is empty after inheritance",
        ));
    }
    Ok(())
}

/// Cheap per-variant dynamic check: no unresolved token survived
/// substitution, and the positive prompt is non-empty after normalization.
pub fn validate_variant(positive: &str, negative: &str) -> Result<(), EngineError> {
    if let Some(name) = find_unresolved(positive) {
        return Err(EngineError::unresolved_placeholder(&name, Vec::new()));
    }
    if let Some(name) = find_unresolved(negative) {
        return Err(EngineError::unresolved_placeholder(&name, Vec::new()));
    }
    if positive.trim().is_empty() {
        return Err(EngineError::validation(
            "resolved positive prompt is empty after normalization",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Variation, VariationEntry, VariationSet};
    use crate::selector::Selector;
    use std::path::PathBuf;

    fn import_with(key: &str) -> ResolvedImport {
        ResolvedImport {
            set: VariationSet {
                entries: vec![VariationEntry::Simple(Variation {
                    key: key.to_string(),
                    text: "x".to_string(),
                })],
                multi_field: false,
                source_path: PathBuf::from("x.yaml"),
            },
            weight: None,
            declaration_index: 0,
        }
    }

    fn multi_field_import_with(key: &str) -> ResolvedImport {
        use crate::document::MultiFieldVariation;

        ResolvedImport {
            set: VariationSet {
                entries: vec![VariationEntry::MultiField(MultiFieldVariation {
                    key: key.to_string(),
                    fields: BTreeMap::from([("top".to_string(), "shirt".to_string())]),
                })],
                multi_field: true,
                source_path: PathBuf::from("x.yaml"),
            },
            weight: None,
            declaration_index: 0,
        }
    }

    #[test]
    fn unknown_placeholder_is_rejected_with_suggestions() {
        let mut imports = BTreeMap::new();
        imports.insert("Expression".to_string(), import_with("happy"));
        let positive = ExpandedBody { text: "{Expresion}".to_string(), ..Default::default() };
        let negative = ExpandedBody::default();
        let err = validate_static(&imports, &positive, &negative).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::UnresolvedPlaceholder);
        assert!(err.candidates.contains(&"Expression".to_string()));
    }

    #[test]
    fn known_placeholder_passes() {
        let mut imports = BTreeMap::new();
        imports.insert("Expression".to_string(), import_with("happy"));
        let positive = ExpandedBody { text: "{Expression}".to_string(), ..Default::default() };
        let negative = ExpandedBody::default();
        assert!(validate_static(&imports, &positive, &negative).is_ok());
    }

    #[test]
    fn out_of_range_selector_is_caught_statically() {
        let mut imports = BTreeMap::new();
        imports.insert("Expression".to_string(), import_with("happy"));
        let mut positive = ExpandedBody { text: "{Expression}".to_string(), ..Default::default() };
        positive.selectors.insert("Expression".to_string(), Selector::Indices(vec![5]));
        let negative = ExpandedBody::default();
        let err = validate_static(&imports, &positive, &negative).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Selector);
    }

    #[test]
    fn bare_placeholder_onto_a_multi_field_import_is_rejected() {
        let mut imports = BTreeMap::new();
        imports.insert("Outfit".to_string(), multi_field_import_with("casual"));
        let positive = ExpandedBody { text: "wearing {Outfit}".to_string(), ..Default::default() };
        let negative = ExpandedBody::default();
        let err = validate_static(&imports, &positive, &negative).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
        assert!(err.message.contains("Outfit"));
    }

    #[test]
    fn empty_positive_prompt_fails_variant_validation() {
        assert!(validate_variant("   ", "").is_err());
    }

    #[test]
    fn unresolved_token_fails_variant_validation() {
        assert!(validate_variant("a {Thing} b", "").is_err());
    }

    #[test]
    fn fully_resolved_variant_passes() {
        assert!(validate_variant("a nice photo", "blurry").is_ok());
    }
}
