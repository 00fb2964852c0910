// src/imports.rs
//
// =============================================================================
// SDFORGE: IMPORT RESOLVER
// =============================================================================
//
// Resolves a `FlatDoc`'s `imports` map into loaded, merged `VariationSet`s.
// Grounded on `dsl::mod`'s untagged-enum shape idiom (`PortTypeRef`) for the
// single/list/object import forms already captured by `ImportSpec`.

use crate::document::{FlatDoc, ImportSpec, RawDocument, VariationSet};
use crate::error::EngineError;
use crate::loader::SourceLoader;
use crate::parser::parse_document;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// `{prompt}` and `{negative_prompt}` are always available without an
/// explicit `imports:` declaration.
pub const RESERVED_PROMPT: &str = "prompt";
pub const RESERVED_NEGATIVE_PROMPT: &str = "negative_prompt";

/// One resolved import: its merged variation set, the loop `weight`
/// declared on it (if any, from the import's object form), and its
/// position in `imports:`'s declared order -- the literal tiebreaker
/// axis ordering falls back to when weights tie or are absent, never a
/// `BTreeMap`'s alphabetical iteration or a scan of where the name
/// happens to sit in the rendered prompt text.
#[derive(Debug, Clone)]
pub struct ResolvedImport {
    pub set: VariationSet,
    pub weight: Option<u32>,
    pub declaration_index: usize,
}

/// Resolves every declared import to a loaded, merged `VariationSet`,
/// pre-seeding the two reserved names from the flattened template body.
pub fn resolve_imports(
    loader: &mut SourceLoader,
    flat: &FlatDoc,
) -> Result<BTreeMap<String, ResolvedImport>, EngineError> {
    let mut out = BTreeMap::new();

    for (name, spec) in &flat.imports {
        let paths = spec.paths();
        if paths.is_empty() {
            return Err(EngineError::validation(format!(
                "import '{name}' declares no source path(s)"
            )));
        }

        let mut sets = Vec::with_capacity(paths.len());
        for p in &paths {
            sets.push(load_variation_set(loader, PathBuf::from(p))?);
        }

        let set = if sets.len() == 1 {
            sets.into_iter().next().expect("checked len == 1")
        } else {
            check_disjoint_keys(name, &sets)?;
            let combined_source = sets[0].source_path.clone();
            VariationSet::concat(sets, combined_source)
        };

        let declaration_index = flat
            .import_order
            .iter()
            .position(|n| n == name)
            .unwrap_or(flat.import_order.len());

        out.insert(
            name.clone(),
            ResolvedImport {
                set,
                weight: spec.weight(),
                declaration_index,
            },
        );
    }

    // `{prompt}`/`{negative_prompt}` aren't declared in `imports:`, so they
    // sort after every real import.
    out.insert(
        RESERVED_PROMPT.to_string(),
        ResolvedImport {
            set: single_text_set(RESERVED_PROMPT, &flat.prompt, &flat.source_path),
            weight: None,
            declaration_index: flat.import_order.len(),
        },
    );
    out.insert(
        RESERVED_NEGATIVE_PROMPT.to_string(),
        ResolvedImport {
            set: single_text_set(
                RESERVED_NEGATIVE_PROMPT,
                flat.negative_prompt.as_deref().unwrap_or(""),
                &flat.source_path,
            ),
            weight: None,
            declaration_index: flat.import_order.len() + 1,
        },
    );

    Ok(out)
}

fn single_text_set(key: &str, text: &str, source_path: &std::path::Path) -> VariationSet {
    use crate::document::{Variation, VariationEntry};
    VariationSet {
        entries: vec![VariationEntry::Simple(Variation {
            key: key.to_string(),
            text: text.to_string(),
        })],
        multi_field: false,
        source_path: source_path.to_path_buf(),
    }
}

fn load_variation_set(
    loader: &mut SourceLoader,
    path: PathBuf,
) -> Result<VariationSet, EngineError> {
    let content = loader.load_raw(&path)?.content.clone();
    match parse_document(&content, &path)? {
        RawDocument::VariationSet(raw) => Ok(VariationSet::from_raw(raw, path)),
        _ => Err(EngineError::validation(format!(
            "import source is not a variation set document"
        ))
        .with_path(&path)),
    }
}

/// Duplicate keys across sources are a validation error, reporting the
/// full list of offending keys and source paths. Multi-source import
/// order is preserved -- never sorted by name -- by scanning sets in
/// declared order and recording every source a key appears in.
fn check_disjoint_keys(import_name: &str, sets: &[VariationSet]) -> Result<(), EngineError> {
    let mut seen: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for set in sets {
        for entry in &set.entries {
            seen.entry(entry.key().to_string())
                .or_default()
                .push(set.source_path.clone());
        }
    }
    let conflicts: Vec<(String, Vec<PathBuf>)> = seen
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .collect();
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(EngineError::import_conflict(&conflicts)
            .with_path(PathBuf::from(format!("import '{import_name}'"))))
    }
}
