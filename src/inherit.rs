// src/inherit.rs
//
// =============================================================================
// SDFORGE: INHERITANCE RESOLVER
// =============================================================================
//
// Walks `implements` from child to root, then merges root-first into one
// `FlatDoc`. Grounded on `dsl::expand_macros`'s clone-then-mutate shape;
// cycle detection generalizes the `HashSet` node-id-uniqueness idiom from
// `dsl::validate`. No `petgraph` here: single inheritance is a linked
// list, not an arbitrary graph, so that dependency is left unused by this
// module.

use crate::document::{
    deep_merge_json, ChunkDoc, FlatDoc, GenerationSettingsPartial, ImportSpec, OutputSettings,
    PromptDoc, RawDocument, TemplateDoc,
};
use crate::error::EngineError;
use crate::loader::SourceLoader;
use crate::parser::parse_document;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Depth is bounded -- an `implements` chain deeper than this is treated as
/// a configuration error rather than resolved indefinitely.
pub const MAX_INHERITANCE_DEPTH: usize = 64;

/// Resolves `referenced` relative to the directory containing `from_file`,
/// unless it is already absolute. Mirrors `dsl::resolve_relative`.
pub fn resolve_relative(from_file: &Path, referenced: &str) -> PathBuf {
    let p = PathBuf::from(referenced);
    if p.is_absolute() {
        p
    } else {
        let base = if from_file.is_dir() {
            from_file
        } else {
            from_file.parent().unwrap_or_else(|| Path::new("."))
        };
        base.join(p)
    }
}

/// One document's contribution to the `implements` chain, with import
/// sources already rewritten to be relative to *this* document's directory,
/// so later stages never need to remember which ancestor declared an
/// import or chunk.
struct ChainLink {
    parameters: Map<String, Value>,
    imports: BTreeMap<String, ImportSpec>,
    chunks: BTreeMap<String, ChunkDoc>,
    prompt: String,
    negative_prompt: Option<String>,
    generation: Option<GenerationSettingsPartial>,
    output: Option<OutputSettings>,
    source_path: PathBuf,
}

impl ChainLink {
    fn from_template(t: TemplateDoc, source_path: PathBuf) -> Self {
        let dir = source_path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        Self {
            parameters: t.parameters,
            imports: resolve_imports(t.imports, &dir),
            chunks: t.chunks,
            prompt: t.prompt,
            negative_prompt: t.negative_prompt,
            generation: t.generation,
            output: t.output,
            source_path,
        }
    }

    fn from_prompt(p: PromptDoc, source_path: PathBuf) -> Self {
        let dir = source_path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        Self {
            parameters: p.parameters,
            imports: resolve_imports(p.imports, &dir),
            chunks: p.chunks,
            prompt: p.prompt,
            negative_prompt: p.negative_prompt,
            generation: p.generation,
            output: p.output,
            source_path,
        }
    }
}

fn resolve_imports(
    imports: BTreeMap<String, ImportSpec>,
    dir: &Path,
) -> BTreeMap<String, ImportSpec> {
    imports
        .into_iter()
        .map(|(name, spec)| (name, spec.resolved_against(dir)))
        .collect()
}

/// Splices `child` into `parent` if `parent` contains the `{prompt}` token,
/// otherwise `child` replaces `parent` wholesale -- the `prompt`/
/// `negative_prompt` merge rule, applied recursively up the chain.
fn splice_body(parent: &str, child: &str) -> String {
    if parent.contains("{prompt}") {
        parent.replace("{prompt}", child)
    } else {
        child.to_string()
    }
}

/// Walks `leaf_path`'s `implements` chain to the root and merges root-first
/// into a `FlatDoc`.
pub fn resolve_inheritance(loader: &mut SourceLoader, leaf_path: &Path) -> Result<FlatDoc, EngineError> {
    let mut chain: Vec<ChainLink> = Vec::new();
    let mut visited: Vec<PathBuf> = Vec::new();
    let mut current_path = leaf_path
        .canonicalize()
        .map_err(|e| EngineError::io(e, leaf_path))?;
    let mut first = true;

    loop {
        if visited.contains(&current_path) {
            let mut shown = visited.clone();
            shown.push(current_path.clone());
            return Err(EngineError::cycle(&shown));
        }
        if visited.len() >= MAX_INHERITANCE_DEPTH {
            return Err(EngineError::validation(format!(
                "implements chain exceeds maximum depth of {MAX_INHERITANCE_DEPTH}"
            )));
        }
        visited.push(current_path.clone());

        let raw = load_and_parse(loader, &current_path)?;
        let (link, implements) = match raw {
            RawDocument::Prompt(p) => {
                if !first {
                    return Err(EngineError::validation(format!(
                        "'implements' target must be a Template, found a Prompt document"
                    ))
                    .with_path(&current_path));
                }
                let implements = p.implements.clone();
                (ChainLink::from_prompt(p, current_path.clone()), implements)
            }
            RawDocument::Template(t) => {
                let implements = t.implements.clone();
                (ChainLink::from_template(t, current_path.clone()), implements)
            }
            RawDocument::Chunk(_) | RawDocument::VariationSet(_) => {
                return Err(EngineError::validation(
                    "'implements' target must be a Prompt or Template document",
                )
                .with_path(&current_path));
            }
        };

        chain.push(link);
        first = false;

        match implements {
            None => break,
            Some(rel) => {
                current_path = resolve_relative(&current_path, &rel)
                    .canonicalize()
                    .map_err(|e| EngineError::io(e, &rel))?;
            }
        }
    }

    // Merge root-first: reverse the leaf->root walk order.
    chain.reverse();

    let leaf_source = chain.last().map(|l| l.source_path.clone()).unwrap_or_default();

    let mut parameters = Map::new();
    let mut imports = BTreeMap::new();
    let mut import_order = Vec::new();
    let mut chunks = BTreeMap::new();
    let mut prompt = String::new();
    let mut negative_prompt: Option<String> = None;
    let mut generation: Option<GenerationSettingsPartial> = None;
    let mut output: Option<OutputSettings> = None;
    let mut is_root = true;

    for link in chain {
        deep_merge_json(&mut parameters, &link.parameters);

        for name in link.imports.keys() {
            if !import_order.contains(name) {
                import_order.push(name.clone());
            }
        }
        for (name, spec) in link.imports {
            imports.insert(name, spec);
        }

        for (name, chunk) in link.chunks {
            chunks.insert(name, chunk);
        }

        prompt = if is_root {
            link.prompt
        } else {
            splice_body(&prompt, &link.prompt)
        };

        negative_prompt = match (negative_prompt.take(), link.negative_prompt) {
            (None, child) => child,
            (Some(parent), None) => Some(parent),
            (Some(parent), Some(child)) => Some(splice_body(&parent, &child)),
        };

        // Per-field merge (spec: "generation, output: child wins
        // per-field") -- a mid-chain document declaring only
        // `generation: {max_images: 10}` must not reset `mode`/`seed`/
        // `seed_mode` back to their struct defaults if an ancestor already
        // set them.
        if let Some(g) = link.generation {
            generation = Some(match generation {
                Some(base) => g.merge_over(base),
                None => g,
            });
        }
        if let Some(o) = link.output {
            output = Some(match output {
                Some(base) => o.merge_over(base),
                None => o,
            });
        }

        is_root = false;
    }

    Ok(FlatDoc {
        parameters,
        imports,
        import_order,
        chunks,
        prompt,
        negative_prompt,
        generation: generation.map(GenerationSettingsPartial::into_full).unwrap_or_default(),
        output: output.unwrap_or_default(),
        source_path: leaf_source,
    })
}

fn load_and_parse(loader: &mut SourceLoader, path: &Path) -> Result<RawDocument, EngineError> {
    let content = loader.load_raw(path)?.content.clone();
    parse_document(&content, path)
}
