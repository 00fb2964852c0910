// src/lib.rs
//
// =============================================================================
// SDFORGE: LIBRARY ROOT / ENGINE FACADE
// =============================================================================
//
// Ties the pipeline stages -- load, parse, inherit, import, chunk-expand,
// substitute, enumerate, seed, validate -- into the single public entry
// point the driver crosses: `load_and_resolve` returns a `ResolvedRun`,
// which exposes `total_combinations`, a lazy `VariantIter`, and `snapshot`.
// Module declaration + curated re-export shape grounded on `src/lib.rs`.

pub mod chunks;
pub mod document;
pub mod driver;
pub mod enumerate;
pub mod error;
pub mod imports;
pub mod inherit;
pub mod loader;
pub mod manifest;
pub mod parser;
pub mod placeholder;
pub mod seed;
pub mod selector;
pub mod substitute;
pub mod validate;

pub use document::{GenerationSettings, Mode, SeedMode};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use manifest::{GenerationParams, ImageRecord, Manifest, ManifestWriter, ResolvedTemplate, Snapshot};

use crate::chunks::{expand_chunks, ExpandedBody, WithAxis};
use crate::enumerate::{decode_mixed_radix, order_axes, plan_for, total_combinations as combos_of, Axis, EnumerationPlan};
use crate::imports::{resolve_imports, ResolvedImport};
use crate::inherit::resolve_inheritance;
use crate::loader::SourceLoader;
use crate::manifest::now_iso8601;
use crate::selector::Selector;
use crate::substitute::substitute;
use crate::validate::{validate_generation_settings, validate_static, validate_variant};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// CLI/driver override knobs applied to `generation` before resolution,
/// mirroring `run_deployer`'s JSON-merge-before-submit pattern: the
/// document model itself is never mutated in place, the overrides are
/// folded in once while building the `ResolvedRun`.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub max_images: Option<u32>,
    pub seed: Option<i64>,
    /// Consulted by the driver's per-image error policy (abort-on-first vs.
    /// record-and-continue), not by the engine itself.
    pub strict: bool,
}

/// One fully resolved `(positive, negative, seed, api_params,
/// applied_variations)` tuple.
#[derive(Debug, Clone)]
pub struct Variant {
    pub index: u64,
    pub seed_hint: i64,
    pub positive: String,
    pub negative: String,
    pub applied_variations: BTreeMap<String, String>,
    pub api_params: Value,
}

/// An immutable, fully resolved run: every pipeline stage has already
/// succeeded by the time this exists -- construction is transactional, an
/// error at any stage never leaves a partially-built run behind.
/// Enumeration itself stays lazy -- `iter()` computes each `Variant` on
/// demand.
pub struct ResolvedRun {
    axes: Vec<Axis>,
    plan: EnumerationPlan,
    positive_text: String,
    negative_text: String,
    mode: Mode,
    seed_mode: SeedMode,
    base_seed: i64,
    num_images: u64,
    total_combinations: u64,
    api_params: Value,
    source_path: PathBuf,
}

impl ResolvedRun {
    pub fn total_combinations(&self) -> u64 {
        self.total_combinations
    }

    /// How many variants this run will actually emit once `mode`/`seed`/
    /// `max_images` are applied: `R.iter().count() ==
    /// min(R.total_combinations(), max_images if > 0 else total)`.
    pub fn num_images(&self) -> u64 {
        self.num_images
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn iter(&self) -> VariantIter<'_> {
        VariantIter { run: self, next_index: 0 }
    }

    /// Builds the once-per-run manifest snapshot, embedding the
    /// driver-supplied `runtime_info`.
    pub fn snapshot(&self, runtime_info: Value) -> Snapshot {
        let variations = self
            .axes
            .iter()
            .map(|a| (a.name.clone(), a.variations.iter().map(|e| e.key().to_string()).collect()))
            .collect();
        Snapshot {
            version: manifest::MANIFEST_VERSION.to_string(),
            timestamp: now_iso8601(),
            runtime_info,
            resolved_template: ResolvedTemplate {
                prompt: self.positive_text.clone(),
                negative_prompt: self.negative_text.clone(),
            },
            generation_params: GenerationParams {
                mode: self.mode,
                seed_mode: self.seed_mode,
                base_seed: self.base_seed,
                num_images: self.num_images,
                total_combinations: self.total_combinations,
            },
            api_params: self.api_params.clone(),
            variations,
        }
    }

    fn combo_index(&self, variant_index: u64) -> u64 {
        match &self.plan {
            EnumerationPlan::Combinatorial { .. } => variant_index,
            EnumerationPlan::Random { combo_indices } => combo_indices[variant_index as usize],
        }
    }

    fn build_variant(&self, index: u64) -> Variant {
        let digits = decode_mixed_radix(self.combo_index(index), &self.axes);
        let mut bindings = BTreeMap::new();
        let mut applied_variations = BTreeMap::new();
        for (axis, &digit) in self.axes.iter().zip(digits.iter()) {
            let entry = &axis.variations[digit];
            let text = entry
                .value_for(axis.field.as_deref())
                .expect("validate_static rejected placeholders that can't resolve a field");
            bindings.insert(axis.name.clone(), text.to_string());
            applied_variations.insert(axis.name.clone(), entry.key().to_string());
        }

        let positive = substitute(&self.positive_text, &bindings)
            .expect("validate_static already confirmed every placeholder resolves");
        let negative = substitute(&self.negative_text, &bindings)
            .expect("validate_static already confirmed every placeholder resolves");
        validate_variant(&positive, &negative)
            .expect("validate_static pre-screens unresolved tokens and empty fragments");

        let seed_hint = seed::seed_for(index, self.seed_mode, self.base_seed);
        Variant {
            index,
            seed_hint,
            positive,
            negative,
            applied_variations,
            api_params: self.api_params.clone(),
        }
    }
}

/// Lazy iterator over a `ResolvedRun`'s variant space — the driver may
/// drop this between variants at any point.
pub struct VariantIter<'a> {
    run: &'a ResolvedRun,
    next_index: u64,
}

impl<'a> Iterator for VariantIter<'a> {
    type Item = Variant;

    fn next(&mut self) -> Option<Variant> {
        if self.next_index >= self.run.num_images {
            return None;
        }
        let variant = self.run.build_variant(self.next_index);
        self.next_index += 1;
        Some(variant)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.run.num_images - self.next_index) as usize;
        (remaining, Some(remaining))
    }
}

/// The engine's single entry point: load `path`, walk its `implements`
/// chain, resolve imports and chunks, validate statically, and build the
/// ordered axis space ready for lazy enumeration.
pub fn load_and_resolve(path: &Path, overrides: Overrides) -> Result<ResolvedRun, EngineError> {
    let mut loader = SourceLoader::new();
    let flat = resolve_inheritance(&mut loader, path)?;
    validate_generation_settings(&flat)?;

    let mut generation = flat.generation;
    if let Some(seed) = overrides.seed {
        generation.seed = seed;
    }
    if let Some(max_images) = overrides.max_images {
        generation.max_images = max_images;
    }

    let flat_for_imports = document::FlatDoc { generation, ..flat };
    let imports_map = resolve_imports(&mut loader, &flat_for_imports)?;

    let positive_expanded = expand_chunks(&flat_for_imports.prompt, &flat_for_imports.chunks)?;
    let negative_expanded = expand_chunks(
        flat_for_imports.negative_prompt.as_deref().unwrap_or(""),
        &flat_for_imports.chunks,
    )?;

    validate_static(&imports_map, &positive_expanded, &negative_expanded)?;

    let generation = flat_for_imports.generation;
    let mut rng = ChaCha8Rng::seed_from_u64(generation.seed as u64);
    let axes = build_axes(&imports_map, &positive_expanded, &negative_expanded, &mut rng)?;
    let total_combinations = combos_of(&axes)?;
    let plan = plan_for(generation.mode, &axes, &mut rng, generation.max_images)?;
    let num_images = match &plan {
        EnumerationPlan::Combinatorial { limit } => *limit,
        EnumerationPlan::Random { combo_indices } => combo_indices.len() as u64,
    };

    Ok(ResolvedRun {
        axes,
        plan,
        positive_text: positive_expanded.text,
        negative_text: negative_expanded.text,
        mode: generation.mode,
        seed_mode: generation.seed_mode,
        base_seed: generation.seed,
        num_images,
        total_combinations,
        api_params: Value::Object(flat_for_imports.parameters),
        source_path: flat_for_imports.source_path,
    })
}

/// Discovers every plain `{Name}` reference across both expanded bodies.
/// This only tells us *which* axes exist -- the ordering tiebreaker itself
/// comes from each name's `ResolvedImport::declaration_index` (built from
/// `imports:`'s own declared order), never from where the name happens to
/// sit in the rendered prompt text. The `BTreeSet` return is for dedup
/// only and iterates alphabetically: `build_axes` below must not (and does
/// not) treat that iteration order as meaningful -- it only feeds
/// `order_axes`, which re-sorts by `(weight, declaration_index)` before any
/// consumer sees a final axis order.
fn referenced_simple_names(positive: &str, negative: &str) -> Result<BTreeSet<String>, EngineError> {
    use crate::placeholder::{tokenize, Placeholder, Token};

    let mut names = BTreeSet::new();
    for body in [positive, negative] {
        for tok in tokenize(body)? {
            if let Token::Placeholder(Placeholder::Simple { name, .. }) = tok {
                names.insert(name);
            }
        }
    }
    Ok(names)
}

fn build_axes(
    imports_map: &BTreeMap<String, ResolvedImport>,
    positive: &ExpandedBody,
    negative: &ExpandedBody,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<Axis>, EngineError> {
    let names = referenced_simple_names(&positive.text, &negative.text)?;

    let mut with_axis_lookup: HashMap<&str, &WithAxis> = HashMap::new();
    for w in positive.with_axes.iter().chain(negative.with_axes.iter()) {
        with_axis_lookup.insert(w.name.as_str(), w);
    }

    let mut axes = Vec::with_capacity(names.len());
    for name in names {
        if let Some(with_axis) = with_axis_lookup.get(name.as_str()) {
            let import = imports_map.get(&with_axis.source_import).ok_or_else(|| {
                EngineError::validation(format!(
                    "'with' binding references unknown import '{}'",
                    with_axis.source_import
                ))
            })?;
            let selector = with_axis.selector.clone().unwrap_or(Selector::All);
            let indices = selector.apply(&import.set.entries, rng)?;
            let variations = indices.into_iter().map(|i| import.set.entries[i].clone()).collect();
            axes.push(Axis {
                name,
                variations,
                // A `with`-binding axis is independent of its host
                // placeholder's weight; the grammar has no syntax to
                // declare one of its own, so it falls back to the
                // declared position of the import it draws from, plus
                // one -- it has no `imports:` entry of its own to rank by.
                weight: None,
                declaration_index: import.declaration_index + 1,
                field: Some(with_axis.field.clone()),
            });
        } else {
            let import = imports_map.get(&name).ok_or_else(|| {
                EngineError::validation(format!("placeholder '{{{name}}}' has no declared import"))
            })?;
            let selector = positive
                .selectors
                .get(&name)
                .or_else(|| negative.selectors.get(&name))
                .cloned()
                .unwrap_or(Selector::All);
            let indices = selector.apply(&import.set.entries, rng)?;
            let variations = indices.into_iter().map(|i| import.set.entries[i].clone()).collect();
            axes.push(Axis {
                name,
                variations,
                weight: import.weight,
                declaration_index: import.declaration_index,
                field: None,
            });
        }
    }

    Ok(order_axes(axes))
}
