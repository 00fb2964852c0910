// src/document.rs
//
// =============================================================================
// SDFORGE: DOCUMENT MODEL
// =============================================================================
//
// Typed YAML documents: VariationSet, Chunk, Template, Prompt, plus the
// generation/output settings that hang off a leaf Prompt. Mirrors the
// teacher's WorkflowSpec/NodeSpec shape: `#[serde(default)]` on optionals,
// `#[serde(tag = "kind", rename_all = "snake_case")]` on sum types,
// `#[serde(untagged)]` for the single/list/object import shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const SUPPORTED_VERSION: &str = "2.0";

// =============================================================================
// Variations
// =============================================================================

/// A single `(key, text)` entry in a variation set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Variation {
    pub key: String,
    pub text: String,
}

/// A `multi_field` entry: one key mapping to several named field fragments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MultiFieldVariation {
    pub key: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum VariationEntry {
    MultiField(MultiFieldVariation),
    Simple(Variation),
}

impl VariationEntry {
    pub fn key(&self) -> &str {
        match self {
            VariationEntry::Simple(v) => &v.key,
            VariationEntry::MultiField(v) => &v.key,
        }
    }

    /// Resolves this entry's contribution for a plain `{Name}` placeholder
    /// (no field name) or a chunk `with field=Source[...]` binding (field
    /// name given). `multi_field` entries require a field name.
    pub fn value_for(&self, field: Option<&str>) -> Option<&str> {
        match (self, field) {
            (VariationEntry::Simple(v), None) => Some(v.text.as_str()),
            (VariationEntry::Simple(v), Some(_)) => Some(v.text.as_str()),
            (VariationEntry::MultiField(v), Some(f)) => v.fields.get(f).map(|s| s.as_str()),
            (VariationEntry::MultiField(_), None) => None,
        }
    }
}

/// Raw on-disk shape of a variation file: either a flat `key: text` mapping
/// or an object with `type: multi_field` + an explicit `variations` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawVariationFile {
    MultiField {
        #[serde(rename = "type")]
        kind: MultiFieldMarker,
        variations: Vec<MultiFieldVariation>,
        #[serde(flatten)]
        extra: BTreeMap<String, serde_yaml::Value>,
    },
    /// `serde_yaml::Mapping` rather than a sorted map: variation order is
    /// significant (declaration order drives axis ordering downstream) and
    /// a `BTreeMap` would silently re-sort keys alphabetically.
    Flat(serde_yaml::Mapping),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MultiFieldMarker {
    MultiField,
}

/// An ordered, named sequence of variations loaded from a single YAML file.
#[derive(Debug, Clone)]
pub struct VariationSet {
    pub entries: Vec<VariationEntry>,
    pub multi_field: bool,
    pub source_path: PathBuf,
}

impl VariationSet {
    pub fn from_raw(raw: RawVariationFile, source_path: PathBuf) -> Self {
        match raw {
            RawVariationFile::MultiField { variations, .. } => Self {
                entries: variations.into_iter().map(VariationEntry::MultiField).collect(),
                multi_field: true,
                source_path,
            },
            RawVariationFile::Flat(map) => Self {
                entries: map
                    .into_iter()
                    .filter_map(|(k, v)| {
                        let key = k.as_str()?.to_string();
                        let text = v.as_str()?.to_string();
                        Some(VariationEntry::Simple(Variation { key, text }))
                    })
                    .collect(),
                multi_field: false,
                source_path,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.key()).collect()
    }

    pub fn position_of(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key() == key)
    }

    /// Concatenates several sets in declared order, preserving each set's
    /// own entry order.
    pub fn concat(sets: Vec<VariationSet>, combined_source: PathBuf) -> Self {
        let multi_field = sets.first().map(|s| s.multi_field).unwrap_or(false);
        let mut entries = Vec::new();
        for s in sets {
            entries.extend(s.entries);
        }
        Self {
            entries,
            multi_field,
            source_path: combined_source,
        }
    }
}

// =============================================================================
// Chunks
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkField {
    #[serde(default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDoc {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub implements: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, ChunkField>,
    #[serde(default)]
    pub body: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

// =============================================================================
// Imports
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportSpec {
    Single(String),
    List(Vec<String>),
    Object {
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        sources: Option<Vec<String>>,
        #[serde(default)]
        weight: Option<u32>,
    },
}

impl ImportSpec {
    pub fn paths(&self) -> Vec<String> {
        match self {
            ImportSpec::Single(p) => vec![p.clone()],
            ImportSpec::List(ps) => ps.clone(),
            ImportSpec::Object { source, sources, .. } => {
                let mut out = Vec::new();
                if let Some(s) = source {
                    out.push(s.clone());
                }
                if let Some(ss) = sources {
                    out.extend(ss.clone());
                }
                out
            }
        }
    }

    pub fn weight(&self) -> Option<u32> {
        match self {
            ImportSpec::Object { weight, .. } => *weight,
            _ => None,
        }
    }

    /// Rewrites every path string this import carries to be relative to
    /// `base_dir`, so downstream resolution never needs to remember which
    /// ancestor in the `implements` chain originally declared it.
    pub fn resolved_against(&self, base_dir: &std::path::Path) -> ImportSpec {
        let resolve = |p: &str| -> String {
            crate::inherit::resolve_relative(base_dir, p)
                .to_string_lossy()
                .into_owned()
        };
        match self {
            ImportSpec::Single(p) => ImportSpec::Single(resolve(p)),
            ImportSpec::List(ps) => ImportSpec::List(ps.iter().map(|p| resolve(p)).collect()),
            ImportSpec::Object { source, sources, weight } => ImportSpec::Object {
                source: source.as_deref().map(resolve),
                sources: sources
                    .as_ref()
                    .map(|ss| ss.iter().map(|p| resolve(p)).collect()),
                weight: *weight,
            },
        }
    }
}

// =============================================================================
// Generation / output settings
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Combinatorial,
    Random,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Combinatorial
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeedMode {
    Fixed,
    Progressive,
    Random,
}

impl Default for SeedMode {
    fn default() -> Self {
        SeedMode::Fixed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub seed: i64,
    #[serde(default)]
    pub seed_mode: SeedMode,
    #[serde(default)]
    pub max_images: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Combinatorial,
            seed: 0,
            seed_mode: SeedMode::Fixed,
            max_images: 0,
        }
    }
}

/// As-declared `generation:` block, every field `Option` so "not mentioned
/// in this document" stays distinguishable from "mentioned, set to its
/// struct default" -- that distinction is what lets inheritance merge the
/// block per-field (spec: "`generation`, `output`: child wins per-field")
/// instead of a partial child block silently resetting the fields it
/// doesn't mention back to `Mode::Combinatorial`/`seed: 0`/etc.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationSettingsPartial {
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub seed_mode: Option<SeedMode>,
    #[serde(default)]
    pub max_images: Option<u32>,
}

impl GenerationSettingsPartial {
    /// Merges `self` (the closer-to-leaf declaration) over `base` (the
    /// accumulated ancestor state), field by field, child winning only for
    /// the fields it actually declares.
    pub fn merge_over(self, base: Self) -> Self {
        Self {
            mode: self.mode.or(base.mode),
            seed: self.seed.or(base.seed),
            seed_mode: self.seed_mode.or(base.seed_mode),
            max_images: self.max_images.or(base.max_images),
        }
    }

    /// Fills any still-undeclared field with the struct default, once the
    /// whole `implements` chain has been merged.
    pub fn into_full(self) -> GenerationSettings {
        let defaults = GenerationSettings::default();
        GenerationSettings {
            mode: self.mode.unwrap_or(defaults.mode),
            seed: self.seed.unwrap_or(defaults.seed),
            seed_mode: self.seed_mode.unwrap_or(defaults.seed_mode),
            max_images: self.max_images.unwrap_or(defaults.max_images),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputSettings {
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
}

impl OutputSettings {
    /// Same per-field child-wins merge as `GenerationSettingsPartial` --
    /// both fields are already `Option`, so this only needs field-by-field
    /// `or`, not a parallel partial type.
    pub fn merge_over(self, base: Self) -> Self {
        Self {
            session_name: self.session_name.or(base.session_name),
            directory: self.directory.or(base.directory),
        }
    }
}

// =============================================================================
// Template / Prompt documents (pre-inheritance-resolution, as parsed)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDoc {
    pub version: String,
    #[serde(default)]
    pub implements: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub imports: BTreeMap<String, ImportSpec>,
    #[serde(default)]
    pub chunks: BTreeMap<String, ChunkDoc>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub generation: Option<GenerationSettingsPartial>,
    #[serde(default)]
    pub output: Option<OutputSettings>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDoc {
    pub version: String,
    #[serde(default)]
    pub implements: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub imports: BTreeMap<String, ImportSpec>,
    #[serde(default)]
    pub chunks: BTreeMap<String, ChunkDoc>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// `None` when the leaf prompt omits `generation:` entirely, so
    /// inheritance resolution can fall back to whatever an ancestor
    /// template declared instead of silently shadowing it with struct
    /// defaults.
    #[serde(default)]
    pub generation: Option<GenerationSettingsPartial>,
    #[serde(default)]
    pub output: Option<OutputSettings>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A document after version/kind dispatch, before inheritance resolution.
#[derive(Debug, Clone)]
pub enum RawDocument {
    Prompt(PromptDoc),
    Template(TemplateDoc),
    Chunk(ChunkDoc),
    VariationSet(RawVariationFile),
}

// =============================================================================
// Flattened document (post inheritance resolution) — no parent pointers.
// =============================================================================

#[derive(Debug, Clone)]
pub struct FlatDoc {
    pub parameters: Map<String, Value>,
    pub imports: BTreeMap<String, ImportSpec>,
    pub import_order: Vec<String>,
    pub chunks: BTreeMap<String, ChunkDoc>,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub generation: GenerationSettings,
    pub output: OutputSettings,
    pub source_path: PathBuf,
}

/// Deep-merges `overlay` into `base`, overlay keys winning at each leaf.
pub fn deep_merge_json(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (k, v) in overlay {
        match (base.get_mut(k), v) {
            (Some(Value::Object(base_obj)), Value::Object(overlay_obj)) => {
                deep_merge_json(base_obj, overlay_obj);
            }
            _ => {
                base.insert(k.clone(), v.clone());
            }
        }
    }
}
