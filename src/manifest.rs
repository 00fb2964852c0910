// src/manifest.rs
//
// =============================================================================
// SDFORGE: MANIFEST WRITER
// =============================================================================
//
// Typed `Snapshot`/`ImageRecord`/`Manifest`, buffered in memory and written
// once, atomically, at the end of a run. Grounded on
// `eventlog::EventLogWriter::open`'s defensive parent-directory creation
// and `provenance::ArtifactStore::commit`'s rename-into-place durability
// idiom, simplified here since the manifest is a single JSON document
// rather than an append log.

use crate::document::{GenerationSettings, Mode, SeedMode};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const MANIFEST_VERSION: &str = "2.0";

/// The `prompt`/`negative_prompt` bodies as resolved, placeholders still
/// visible for readability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedTemplate {
    pub prompt: String,
    pub negative_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub mode: Mode,
    pub seed_mode: SeedMode,
    pub base_seed: i64,
    pub num_images: u64,
    pub total_combinations: u64,
}

impl GenerationParams {
    pub fn from_settings(g: &GenerationSettings, num_images: u64, total_combinations: u64) -> Self {
        Self {
            mode: g.mode,
            seed_mode: g.seed_mode,
            base_seed: g.seed,
            num_images,
            total_combinations,
        }
    }
}

/// Written once per run, embedded at the top of `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub timestamp: String,
    pub runtime_info: Value,
    pub resolved_template: ResolvedTemplate,
    pub generation_params: GenerationParams,
    pub api_params: Value,
    /// For each placeholder that appears in the body, the full selected
    /// set (after selectors) as an ordered key list.
    pub variations: BTreeMap<String, Vec<String>>,
}

/// One per-image record, appended by the driver after each generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub variant_index: u64,
    pub filename: String,
    pub actual_seed: i64,
    pub positive: String,
    pub negative: String,
    pub applied_variations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub snapshot: Snapshot,
    pub images: Vec<ImageRecord>,
}

/// Buffers `ImageRecord`s in memory across a run, then writes the full
/// manifest in one atomic temp-file-then-rename operation. A run is not
/// expected to exceed a few thousand images, so no append-log streaming is
/// needed -- simpler than `eventlog`, which must survive a crash mid-run;
/// this manifest is written once, after the run completes.
pub struct ManifestWriter {
    target: PathBuf,
    images: Vec<ImageRecord>,
}

impl ManifestWriter {
    pub fn create(target: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let target = target.into();
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::io(e, parent))?;
        }
        Ok(Self { target, images: Vec::new() })
    }

    pub fn record_image(
        &mut self,
        variant_index: u64,
        filename: impl Into<String>,
        actual_seed: i64,
        positive: impl Into<String>,
        negative: impl Into<String>,
        applied_variations: BTreeMap<String, String>,
        error: Option<String>,
    ) {
        self.images.push(ImageRecord {
            variant_index,
            filename: filename.into(),
            actual_seed,
            positive: positive.into(),
            negative: negative.into(),
            applied_variations,
            error,
        });
    }

    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    /// Serializes `{snapshot, images}` to a temp file beside `target`, then
    /// renames into place so a crash mid-write never leaves a
    /// half-written `manifest.json`.
    pub fn finish(self, snapshot: Snapshot) -> Result<(), EngineError> {
        let manifest = Manifest { snapshot, images: self.images };
        let tmp_path = tmp_path_for(&self.target);
        let file = std::fs::File::create(&tmp_path).map_err(|e| EngineError::io(e, &tmp_path))?;
        serde_json::to_writer_pretty(&file, &manifest)
            .map_err(|e| EngineError::io(e, &tmp_path))?;
        std::fs::rename(&tmp_path, &self.target).map_err(|e| EngineError::io(e, &self.target))?;
        Ok(())
    }
}

fn tmp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "manifest.json".to_string());
    name.push_str(".tmp");
    target.with_file_name(name)
}

pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}
