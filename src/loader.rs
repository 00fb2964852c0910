// src/loader.rs
//
// =============================================================================
// SDFORGE: SOURCE LOADER
// =============================================================================
//
// A single-run, append-only cache of file contents keyed by canonicalized
// path, with a content hash for cheap equality checks downstream (e.g. the
// manifest snapshot). Grounded on `dsl::load_yaml`'s read-then-parse shape
// and `provenance::sha256_file`'s streaming-hash idiom, narrowed here to
// whole small YAML files read in one `fs::read`. `implements`/`imports`
// cycle detection is NOT this module's job -- each call to `load_raw` reads
// and returns in one non-reentrant pass, so a cycle guard local to this
// struct could never observe a file still being loaded higher up the stack.
// The walks that actually recurse across files (`inherit::
// resolve_inheritance`'s `visited: Vec<PathBuf>`, `imports::resolve_imports`)
// own their own cycle/reentrancy checks instead.

use crate::error::EngineError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CachedSource {
    pub content: String,
    pub content_hash: String,
}

/// Loads and caches YAML source files for a single resolution run.
/// Not `Send`/shared — the engine is single-threaded.
#[derive(Debug, Default)]
pub struct SourceLoader {
    cache: HashMap<PathBuf, CachedSource>,
}

impl SourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and caches the file at `path`, canonicalizing first so the
    /// same file reached via two different relative paths shares a cache
    /// entry. Cycles across `implements`/`imports` are caught by the
    /// caller's own visited-path walk, not here -- see the module doc.
    pub fn load_raw(&mut self, path: &Path) -> Result<&CachedSource, EngineError> {
        let canonical = path
            .canonicalize()
            .map_err(|e| EngineError::io(e, path))?;

        if self.cache.contains_key(&canonical) {
            return Ok(self.cache.get(&canonical).expect("checked above"));
        }

        let content = std::fs::read_to_string(&canonical).map_err(|e| EngineError::io(e, &canonical))?;
        let content_hash = hex::encode(Sha256::digest(content.as_bytes()));

        self.cache.insert(
            canonical.clone(),
            CachedSource {
                content,
                content_hash,
            },
        );
        Ok(self.cache.get(&canonical).expect("just inserted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_caches_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.yaml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"version: \"2.0\"\n")
            .unwrap();

        let mut loader = SourceLoader::new();
        let first = loader.load_raw(&path).unwrap().content_hash.clone();
        let second = loader.load_raw(&path).unwrap().content_hash.clone();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_file_is_io_error() {
        let mut loader = SourceLoader::new();
        let err = loader.load_raw(Path::new("/does/not/exist.yaml")).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Io);
    }
}
