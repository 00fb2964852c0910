// src/driver.rs
//
// =============================================================================
// SDFORGE: SD CLIENT DRIVER (The Hexagonal Port)
// =============================================================================
//
// Mirrors a `CodeDriver` port/adapter split: a small `#[async_trait]` trait
// defines the contract
// between the engine's variant iterator and whatever actually talks to a
// Stable Diffusion backend, so the resolver/enumerator stays free of HTTP
// concerns. `RecordingSdClient` is the in-repo stand-in adapter -- it never
// calls out to a real backend, it fabricates a minimal image and echoes
// seed arithmetic, the way a test double stands in for `ExternalDriver`.

use crate::seed::RANDOM_SEED_SENTINEL;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

/// The smallest valid PNG: 1x1, 8-bit RGBA, a single black opaque pixel.
const BLANK_PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x04, 0x00, 0x00, 0x00, 0xb5, 0x1c, 0x0c,
    0x02, 0x00, 0x00, 0x00, 0x0b, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x64, 0xf8, 0x0f, 0x00,
    0x01, 0x05, 0x01, 0x01, 0x27, 0x18, 0xe3, 0x66, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44,
    0xae, 0x42, 0x60, 0x82,
];

/// One rendered image plus the seed the backend actually used -- distinct
/// from the `seed_hint` a `Variant` carries, since a `-1` hint asks the
/// backend to pick its own.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub image_bytes: Vec<u8>,
    pub actual_seed: i64,
}

/// The port every backend adapter implements. The engine's driver loop
/// (`main.rs`) only ever sees this trait, never a concrete HTTP client.
#[async_trait]
pub trait SdClient: Send + Sync {
    async fn generate(
        &self,
        positive: &str,
        negative: &str,
        api_params: &Value,
        seed: i64,
    ) -> Result<GenerationResult>;
}

/// A no-network stand-in adapter: fabricates a 1x1 PNG for every call and
/// resolves the seed the way a real backend would -- echo it back if the
/// caller pinned one, otherwise hand back a fresh synthetic seed so two
/// `-1` variants in the same run never collide.
pub struct RecordingSdClient {
    next_synthetic_seed: AtomicI64,
}

impl RecordingSdClient {
    pub fn new() -> Self {
        Self {
            next_synthetic_seed: AtomicI64::new(1),
        }
    }
}

impl Default for RecordingSdClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SdClient for RecordingSdClient {
    async fn generate(
        &self,
        _positive: &str,
        _negative: &str,
        _api_params: &Value,
        seed: i64,
    ) -> Result<GenerationResult> {
        let actual_seed = if seed == RANDOM_SEED_SENTINEL {
            self.next_synthetic_seed.fetch_add(1, Ordering::SeqCst)
        } else {
            seed
        };
        Ok(GenerationResult {
            image_bytes: BLANK_PNG_1X1.to_vec(),
            actual_seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_a_pinned_seed() {
        let client = RecordingSdClient::new();
        let result = client
            .generate("a prompt", "", &Value::Null, 42)
            .await
            .unwrap();
        assert_eq!(result.actual_seed, 42);
        assert_eq!(&result.image_bytes[..8], &BLANK_PNG_1X1[..8]);
    }

    #[tokio::test]
    async fn synthesizes_distinct_seeds_for_the_sentinel() {
        let client = RecordingSdClient::new();
        let a = client
            .generate("p", "", &Value::Null, RANDOM_SEED_SENTINEL)
            .await
            .unwrap();
        let b = client
            .generate("p", "", &Value::Null, RANDOM_SEED_SENTINEL)
            .await
            .unwrap();
        assert_ne!(a.actual_seed, b.actual_seed);
    }
}
