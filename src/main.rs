// src/main.rs
//
// =============================================================================
// SDFORGE: CLI DRIVER & ENTRY POINT
// =============================================================================
//
// The thin binary that exercises the engine end to end: resolve a root
// document, print a summary, walk the variant iterator against a
// `SdClient`, and write `manifest.json`. No real HTTP calls -- the backend
// collaborator is `RecordingSdClient`, a recording stand-in. Mirrors
// `main.rs`'s `Cli`/`Commands`/`#[tokio::main]` shape, narrowed to this
// engine's actual surface: one command, no daemon/TUI/deploy concerns.

use anyhow::{Context, Result};
use clap::Parser;
use sdforge::driver::{RecordingSdClient, SdClient};
use sdforge::{load_and_resolve, Overrides};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Parser)]
#[command(name = "sdforge", version = "2.0", about = "Batch template resolution and variant generation for Stable Diffusion")]
struct Cli {
    /// Root document to resolve: a leaf `*.prompt.yaml`.
    root: PathBuf,

    /// Where to write the manifest.
    #[arg(long, default_value = "manifest.json")]
    output: PathBuf,

    /// Resolve and print the summary without generating any images.
    #[arg(long)]
    dry_run: bool,

    /// Overrides `generation.max_images` from the CLI.
    #[arg(long)]
    max_images: Option<u32>,

    /// Overrides `generation.seed` from the CLI.
    #[arg(long)]
    seed: Option<i64>,

    /// Abort the whole run on the first per-image generation failure,
    /// instead of recording it on the `ImageRecord` and continuing.
    #[arg(long)]
    strict: bool,

    /// Milliseconds to sleep between generation requests.
    #[arg(long, default_value_t = 200)]
    pace_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let overrides = Overrides {
        max_images: cli.max_images,
        seed: cli.seed,
        strict: cli.strict,
    };

    log::info!("resolving {}", cli.root.display());
    let run = load_and_resolve(&cli.root, overrides)
        .with_context(|| format!("failed to resolve {}", cli.root.display()))?;

    log::info!(
        "{} total combination(s), {} image(s) to generate",
        run.total_combinations(),
        run.num_images()
    );

    if cli.dry_run {
        for variant in run.iter() {
            log::info!("[{}] positive: {}", variant.index, variant.positive);
            if !variant.negative.is_empty() {
                log::info!("[{}] negative: {}", variant.index, variant.negative);
            }
        }
        return Ok(());
    }

    let client = RecordingSdClient::new();
    let mut writer = sdforge::ManifestWriter::create(&cli.output)
        .with_context(|| format!("failed to open manifest at {}", cli.output.display()))?;
    let images_dir = cli
        .output
        .parent()
        .map(|p| p.join("images"))
        .unwrap_or_else(|| PathBuf::from("images"));
    std::fs::create_dir_all(&images_dir)
        .with_context(|| format!("failed to create {}", images_dir.display()))?;

    let runtime_info = fetch_runtime_info();

    let mut interrupted = tokio::spawn(async {
        tokio::signal::ctrl_c().await.ok();
    });

    for variant in run.iter() {
        if interrupted.is_finished() {
            log::warn!("interrupt received, stopping before variant {}", variant.index);
            break;
        }

        let filename = format!("img_{:04}.png", variant.index);
        match client
            .generate(&variant.positive, &variant.negative, &variant.api_params, variant.seed_hint)
            .await
        {
            Ok(result) => {
                let path = images_dir.join(&filename);
                std::fs::write(&path, &result.image_bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                log::info!("[{}] generated seed={} -> {}", variant.index, result.actual_seed, filename);
                writer.record_image(
                    variant.index,
                    filename,
                    result.actual_seed,
                    variant.positive,
                    variant.negative,
                    variant.applied_variations,
                    None,
                );
            }
            Err(e) => {
                log::error!("[{}] generation failed: {e}", variant.index);
                if cli.strict {
                    return Err(e.context(format!("variant {} failed and --strict is set", variant.index)));
                }
                writer.record_image(
                    variant.index,
                    filename,
                    variant.seed_hint,
                    variant.positive,
                    variant.negative,
                    variant.applied_variations,
                    Some(e.to_string()),
                );
            }
        }

        sleep(Duration::from_millis(cli.pace_ms)).await;
    }

    interrupted.abort();
    let snapshot = run.snapshot(runtime_info);
    let image_count = writer.images().len();
    writer
        .finish(snapshot)
        .with_context(|| format!("failed to write manifest at {}", cli.output.display()))?;
    log::info!("wrote {} image record(s) to {}", image_count, cli.output.display());

    Ok(())
}

/// A real driver would query the backend's `/sdapi/v1/options` (or similar)
/// for the active checkpoint; this stand-in never talks to a backend, so it
/// always reports "unknown" -- the same fallback a live driver uses when
/// that query fails.
fn fetch_runtime_info() -> serde_json::Value {
    serde_json::json!({ "sd_model_checkpoint": "unknown" })
}
