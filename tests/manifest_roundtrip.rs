// End-to-end: resolve a run, drive a fake generation loop, write the
// manifest, then read it back and confirm every field survives the
// serialize/deserialize/rename cycle untouched.

use sdforge::{load_and_resolve, ManifestWriter, Manifest, Overrides};
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::File::create(&path).unwrap().write_all(content.as_bytes()).unwrap();
    path
}

#[test]
fn manifest_round_trips_a_full_resolved_run() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "expr.yaml", "happy: smiling\nsad: crying\n");
    let leaf = write_file(
        dir.path(),
        "leaf.prompt.yaml",
        &format!(
            "version: \"2.0\"\nimports:\n  Expression: {}\nprompt: \"portrait, {{Expression}}\"\nnegative_prompt: \"blurry\"\ngeneration:\n  mode: combinatorial\n  seed: 500\n  seed_mode: progressive\n",
            dir.path().join("expr.yaml").display()
        ),
    );
    let run = load_and_resolve(&leaf, Overrides::default()).unwrap();

    let manifest_path = dir.path().join("out").join("manifest.json");
    let mut writer = ManifestWriter::create(&manifest_path).unwrap();
    for (i, variant) in run.iter().enumerate() {
        let failed = i == 1;
        let filename = format!("img_{:04}.png", variant.index);
        writer.record_image(
            variant.index,
            filename,
            variant.seed_hint,
            variant.positive,
            variant.negative,
            variant.applied_variations,
            if failed { Some("backend unreachable".to_string()) } else { None },
        );
    }
    let snapshot = run.snapshot(serde_json::json!({"sd_model_checkpoint": "sd_xl_base_1.0.safetensors"}));
    writer.finish(snapshot).unwrap();

    assert!(manifest_path.exists());
    assert!(!manifest_path.with_extension("json.tmp").exists());

    let content = std::fs::read_to_string(&manifest_path).unwrap();
    let manifest: Manifest = serde_json::from_str(&content).unwrap();

    assert_eq!(manifest.images.len(), 2);
    assert_eq!(manifest.images[0].filename, "img_0000.png");
    assert_eq!(manifest.images[0].actual_seed, 500);
    assert_eq!(manifest.images[0].error, None);
    assert_eq!(manifest.images[1].actual_seed, 501);
    assert_eq!(manifest.images[1].error.as_deref(), Some("backend unreachable"));

    assert_eq!(manifest.snapshot.resolved_template.prompt, "portrait, {Expression}");
    assert_eq!(manifest.snapshot.resolved_template.negative_prompt, "blurry");
    assert_eq!(manifest.snapshot.generation_params.base_seed, 500);
    assert_eq!(manifest.snapshot.generation_params.num_images, 2);
    assert_eq!(manifest.snapshot.generation_params.total_combinations, 2);
    assert_eq!(
        manifest.snapshot.variations["Expression"],
        vec!["happy".to_string(), "sad".to_string()]
    );
    assert_eq!(
        manifest.snapshot.runtime_info["sd_model_checkpoint"],
        "sd_xl_base_1.0.safetensors"
    );
}

#[test]
fn manifest_writer_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b").join("c").join("manifest.json");
    let writer = ManifestWriter::create(&nested).unwrap();
    assert!(nested.parent().unwrap().exists());
    drop(writer);
}
