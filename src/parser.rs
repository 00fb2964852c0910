// src/parser.rs
//
// =============================================================================
// SDFORGE: PARSER
// =============================================================================
//
// YAML -> typed documents. Dispatches on a required `version` field and a
// file-kind discriminator inferred from which top-level keys are present.
// Grounded on `dsl::load_yaml`'s version check and `dsl::validate`'s
// strict-field philosophy: unknown top-level keys are rejected for
// Prompt/Template/Chunk (collected via each struct's `extra` flatten field
// so the error can list every offending key, not just the first), accepted
// leniently for variation-set metadata.

use crate::document::{
    ChunkDoc, PromptDoc, RawDocument, RawVariationFile, TemplateDoc, SUPPORTED_VERSION,
};
use crate::error::EngineError;
use std::path::Path;

/// Parses one YAML source into a [`RawDocument`], dispatching on structure.
pub fn parse_document(raw: &str, path: &Path) -> Result<RawDocument, EngineError> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(raw).map_err(|e| EngineError::parse(e, path))?;

    let mapping = value
        .as_mapping()
        .ok_or_else(|| EngineError::parse("document root is not a YAML mapping", path))?;

    let has_variations_key = mapping.contains_key("variations");
    let has_type_key = mapping.contains_key("type");
    let has_fields_key = mapping.contains_key("fields");
    let has_body_key = mapping.contains_key("body");
    let has_prompt_key = mapping.contains_key("prompt");

    // Variation files (multi_field form): `type: multi_field` + `variations:`.
    // Checked first since these never carry `version`.
    if has_variations_key || has_type_key {
        let rv: RawVariationFile =
            serde_yaml::from_value(value).map_err(|e| EngineError::parse(e, path))?;
        return Ok(RawDocument::VariationSet(rv));
    }

    // Chunks: `fields`/`body`, no `prompt` body of their own -- "fields"
    // is one of the kind-inferring field groups.
    if (has_fields_key || has_body_key) && !has_prompt_key {
        let chunk: ChunkDoc =
            serde_yaml::from_value(value).map_err(|e| EngineError::parse(e, path))?;
        reject_unknown_keys(&chunk.extra, path)?;
        return Ok(RawDocument::Chunk(chunk));
    }

    // Anything left with no `prompt` key and no chunk/variation shape is a
    // bare flat variation mapping (`key: text`, no `version` at all): a
    // variation file is either a flat mapping key: text or an object with
    // type: multi_field + variations: [...].
    if !has_prompt_key {
        let rv: RawVariationFile =
            serde_yaml::from_value(value).map_err(|e| EngineError::parse(e, path))?;
        return Ok(RawDocument::VariationSet(rv));
    }

    let version = mapping
        .get("version")
        .and_then(|v| v.as_str())
        .ok_or_else(|| EngineError::parse("missing required field 'version'", path))?;
    if version != SUPPORTED_VERSION {
        return Err(EngineError::version(version, path));
    }

    // Prompt vs. Template: a Prompt is disambiguated from a Template by
    // `generation` being present -- a leaf document declaring its own
    // generation settings is a Prompt; an `implements` target that leaves
    // `generation` to its descendants is a Template.
    if mapping.contains_key("generation") {
        let prompt: PromptDoc =
            serde_yaml::from_value(value).map_err(|e| EngineError::parse(e, path))?;
        reject_unknown_keys(&prompt.extra, path)?;
        Ok(RawDocument::Prompt(prompt))
    } else {
        let template: TemplateDoc =
            serde_yaml::from_value(value).map_err(|e| EngineError::parse(e, path))?;
        reject_unknown_keys(&template.extra, path)?;
        Ok(RawDocument::Template(template))
    }
}

fn reject_unknown_keys(
    extra: &std::collections::BTreeMap<String, serde_yaml::Value>,
    path: &Path,
) -> Result<(), EngineError> {
    if extra.is_empty() {
        return Ok(());
    }
    let keys: Vec<&str> = extra.keys().map(|s| s.as_str()).collect();
    Err(EngineError::parse(
        format!("unknown top-level key(s): {}", keys.join(", ")),
        path,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn p() -> PathBuf {
        PathBuf::from("test.yaml")
    }

    #[test]
    fn parses_flat_variation_file() {
        let yaml = "happy: smiling\nsad: crying\n";
        match parse_document(yaml, &p()).unwrap() {
            RawDocument::VariationSet(RawVariationFile::Flat(map)) => {
                let happy = map.get(&serde_yaml::Value::String("happy".to_string()));
                assert_eq!(happy.and_then(|v| v.as_str()), Some("smiling"));
            }
            other => panic!("expected flat variation set, got {other:?}"),
        }
    }

    #[test]
    fn parses_multi_field_variation_file() {
        let yaml = r#"
type: multi_field
variations:
  - key: happy
    fields:
      face: "smiling"
      eyes: "bright"
"#;
        match parse_document(yaml, &p()).unwrap() {
            RawDocument::VariationSet(RawVariationFile::MultiField { variations, .. }) => {
                assert_eq!(variations.len(), 1);
                assert_eq!(variations[0].key, "happy");
            }
            other => panic!("expected multi_field variation set, got {other:?}"),
        }
    }

    #[test]
    fn parses_template_without_generation() {
        let yaml = r#"
version: "2.0"
prompt: "masterpiece, {prompt}"
"#;
        assert!(matches!(
            parse_document(yaml, &p()).unwrap(),
            RawDocument::Template(_)
        ));
    }

    #[test]
    fn parses_prompt_with_generation() {
        let yaml = r#"
version: "2.0"
prompt: "{Expression}"
generation:
  mode: combinatorial
  seed: 1000
  seed_mode: progressive
"#;
        assert!(matches!(
            parse_document(yaml, &p()).unwrap(),
            RawDocument::Prompt(_)
        ));
    }

    #[test]
    fn parses_chunk() {
        let yaml = r#"
version: "2.0"
fields:
  mood:
    default: "neutral"
body: "expression: {mood}"
"#;
        assert!(matches!(
            parse_document(yaml, &p()).unwrap(),
            RawDocument::Chunk(_)
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let yaml = "version: \"1.0\"\nprompt: \"x\"\n";
        let err = parse_document(yaml, &p()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Parse);
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let yaml = "version: \"2.0\"\nprompt: \"x\"\nbogus_key: 1\n";
        let err = parse_document(yaml, &p()).unwrap_err();
        assert!(err.message.contains("bogus_key"));
    }
}
