//! Input manifest parsing and validation.
//!
//! A manifest is a JSON array of entries, each naming a source asset and the
//! workflow template used to generate from it. Entries are validated against
//! the local filesystem and the template registry before any remote call;
//! a bad entry fails on its own without aborting the rest of the batch.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::CoreError;

/// One manifest row: a source asset plus the template to drive with it.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    /// Display name used for logs and output naming. Defaults to the source
    /// file stem when omitted.
    #[serde(default)]
    pub name: Option<String>,
    /// Path to the source asset.
    pub source: PathBuf,
    /// Workflow template identifier (file stem under the template directory).
    pub template: String,
    /// Named generation parameters forwarded verbatim with the submission.
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ManifestEntry {
    /// Name to show in logs and derive the output filename from.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            if !name.trim().is_empty() {
                return name.clone();
            }
        }
        self.source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "entry".to_string())
    }
}

/// The full ordered input manifest for one run.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Load and parse a manifest file.
    ///
    /// An empty manifest is rejected here; per-entry problems are left to
    /// [`validate_entry`] so they can be collected individually.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&text)?;
        if manifest.entries.is_empty() {
            return Err(CoreError::Validation(
                "Manifest contains no entries".to_string(),
            ));
        }
        Ok(manifest)
    }
}

/// Validate a single entry before any remote call.
///
/// Rules:
/// - The source file must exist and decode as a known image format
///   (header check only, the pixels are never read).
/// - The template id must be present in the registry.
/// - `params` must be a JSON object.
pub fn validate_entry(
    entry: &ManifestEntry,
    known_templates: &HashSet<String>,
) -> Result<(), CoreError> {
    if !entry.source.is_file() {
        return Err(CoreError::Validation(format!(
            "Source asset not found: {}",
            entry.source.display()
        )));
    }
    if let Err(e) = image::image_dimensions(&entry.source) {
        return Err(CoreError::Validation(format!(
            "Source is not a readable image: {}: {e}",
            entry.source.display()
        )));
    }
    if !known_templates.contains(&entry.template) {
        return Err(CoreError::Validation(format!(
            "Unknown template id: '{}'",
            entry.template
        )));
    }
    if !entry.params.is_object() {
        return Err(CoreError::Validation(
            "Entry params must be a JSON object".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> HashSet<String> {
        HashSet::from(["portrait-v2".to_string()])
    }

    fn write_test_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbaImage::new(2, 2)
            .save(&path)
            .expect("writing test png");
        path
    }

    // -- Manifest::load -------------------------------------------------------

    #[test]
    fn load_parses_entries_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(
            &path,
            r#"[
                {"name": "Ada Lovelace", "source": "assets/ada.png", "template": "portrait-v2"},
                {"source": "assets/grace.png", "template": "portrait-v2", "params": {"style_strength": 0.8}}
            ]"#,
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.entries[0].display_name(), "Ada Lovelace");
        assert_eq!(manifest.entries[1].display_name(), "grace");
        assert_eq!(
            manifest.entries[1].params["style_strength"],
            serde_json::json!(0.8)
        );
    }

    #[test]
    fn load_rejects_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, "[]").unwrap();

        let err = Manifest::load(&path).unwrap_err();
        assert!(err.to_string().contains("no entries"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = Manifest::load(Path::new("/nonexistent/manifest.json")).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }

    #[test]
    fn load_malformed_json_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, "{not json").unwrap();

        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, CoreError::Json(_)));
    }

    // -- validate_entry -------------------------------------------------------

    #[test]
    fn valid_entry_passes() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_test_png(dir.path(), "ada.png");

        let entry = ManifestEntry {
            name: Some("Ada".to_string()),
            source,
            template: "portrait-v2".to_string(),
            params: serde_json::json!({}),
        };
        assert!(validate_entry(&entry, &known()).is_ok());
    }

    #[test]
    fn missing_source_rejected() {
        let entry = ManifestEntry {
            name: None,
            source: PathBuf::from("/nonexistent/ada.png"),
            template: "portrait-v2".to_string(),
            params: serde_json::json!({}),
        };
        let err = validate_entry(&entry, &known()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn non_image_source_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.png");
        fs::write(&path, "plain text, not pixels").unwrap();

        let entry = ManifestEntry {
            name: None,
            source: path,
            template: "portrait-v2".to_string(),
            params: serde_json::json!({}),
        };
        let err = validate_entry(&entry, &known()).unwrap_err();
        assert!(err.to_string().contains("not a readable image"));
    }

    #[test]
    fn unknown_template_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_test_png(dir.path(), "ada.png");

        let entry = ManifestEntry {
            name: None,
            source,
            template: "does-not-exist".to_string(),
            params: serde_json::json!({}),
        };
        let err = validate_entry(&entry, &known()).unwrap_err();
        assert!(err.to_string().contains("Unknown template"));
    }

    #[test]
    fn non_object_params_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_test_png(dir.path(), "ada.png");

        let entry = ManifestEntry {
            name: None,
            source,
            template: "portrait-v2".to_string(),
            params: serde_json::json!([1, 2, 3]),
        };
        let err = validate_entry(&entry, &known()).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn blank_name_falls_back_to_source_stem() {
        let entry = ManifestEntry {
            name: Some("   ".to_string()),
            source: PathBuf::from("assets/grace.png"),
            template: "portrait-v2".to_string(),
            params: serde_json::json!({}),
        };
        assert_eq!(entry.display_name(), "grace");
    }
}
