//! Reading and writing the pipeline's on-disk artifacts.
//!
//! Artifacts are pretty-printed UTF-8 JSON. A missing input artifact is
//! fatal for the run and reported with the step that produces it.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Read a JSON artifact; `producer` names the step that writes it.
pub fn read_json<T: DeserializeOwned>(path: &Path, producer: &str) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read {}. Run the `{}` step first",
            path.display(),
            producer
        )
    })?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write `value` as pretty JSON, creating parent directories as needed.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Raw lines of the areas file, blank lines removed.
pub fn read_areas(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read areas file {}. Create it with one subject area per line",
            path.display()
        )
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/out.json");
        let mut value = BTreeMap::new();
        value.insert("college".to_string(), vec!["Why?".to_string()]);
        write_json(&path, &value).unwrap();

        let back: BTreeMap<String, Vec<String>> = read_json(&path, "seed").unwrap();
        assert_eq!(back, value);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  "));
    }

    #[test]
    fn test_missing_input_names_producer() {
        let tmp = TempDir::new().unwrap();
        let err = read_json::<serde_json::Value>(&tmp.path().join("questions.json"), "seed")
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Run the `seed` step first"));
    }

    #[test]
    fn test_read_areas_skips_blank() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("areas.txt");
        std::fs::write(&path, "Biology\n\n  Ancient_History  \n").unwrap();
        assert_eq!(read_areas(&path).unwrap(), vec!["Biology", "Ancient_History"]);
    }
}
