use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Load a JSON configuration from disk, creating it with the provided initializer if missing.
pub fn load_or_init<T, F>(path: &Path, initializer: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    if let Some(value) = load_json_if_exists(path)? {
        return Ok(value);
    }

    let value = initializer();
    save_json(path, &value)?;
    Ok(value)
}

/// Read and parse a JSON file, returning `None` when it does not exist yet.
pub fn load_json_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Pretty-print `value` as JSON to `path`, creating parent directories as needed.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let serialized = serde_json::to_string_pretty(value)?;
    fs::write(path, serialized).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Knobs {
        seed: u64,
        noise: f32,
    }

    #[test]
    fn creates_config_with_defaults_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");

        let knobs: Knobs = load_or_init(&path, || Knobs { seed: 7, noise: 0.4 }).unwrap();
        assert_eq!(knobs, Knobs { seed: 7, noise: 0.4 });
        assert!(path.exists());

        let reloaded: Knobs = load_or_init(&path, || Knobs { seed: 0, noise: 0.0 }).unwrap();
        assert_eq!(reloaded, knobs);
    }

    #[test]
    fn missing_json_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Knobs> = load_json_if_exists(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn malformed_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load_json_if_exists::<Knobs>(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
