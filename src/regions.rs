// 🗺️ Region Directory - static code → region name lookup
//
// Source format (JSON): region name → list of codes
//   { "Waikato": ["WK", "WKT"], "Auckland": ["AK"] }
// Loaded once at start-up into an immutable reverse map. Lookups are
// case-insensitive and never fail: unknown codes resolve to "".

use std::collections::HashMap;
use std::path::Path;

use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Default)]
pub struct RegionDirectory {
    by_code: HashMap<String, String>,
}

impl RegionDirectory {
    /// Directory with no codes; everything resolves to "".
    pub fn empty() -> Self {
        RegionDirectory::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let by_region: HashMap<String, Vec<String>> = serde_json::from_str(json)?;

        let mut by_code = HashMap::new();
        for (region, codes) in by_region {
            for code in codes {
                let key = normalize(&code);
                if key.is_empty() {
                    continue;
                }
                if let Some(previous) = by_code.insert(key.clone(), region.clone()) {
                    if previous != region {
                        tracing::warn!(
                            code = %key,
                            kept = %region,
                            dropped = %previous,
                            "Region code listed under two regions"
                        );
                    }
                }
            }
        }

        Ok(RegionDirectory { by_code })
    }

    /// Load from a JSON file. A missing file yields an empty directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Region codes file not found, all region codes will resolve to empty"
            );
            return Ok(RegionDirectory::empty());
        }

        let json = std::fs::read_to_string(path)?;
        let directory = RegionDirectory::from_json_str(&json).map_err(|e| {
            IngestError::Config(format!("invalid region codes file {}: {}", path.display(), e))
        })?;

        tracing::info!(path = %path.display(), codes = directory.len(), "Loaded region directory");
        Ok(directory)
    }

    /// Canonical region name for a code, or "" when unknown.
    pub fn resolve(&self, code: &str) -> &str {
        self.by_code
            .get(&normalize(code))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(&normalize(code))
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Waikato": ["WK", "wkt"],
        "Auckland": ["AK", ""]
    }"#;

    #[test]
    fn test_known_code_resolves() {
        let dir = RegionDirectory::from_json_str(SAMPLE).unwrap();
        assert_eq!(dir.resolve("WK"), "Waikato");
        assert_eq!(dir.resolve(" wkt "), "Waikato");
        assert_eq!(dir.resolve("ak"), "Auckland");
        assert_eq!(dir.len(), 3);
    }

    #[test]
    fn test_unknown_code_is_empty_not_error() {
        let dir = RegionDirectory::from_json_str(SAMPLE).unwrap();
        assert_eq!(dir.resolve("ZZ"), "");
        assert_eq!(dir.resolve(""), "");
        assert!(!dir.contains("ZZ"));
    }

    #[test]
    fn test_missing_file_is_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let directory = RegionDirectory::load(&dir.path().join("absent.json")).unwrap();
        assert!(directory.is_empty());
        assert_eq!(directory.resolve("WK"), "");
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            RegionDirectory::load(&path),
            Err(IngestError::Config(_))
        ));
    }
}
