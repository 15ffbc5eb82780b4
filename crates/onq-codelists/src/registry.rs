use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::warn;

/// One code -> folded-description table for a single numbered list.
pub type CodeTable = BTreeMap<String, String>;

/// One entry of the bundled multi-list resource.
#[derive(Debug, Deserialize)]
struct CodeEntry {
    code: String,
    description: String,
    #[serde(default)]
    deprecated: bool,
}

enum Source {
    Path(PathBuf),
    Embedded(&'static str),
}

/// Registry over the bundled multi-list codelist resource.
///
/// Tables load lazily on first lookup and are cached for the registry's
/// lifetime; the registry is read-only after that and safe to share across
/// concurrent runs. A missing or corrupt resource degrades to empty tables
/// rather than failing, and lookups on an unmodeled list number answer
/// "valid" so such lists never block rule evaluation.
pub struct CodelistRegistry {
    source: Source,
    cache: OnceLock<BTreeMap<String, CodeTable>>,
}

impl CodelistRegistry {
    /// Registry over the codelist issue shipped with the binary.
    pub fn bundled() -> Self {
        CodelistRegistry {
            source: Source::Embedded(include_str!("../../../resources/codelists.json")),
            cache: OnceLock::new(),
        }
    }

    /// Registry over an external resource file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        CodelistRegistry { source: Source::Path(path.into()), cache: OnceLock::new() }
    }

    fn tables(&self) -> &BTreeMap<String, CodeTable> {
        self.cache.get_or_init(|| {
            let raw = match &self.source {
                Source::Embedded(text) => text.to_string(),
                Source::Path(path) => match fs::read_to_string(path) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(path = %path.display(), %err, "codelist resource unreadable, degrading to empty tables");
                        return BTreeMap::new();
                    }
                },
            };
            match serde_json::from_str::<BTreeMap<String, Vec<CodeEntry>>>(&raw) {
                Ok(lists) => lists
                    .into_iter()
                    .map(|(number, entries)| (number, fold_entries(entries)))
                    .collect(),
                Err(err) => {
                    warn!(%err, "codelist resource malformed, degrading to empty tables");
                    BTreeMap::new()
                }
            }
        })
    }

    /// Whether the resource models this list number at all.
    pub fn has_list(&self, list_number: &str) -> bool {
        self.tables().contains_key(list_number)
    }

    /// The full table for a list. Empty for unmodeled lists.
    pub fn table(&self, list_number: &str) -> CodeTable {
        self.tables().get(list_number).cloned().unwrap_or_default()
    }

    /// Membership check. Unmodeled lists answer `true` by convention so a
    /// rule referencing a list we do not carry never fails on that account.
    pub fn is_valid(&self, list_number: &str, code: &str) -> bool {
        match self.tables().get(list_number) {
            Some(table) => table.contains_key(code),
            None => true,
        }
    }

    /// Human-readable description of a code, with deprecation folded in.
    pub fn describe(&self, list_number: &str, code: &str) -> Option<String> {
        self.tables().get(list_number).and_then(|t| t.get(code)).cloned()
    }
}

fn fold_entries(entries: Vec<CodeEntry>) -> CodeTable {
    entries
        .into_iter()
        .map(|e| {
            let description = if e.deprecated {
                format!("{} (deprecated)", e.description)
            } else {
                e.description
            };
            (e.code, description)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "5": [
            {"code": "01", "description": "Proprietary"},
            {"code": "02", "description": "ISBN-10", "deprecated": true},
            {"code": "15", "description": "ISBN-13"}
        ],
        "150": [
            {"code": "BB", "description": "Hardback"},
            {"code": "AJ", "description": "Downloadable audio file"}
        ]
    }"#;

    fn sample_registry() -> (tempfile::TempDir, CodelistRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codelists.json");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        (dir, CodelistRegistry::open(path))
    }

    #[test]
    fn membership_and_descriptions() {
        let (_dir, reg) = sample_registry();
        assert!(reg.is_valid("5", "15"));
        assert!(!reg.is_valid("5", "99"));
        assert_eq!(reg.describe("150", "BB").as_deref(), Some("Hardback"));
        assert_eq!(reg.describe("150", "ZZ"), None);
    }

    #[test]
    fn deprecated_is_folded_into_description() {
        let (_dir, reg) = sample_registry();
        assert_eq!(reg.describe("5", "02").as_deref(), Some("ISBN-10 (deprecated)"));
        // Deprecated codes are still members.
        assert!(reg.is_valid("5", "02"));
    }

    #[test]
    fn unmodeled_list_is_fail_open() {
        let (_dir, reg) = sample_registry();
        assert!(!reg.has_list("999"));
        assert!(reg.is_valid("999", "anything"));
        assert_eq!(reg.describe("999", "anything"), None);
        assert!(reg.table("999").is_empty());
    }

    #[test]
    fn missing_resource_degrades_to_empty() {
        let reg = CodelistRegistry::open("/nonexistent/codelists.json");
        assert!(!reg.has_list("5"));
        assert!(reg.is_valid("5", "whatever"));
    }

    #[test]
    fn malformed_resource_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "not json at all").unwrap();
        let reg = CodelistRegistry::open(&path);
        assert!(reg.table("5").is_empty());
    }

    #[test]
    fn bundled_resource_parses() {
        let reg = CodelistRegistry::bundled();
        assert!(reg.has_list("150"));
        assert!(reg.is_valid("5", "15"));
    }
}
