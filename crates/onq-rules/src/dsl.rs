use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use onq_core::Level;

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("cannot read rule set {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse rule set {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// One declarative rule: `when` selects context nodes, `assert` must hold
/// for each of them.
#[derive(Clone, Debug, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub when: String,
    #[serde(rename = "assert")]
    pub assert_expr: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub explain: Option<String>,
}

fn default_severity() -> String {
    "warn".to_string()
}

impl Rule {
    /// Severity string to diagnostic level; unknown strings degrade to INFO.
    pub fn level(&self) -> Level {
        match self.severity.to_ascii_lowercase().as_str() {
            "error" => Level::Error,
            "warn" | "warning" => Level::Warning,
            _ => Level::Info,
        }
    }
}

/// Load a YAML rule set (a top-level sequence of rules).
pub fn load_rules(path: &Path) -> Result<Vec<Rule>, RuleLoadError> {
    let text = fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let rules: Option<Vec<Rule>> =
        serde_yaml::from_str(&text).map_err(|source| RuleLoadError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    Ok(rules.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
- id: title-present
  name: Product must carry a title
  when: "//Product"
  assert: ".//TitleText"
  severity: error
  explain: Retailers reject products without a title composite.
- id: price-positive
  name: Price amounts must be positive
  when: "//Price"
  assert: "PriceAmount > 0"
"#;

    fn write_rules(text: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_rules_with_severity_default() {
        let (_dir, path) = write_rules(SAMPLE);
        let rules = load_rules(&path).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].level(), Level::Error);
        assert_eq!(rules[1].severity, "warn");
        assert_eq!(rules[1].level(), Level::Warning);
        assert!(rules[1].explain.is_none());
    }

    #[test]
    fn empty_document_yields_no_rules() {
        let (_dir, path) = write_rules("");
        assert!(load_rules(&path).unwrap().is_empty());
    }

    #[test]
    fn unknown_severity_degrades_to_info() {
        let r = Rule {
            id: "x".into(),
            name: "x".into(),
            when: ".".into(),
            assert_expr: ".".into(),
            severity: "nonsense".into(),
            explain: None,
        };
        assert_eq!(r.level(), Level::Info);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_rules(Path::new("/nonexistent/rules.yml")).unwrap_err();
        assert!(matches!(err, RuleLoadError::Io { .. }));
    }
}
