use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use onq_codelists::CodelistRegistry;
use onq_core::{Detection, Finding, Stage, Variant};
use onq_rules::evaluate_rules;
use onq_score::{
    compare_retailers, score_completeness, CompletenessReport, RetailerComparison,
};
use onq_validate::{
    artifact_fingerprint, validate_patterns, validate_structure, ArtifactSet, ArtifactStore,
};
use onq_xml::roxmltree::Document;
use onq_xml::{detect_variant, is_legacy_onix_root};

use crate::config::Config;

/// What one run should produce beyond the validation findings.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub completeness: bool,
    /// `Some` enables retailer comparison over these profile keys;
    /// an empty vec means the configured defaults.
    pub retailers: Option<Vec<String>>,
}

/// Paths and fingerprints of the artifacts a run resolved, for
/// reproducibility of the report.
#[derive(Clone, Debug, Serialize)]
pub struct ArtifactRecord {
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_sha256: Option<String>,
    pub pattern_rules: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_rules_sha256: Option<String>,
    pub dsl_rules: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dsl_rules_sha256: Option<String>,
    pub fallback: bool,
}

impl ArtifactRecord {
    fn from_set(set: &ArtifactSet) -> Self {
        ArtifactRecord {
            schema: set.schema.display().to_string(),
            schema_sha256: artifact_fingerprint(&set.schema),
            pattern_rules: set.pattern_rules.display().to_string(),
            pattern_rules_sha256: artifact_fingerprint(&set.pattern_rules),
            dsl_rules: set.dsl_rules.display().to_string(),
            dsl_rules_sha256: artifact_fingerprint(&set.dsl_rules),
            fallback: set.fallback,
        }
    }
}

/// The serializable outcome of one pipeline run. Identical input and
/// resources produce an identical report.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub document_name: String,
    pub variant: Variant,
    pub recognized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactRecord>,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completeness: Option<CompletenessReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retailer_comparison: Option<RetailerComparison>,
}

/// One configured pipeline instance. Construct once, run many documents;
/// the codelist registry cache is shared across runs.
pub struct Pipeline {
    store: ArtifactStore,
    registry: CodelistRegistry,
    default_retailers: Vec<String>,
}

impl Pipeline {
    pub fn new(config: &Config) -> Self {
        let registry = match &config.resources.codelists {
            Some(path) => CodelistRegistry::open(path.clone()),
            None => CodelistRegistry::bundled(),
        };
        Pipeline {
            store: ArtifactStore::new(config.resources.root.clone()),
            registry,
            default_retailers: config.scoring.default_retailers.clone(),
        }
    }

    pub fn registry(&self) -> &CodelistRegistry {
        &self.registry
    }

    /// Run a document from disk. Only the read itself can fail; everything
    /// downstream degrades to findings.
    pub fn run_file(&self, path: &Path, options: &RunOptions) -> Result<RunReport> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(self.run_text(&text, &name, options))
    }

    pub fn run_text(&self, text: &str, document_name: &str, options: &RunOptions) -> RunReport {
        let doc = match Document::parse(text) {
            Ok(doc) => doc,
            Err(err) => {
                // Malformed XML short-circuits the run: one parse finding,
                // no validation stages, no scores.
                let pos = err.pos();
                let finding = Finding::error(
                    "xml-syntax",
                    Stage::Parse,
                    format!("XML syntax error: {}", err),
                    document_name,
                )
                .at_line(pos.row);
                return RunReport {
                    document_name: document_name.to_string(),
                    variant: Variant::None,
                    recognized: false,
                    artifacts: None,
                    findings: vec![finding],
                    completeness: None,
                    retailer_comparison: None,
                };
            }
        };

        let detection = detect_variant(&doc);
        debug!(?detection, document_name, "variant detected");
        if !detection.recognized && is_legacy_onix_root(&doc) {
            debug!(document_name, "namespace-less ONIX root, fallback artifacts apply");
        }
        let artifacts = self.store.select(detection.variant);

        let mut findings = Vec::new();
        findings.extend(validate_structure(&doc, document_name, detection, &artifacts));
        findings.extend(validate_patterns(&doc, document_name, detection, &artifacts));
        findings.extend(evaluate_rules(
            &doc,
            document_name,
            detection,
            &artifacts.dsl_rules,
            &self.registry,
        ));

        let completeness = options
            .completeness
            .then(|| score_completeness(&doc, detection));
        let retailer_comparison = options
            .retailers
            .as_ref()
            .and_then(|keys| self.compare(&doc, detection, keys));

        info!(
            document_name,
            findings = findings.len(),
            fallback = artifacts.fallback,
            "run complete"
        );
        RunReport {
            document_name: document_name.to_string(),
            variant: detection.variant,
            recognized: detection.recognized,
            artifacts: Some(ArtifactRecord::from_set(&artifacts)),
            findings,
            completeness,
            retailer_comparison,
        }
    }

    fn compare(
        &self,
        doc: &Document,
        detection: Detection,
        keys: &[String],
    ) -> Option<RetailerComparison> {
        let keys: Vec<&str> = if keys.is_empty() {
            self.default_retailers.iter().map(String::as_str).collect()
        } else {
            keys.iter().map(String::as_str).collect()
        };
        compare_retailers(doc, detection, &keys, &self.registry)
    }
}
