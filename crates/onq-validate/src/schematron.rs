use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use onq_core::{Detection, Finding, Level, Stage};
use onq_xml::roxmltree::Document;
use onq_xml::{element_path, LineMap, NamespaceMap, NoExtFunctions, XPath, XPathError};

use crate::artifacts::ArtifactSet;
use crate::xsd::mismatch_finding;

const SCH_NS: &str = "http://purl.oclc.org/dsdl/schematron";

/// One assertion failure or successful report from a pattern run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternHit {
    pub location: String,
    pub test: String,
    pub role: String,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct PatternOutcome {
    pub failed: Vec<PatternHit>,
    pub reported: Vec<PatternHit>,
}

/// Seam for the pattern-rule engine.
pub trait PatternEngine {
    fn artifact_name(&self) -> &str;
    fn evaluate(&self, doc: &Document) -> Result<PatternOutcome, XPathError>;
}

#[derive(Debug, Error)]
pub enum PatternLoadError {
    #[error("cannot read pattern rules {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse pattern rules {path}: {source}")]
    Xml {
        path: String,
        #[source]
        source: onq_xml::roxmltree::Error,
    },
    #[error("bad XPath in pattern rules {path}: {source}")]
    XPath {
        path: String,
        #[source]
        source: XPathError,
    },
}

struct Check {
    test: XPath,
    role: String,
    message: String,
    /// `report` fires when the test holds; `assert` fires when it does not.
    is_report: bool,
}

struct SchRule {
    context: XPath,
    checks: Vec<Check>,
}

/// Schematron-style pattern engine: `sch:ns` prefix bindings, patterns of
/// context rules with `sch:assert` / `sch:report` checks. Unlike the rule
/// DSL there is no per-rule isolation; a bad expression fails the whole
/// artifact at load time.
pub struct SchematronEngine {
    name: String,
    nsmap: NamespaceMap,
    rules: Vec<SchRule>,
}

impl SchematronEngine {
    pub fn load(path: &Path) -> Result<Self, PatternLoadError> {
        let display = path.display().to_string();
        let text = fs::read_to_string(path)
            .map_err(|source| PatternLoadError::Io { path: display.clone(), source })?;
        let doc = Document::parse(&text)
            .map_err(|source| PatternLoadError::Xml { path: display.clone(), source })?;

        let compile = |expr: &str| {
            XPath::compile(expr)
                .map_err(|source| PatternLoadError::XPath { path: display.clone(), source })
        };

        let mut nsmap = NamespaceMap::empty();
        let mut rules = Vec::new();
        for node in doc.descendants().filter(|n| n.is_element()) {
            if node.tag_name().namespace() != Some(SCH_NS) {
                continue;
            }
            match node.tag_name().name() {
                "ns" => {
                    if let (Some(prefix), Some(uri)) =
                        (node.attribute("prefix"), node.attribute("uri"))
                    {
                        nsmap = nsmap.with_binding(prefix, uri);
                    }
                }
                "rule" => {
                    let Some(context) = node.attribute("context") else { continue };
                    let mut checks = Vec::new();
                    for check in node.children().filter(|c| {
                        c.is_element() && c.tag_name().namespace() == Some(SCH_NS)
                    }) {
                        let is_report = match check.tag_name().name() {
                            "assert" => false,
                            "report" => true,
                            _ => continue,
                        };
                        let Some(test) = check.attribute("test") else { continue };
                        let default_role = if is_report { "info" } else { "error" };
                        checks.push(Check {
                            test: compile(test)?,
                            role: check.attribute("role").unwrap_or(default_role).to_lowercase(),
                            message: check
                                .text()
                                .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
                                .unwrap_or_default(),
                            is_report,
                        });
                    }
                    rules.push(SchRule { context: compile(context)?, checks });
                }
                _ => {}
            }
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(display);
        debug!(artifact = %name, rules = rules.len(), "pattern rules loaded");
        Ok(SchematronEngine { name, nsmap, rules })
    }
}

impl PatternEngine for SchematronEngine {
    fn artifact_name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, doc: &Document) -> Result<PatternOutcome, XPathError> {
        let mut outcome = PatternOutcome::default();
        let root = doc.root_element();
        for rule in &self.rules {
            for node in rule.context.select_nodes(root, &self.nsmap, &NoExtFunctions)? {
                for check in &rule.checks {
                    let held = check.test.matches(node, &self.nsmap, &NoExtFunctions)?;
                    let hit = || PatternHit {
                        location: element_path(node),
                        test: check.test.source().to_string(),
                        role: check.role.clone(),
                        message: check.message.clone(),
                    };
                    if check.is_report && held {
                        outcome.reported.push(hit());
                    } else if !check.is_report && !held {
                        outcome.failed.push(hit());
                    }
                }
            }
        }
        Ok(outcome)
    }
}

fn level_for_role(role: &str) -> Level {
    match role {
        "error" => Level::Error,
        "warning" => Level::Warning,
        _ => Level::Info,
    }
}

/// Pattern validation contract over a resolved artifact set.
pub fn validate_patterns(
    doc: &Document,
    document_name: &str,
    detection: Detection,
    artifacts: &ArtifactSet,
) -> Vec<Finding> {
    if !artifacts.pattern_rules.exists() {
        return vec![Finding::error(
            "schematron-missing",
            Stage::Schematron,
            format!("pattern rules not found: {}", artifacts.pattern_rules.display()),
            document_name,
        )
        .in_namespace(detection.variant)];
    }

    let engine = match SchematronEngine::load(&artifacts.pattern_rules) {
        Ok(engine) => engine,
        Err(err) => {
            return vec![Finding::error(
                "schematron-error",
                Stage::Schematron,
                err.to_string(),
                document_name,
            )
            .in_namespace(detection.variant)];
        }
    };
    validate_patterns_with(&engine, doc, document_name, detection, artifacts)
}

/// Same contract with a caller-supplied engine.
pub fn validate_patterns_with(
    engine: &dyn PatternEngine,
    doc: &Document,
    document_name: &str,
    detection: Detection,
    artifacts: &ArtifactSet,
) -> Vec<Finding> {
    let mut findings = mismatch_finding(Stage::Schematron, document_name, detection, artifacts)
        .into_iter()
        .collect::<Vec<_>>();

    let outcome = match engine.evaluate(doc) {
        Ok(outcome) => outcome,
        Err(err) => {
            findings.push(
                Finding::error(
                    "schematron-error",
                    Stage::Schematron,
                    format!("pattern evaluation failed: {}", err),
                    document_name,
                )
                .in_namespace(detection.variant)
                .with_artifact(engine.artifact_name()),
            );
            return findings;
        }
    };

    let lines = LineMap::build(doc);
    for hit in &outcome.failed {
        findings.push(
            Finding::new(
                level_for_role(&hit.role),
                "schematron-rule",
                Stage::Schematron,
                hit.message.clone(),
                document_name,
            )
            .at_line(lines.line_for_location(&hit.location))
            .with_context_path(hit.location.clone())
            .with_check_expression(hit.test.clone())
            .in_namespace(detection.variant)
            .with_artifact(engine.artifact_name()),
        );
    }
    // Successful reports stay in the audit trail rather than being dropped.
    for hit in &outcome.reported {
        findings.push(
            Finding::info("schematron-info", Stage::Schematron, hit.message.clone(), document_name)
                .at_line(lines.line_for_location(&hit.location))
                .with_context_path(hit.location.clone())
                .with_check_expression(hit.test.clone())
                .in_namespace(detection.variant)
                .with_artifact(engine.artifact_name()),
        );
    }

    if findings.is_empty() {
        findings.push(
            Finding::info(
                "validation-success",
                Stage::Schematron,
                format!("pattern validation passed using {}", engine.artifact_name()),
                document_name,
            )
            .in_namespace(detection.variant)
            .with_artifact(engine.artifact_name()),
        );
    }
    findings
}
