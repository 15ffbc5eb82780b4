use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use onq_core::{Detection, Finding, Stage};
use onq_xml::roxmltree::{Document, Node};

use crate::artifacts::ArtifactSet;

const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// One engine-reported violation, line/column as reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaDiagnostic {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// Seam for the structural validation engine.
pub trait SchemaEngine {
    fn artifact_name(&self) -> &str;
    fn diagnostics(&self, doc: &Document) -> Vec<SchemaDiagnostic>;
}

#[derive(Debug, Error)]
pub enum SchemaLoadError {
    #[error("cannot read schema {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse schema {path}: {source}")]
    Xml {
        path: String,
        #[source]
        source: onq_xml::roxmltree::Error,
    },
}

#[derive(Clone, Debug)]
enum Content {
    /// No modeled content: children pass, text passes.
    Any,
    Sequence(Vec<Particle>),
}

#[derive(Clone, Debug)]
struct Particle {
    name: String,
    min: u32,
    /// `None` means unbounded.
    max: Option<u32>,
}

/// Structural subset of W3C XML Schema sufficient for the bundled message
/// schemas: named element declarations with inline sequence content and
/// occurrence bounds. Element names are treated as global (ONIX tag names
/// are unique), so nested declarations flatten into one table. Elements
/// without a declaration validate laxly.
pub struct XsdSubsetEngine {
    name: String,
    roots: Vec<String>,
    elements: BTreeMap<String, Content>,
}

impl XsdSubsetEngine {
    pub fn load(path: &Path) -> Result<Self, SchemaLoadError> {
        let text = fs::read_to_string(path).map_err(|source| SchemaLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let doc = Document::parse(&text).map_err(|source| SchemaLoadError::Xml {
            path: path.display().to_string(),
            source,
        })?;

        let mut elements = BTreeMap::new();
        let mut roots = Vec::new();
        let schema_root = doc.root_element();
        for node in schema_root.descendants() {
            if is_xsd(node, "element") {
                if let Some(name) = node.attribute("name") {
                    elements.insert(name.to_string(), element_content(node));
                }
            }
        }
        for child in schema_root.children() {
            if is_xsd(child, "element") {
                if let Some(name) = child.attribute("name") {
                    roots.push(name.to_string());
                }
            }
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!(schema = %name, declarations = elements.len(), "schema loaded");
        Ok(XsdSubsetEngine { name, roots, elements })
    }

    fn check(&self, node: Node, out: &mut Vec<SchemaDiagnostic>, doc: &Document) {
        let local = node.tag_name().name();
        if let Some(Content::Sequence(particles)) = self.elements.get(local) {
            let children: Vec<Node> = node.children().filter(|c| c.is_element()).collect();
            for child in &children {
                let child_name = child.tag_name().name();
                if !particles.iter().any(|p| p.name == child_name) {
                    out.push(diag(
                        doc,
                        *child,
                        format!("element '{}' is not allowed inside '{}'", child_name, local),
                    ));
                }
            }
            for particle in particles {
                let count = children
                    .iter()
                    .filter(|c| c.tag_name().name() == particle.name)
                    .count() as u32;
                if count < particle.min {
                    out.push(diag(
                        doc,
                        node,
                        format!(
                            "element '{}' requires at least {} '{}' (found {})",
                            local, particle.min, particle.name, count
                        ),
                    ));
                }
                if let Some(max) = particle.max {
                    if count > max {
                        out.push(diag(
                            doc,
                            node,
                            format!(
                                "element '{}' allows at most {} '{}' (found {})",
                                local, max, particle.name, count
                            ),
                        ));
                    }
                }
            }
        }
        for child in node.children().filter(|c| c.is_element()) {
            self.check(child, out, doc);
        }
    }
}

impl SchemaEngine for XsdSubsetEngine {
    fn artifact_name(&self) -> &str {
        &self.name
    }

    fn diagnostics(&self, doc: &Document) -> Vec<SchemaDiagnostic> {
        let mut out = Vec::new();
        let root = doc.root_element();
        let root_name = root.tag_name().name();
        if !self.roots.is_empty() && !self.roots.iter().any(|r| r == root_name) {
            out.push(diag(
                doc,
                root,
                format!("root element '{}' is not declared by the schema", root_name),
            ));
            return out;
        }
        self.check(root, &mut out, doc);
        out
    }
}

fn diag(doc: &Document, node: Node, message: String) -> SchemaDiagnostic {
    let pos = doc.text_pos_at(node.range().start);
    SchemaDiagnostic { line: pos.row, column: pos.col, message }
}

fn is_xsd(node: Node, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(XSD_NS)
}

fn element_content(element: Node) -> Content {
    let sequence = element
        .children()
        .find(|c| is_xsd(*c, "complexType"))
        .and_then(|ct| ct.children().find(|c| is_xsd(*c, "sequence")));
    let Some(sequence) = sequence else {
        return Content::Any;
    };
    let particles = sequence
        .children()
        .filter(|c| is_xsd(*c, "element"))
        .filter_map(|e| {
            let name = e.attribute("name").or_else(|| e.attribute("ref"))?;
            Some(Particle {
                name: name.to_string(),
                min: occurs(e, "minOccurs").unwrap_or(1),
                max: match e.attribute("maxOccurs") {
                    Some("unbounded") => None,
                    _ => Some(occurs(e, "maxOccurs").unwrap_or(1)),
                },
            })
        })
        .collect();
    Content::Sequence(particles)
}

fn occurs(node: Node, attr: &str) -> Option<u32> {
    node.attribute(attr).and_then(|v| v.parse().ok())
}

/// Structural validation contract over a resolved artifact set.
pub fn validate_structure(
    doc: &Document,
    document_name: &str,
    detection: Detection,
    artifacts: &ArtifactSet,
) -> Vec<Finding> {
    if !artifacts.schema.exists() {
        return vec![Finding::error(
            "schema-missing",
            Stage::Schema,
            format!("schema not found: {}", artifacts.schema.display()),
            document_name,
        )
        .in_namespace(detection.variant)];
    }

    let engine = match XsdSubsetEngine::load(&artifacts.schema) {
        Ok(engine) => engine,
        Err(err) => {
            return vec![Finding::error("schema-error", Stage::Schema, err.to_string(), document_name)
                .in_namespace(detection.variant)];
        }
    };
    validate_structure_with(&engine, doc, document_name, detection, artifacts)
}

/// Same contract with a caller-supplied engine.
pub fn validate_structure_with(
    engine: &dyn SchemaEngine,
    doc: &Document,
    document_name: &str,
    detection: Detection,
    artifacts: &ArtifactSet,
) -> Vec<Finding> {
    let mut findings = mismatch_finding(Stage::Schema, document_name, detection, artifacts)
        .into_iter()
        .collect::<Vec<_>>();

    for d in engine.diagnostics(doc) {
        findings.push(
            Finding::error(
                "structural-schema",
                Stage::Schema,
                format!("{} (column {})", d.message, d.column),
                document_name,
            )
            .at_line(d.line)
            .in_namespace(detection.variant)
            .with_artifact(engine.artifact_name()),
        );
    }

    if findings.is_empty() {
        findings.push(
            Finding::info(
                "validation-success",
                Stage::Schema,
                format!("structural validation passed using {}", engine.artifact_name()),
                document_name,
            )
            .in_namespace(detection.variant)
            .with_artifact(engine.artifact_name()),
        );
    }
    findings
}

/// The single mismatch marker both validators emit before running:
/// recognized document on a fallback artifact warns, demo document on a
/// production artifact informs. Never blocks validation.
pub(crate) fn mismatch_finding(
    stage: Stage,
    document_name: &str,
    detection: Detection,
    artifacts: &ArtifactSet,
) -> Option<Finding> {
    if detection.recognized && artifacts.fallback {
        Some(
            Finding::warning(
                "artifact-mismatch",
                stage,
                "recognized ONIX document validated against fallback artifacts; use the production set",
                document_name,
            )
            .in_namespace(detection.variant),
        )
    } else if !detection.recognized && !artifacts.fallback {
        Some(
            Finding::info(
                "artifact-info",
                stage,
                "production artifacts applied to a demo/legacy document",
                document_name,
            )
            .in_namespace(detection.variant),
        )
    } else {
        None
    }
}
