use std::path::Path;

use tracing::debug;

use onq_codelists::CodelistRegistry;
use onq_core::{Detection, Finding, Stage};
use onq_xml::roxmltree::Document;
use onq_xml::{element_path, namespace_map_for, ExtFunctions, XPath};

use crate::dsl::{load_rules, Rule, RuleLoadError};

/// XPath extension surface backed by the codelist registry.
///
/// `in-codelist(list_number, value)` tests membership, inheriting the
/// registry's fail-open behavior for unmodeled lists.
pub struct CodelistFns<'a> {
    registry: &'a CodelistRegistry,
}

impl<'a> CodelistFns<'a> {
    pub fn new(registry: &'a CodelistRegistry) -> Self {
        CodelistFns { registry }
    }
}

impl ExtFunctions for CodelistFns<'_> {
    fn call(&self, name: &str, args: &[String]) -> Option<bool> {
        match (name, args) {
            ("in-codelist", [list, value]) => Some(self.registry.is_valid(list, value.trim())),
            _ => None,
        }
    }
}

/// Evaluate a rule set against a parsed document.
///
/// Each rule is isolated: a malformed XPath in one rule becomes its own
/// ERROR finding and never aborts the remaining rules. A clean run over a
/// non-empty rule set yields exactly one INFO success marker.
pub fn evaluate_rules(
    doc: &Document,
    document_name: &str,
    detection: Detection,
    rules_path: &Path,
    registry: &CodelistRegistry,
) -> Vec<Finding> {
    let artifact = rules_path.display().to_string();

    let rules = match load_rules(rules_path) {
        Ok(rules) => rules,
        Err(RuleLoadError::Io { .. }) => {
            return vec![Finding::error(
                "rules-missing",
                Stage::Rules,
                format!("rule set not found: {}", artifact),
                document_name,
            )
            .in_namespace(detection.variant)];
        }
        Err(err @ RuleLoadError::Parse { .. }) => {
            return vec![Finding::error(
                "rule-set-error",
                Stage::Rules,
                err.to_string(),
                document_name,
            )
            .in_namespace(detection.variant)
            .with_artifact(artifact)];
        }
    };

    let nsmap = namespace_map_for(detection.variant);
    let ext = CodelistFns::new(registry);
    let root = doc.root_element();
    let mut findings = Vec::new();

    for rule in &rules {
        debug!(rule = %rule.id, "evaluating rule");
        let (when, check) = match (XPath::compile(&rule.when), XPath::compile(&rule.assert_expr)) {
            (Ok(w), Ok(c)) => (w, c),
            (Err(err), _) | (_, Err(err)) => {
                findings.push(xpath_error(rule, &err.to_string(), document_name, &detection));
                continue;
            }
        };

        let contexts = match when.select_nodes(root, &nsmap, &ext) {
            Ok(nodes) => nodes,
            Err(err) => {
                findings.push(xpath_error(rule, &err.to_string(), document_name, &detection));
                continue;
            }
        };
        // A rule whose context never matches contributes nothing.
        for node in contexts {
            let held = match check.evaluate(node, &nsmap, &ext) {
                Ok(value) => value.truthy(),
                Err(err) => {
                    findings.push(
                        xpath_error(rule, &err.to_string(), document_name, &detection)
                            .with_context_path(element_path(node)),
                    );
                    continue;
                }
            };
            if !held {
                let line = doc.text_pos_at(node.range().start).row;
                let mut finding = Finding::new(
                    rule.level(),
                    "custom-rule",
                    Stage::Rules,
                    rule.name.clone(),
                    document_name,
                )
                .at_line(line)
                .with_rule_id(rule.id.clone())
                .with_context_path(element_path(node))
                .with_check_expression(rule.assert_expr.clone())
                .in_namespace(detection.variant)
                .with_artifact(artifact.clone());
                if let Some(explain) = &rule.explain {
                    finding = finding.with_explanation(explain.clone());
                }
                findings.push(finding);
            }
        }
    }

    if findings.is_empty() && !rules.is_empty() {
        findings.push(
            Finding::info(
                "validation-success",
                Stage::Rules,
                format!("rule evaluation passed using {} ({} rules)", artifact, rules.len()),
                document_name,
            )
            .in_namespace(detection.variant)
            .with_artifact(artifact),
        );
    }

    findings
}

fn xpath_error(rule: &Rule, message: &str, document_name: &str, detection: &Detection) -> Finding {
    Finding::error(
        "xpath-error",
        Stage::Rules,
        format!("XPath error in rule '{}': {}", rule.name, message),
        document_name,
    )
    .with_rule_id(rule.id.clone())
    .in_namespace(detection.variant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use onq_core::{Level, Variant};
    use onq_xml::detect_variant;
    use std::fs;
    use std::path::PathBuf;

    const DOC: &str = "<ONIX>\n  <Product>\n    <TitleText>Dune</TitleText>\n    <Price><PriceAmount>0</PriceAmount></Price>\n  </Product>\n</ONIX>";

    fn write_rules(text: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        fs::write(&path, text).unwrap();
        (dir, path)
    }

    fn run(doc_text: &str, rules_text: &str) -> Vec<Finding> {
        let doc = Document::parse(doc_text).unwrap();
        let detection = detect_variant(&doc);
        let (_dir, path) = write_rules(rules_text);
        let registry = CodelistRegistry::bundled();
        evaluate_rules(&doc, "test.xml", detection, &path, &registry)
    }

    #[test]
    fn failing_assert_produces_finding_with_context() {
        let findings = run(
            DOC,
            "- id: price-positive\n  name: Price must be positive\n  when: \"//Price\"\n  assert: \"PriceAmount > 0\"\n  severity: error\n  explain: Zero prices are rejected downstream.\n",
        );
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.level, Level::Error);
        assert_eq!(f.domain, "custom-rule");
        assert_eq!(f.rule_id.as_deref(), Some("price-positive"));
        assert_eq!(f.context_path.as_deref(), Some("/ONIX/Product/Price"));
        assert_eq!(f.check_expression.as_deref(), Some("PriceAmount > 0"));
        assert_eq!(f.explanation.as_deref(), Some("Zero prices are rejected downstream."));
        assert_eq!(f.line, 4);
    }

    #[test]
    fn clean_run_emits_single_success_marker() {
        let findings = run(
            DOC,
            "- id: title-present\n  name: Title present\n  when: \"//Product\"\n  assert: \".//TitleText\"\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].level, Level::Info);
        assert_eq!(findings[0].domain, "validation-success");
    }

    #[test]
    fn unmatched_context_contributes_nothing() {
        let findings = run(
            DOC,
            "- id: series\n  name: Series check\n  when: \"//Collection\"\n  assert: \".//TitleText\"\n- id: ok\n  name: Title present\n  when: \"//Product\"\n  assert: \".//TitleText\"\n",
        );
        // Both rules pass (one vacuously), leaving only the success marker.
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].domain, "validation-success");
    }

    #[test]
    fn malformed_rule_is_isolated() {
        let findings = run(
            DOC,
            "- id: broken\n  name: Broken rule\n  when: \"//Product[\"\n  assert: \".\"\n- id: price-positive\n  name: Price must be positive\n  when: \"//Price\"\n  assert: \"PriceAmount > 0\"\n  severity: error\n",
        );
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].domain, "xpath-error");
        assert_eq!(findings[0].level, Level::Error);
        assert_eq!(findings[0].rule_id.as_deref(), Some("broken"));
        assert_eq!(findings[1].domain, "custom-rule");
    }

    #[test]
    fn missing_rule_set_is_a_single_error() {
        let doc = Document::parse(DOC).unwrap();
        let registry = CodelistRegistry::bundled();
        let findings = evaluate_rules(
            &doc,
            "test.xml",
            Detection::none(),
            Path::new("/nonexistent/rules.yml"),
            &registry,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].domain, "rules-missing");
        assert_eq!(findings[0].level, Level::Error);
    }

    #[test]
    fn codelist_extension_function() {
        let doc_text = "<ONIX><Product><ProductForm>XX</ProductForm></Product></ONIX>";
        let findings = run(
            doc_text,
            "- id: form-code\n  name: ProductForm must be a known code\n  when: \"//Product\"\n  assert: \"in-codelist('150', ProductForm)\"\n  severity: error\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id.as_deref(), Some("form-code"));

        let ok = run(
            "<ONIX><Product><ProductForm>BB</ProductForm></Product></ONIX>",
            "- id: form-code\n  name: ProductForm must be a known code\n  when: \"//Product\"\n  assert: \"in-codelist('150', ProductForm)\"\n  severity: error\n",
        );
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].domain, "validation-success");
    }

    #[test]
    fn namespaced_document_uses_onix_prefix() {
        let doc_text = r#"<ONIXMessage xmlns="http://ns.editeur.org/onix/3.0/reference"><Product><RecordReference>r</RecordReference></Product></ONIXMessage>"#;
        let findings = run(
            doc_text,
            "- id: rr\n  name: RecordReference present\n  when: \"//onix:Product\"\n  assert: \"onix:RecordReference\"\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].domain, "validation-success");
        assert_eq!(findings[0].namespace, Variant::Reference);
    }
}
