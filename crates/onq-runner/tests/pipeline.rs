use std::fs;
use std::path::Path;

use onq_core::{Level, Stage, Variant};
use onq_runner::{Config, Pipeline, RunOptions};

const FALLBACK_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="ONIX">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="Product" minOccurs="1" maxOccurs="unbounded"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
  <xs:element name="Product">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="RecordReference" minOccurs="1" maxOccurs="1"/>
        <xs:element name="TitleText" minOccurs="0" maxOccurs="1"/>
        <xs:element name="ProductIdentifier" minOccurs="0" maxOccurs="unbounded"/>
        <xs:element name="TitleDetail" minOccurs="0" maxOccurs="unbounded"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

const FALLBACK_SCH: &str = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:pattern>
    <sch:rule context="//Product">
      <sch:assert test="RecordReference" role="warning">Product should carry a RecordReference</sch:assert>
    </sch:rule>
  </sch:pattern>
</sch:schema>"#;

const FALLBACK_RULES: &str = r#"
- id: title-present
  name: Product must carry a title
  when: "//Product"
  assert: ".//TitleText"
  severity: error
"#;

const CLEAN_DOC: &str =
    "<ONIX><Product><RecordReference>r-1</RecordReference><TitleText>Orsinia</TitleText></Product></ONIX>";

fn resources() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let fallback = dir.path().join("fallback");
    fs::create_dir_all(&fallback).unwrap();
    fs::write(fallback.join("onix.xsd"), FALLBACK_XSD).unwrap();
    fs::write(fallback.join("rules.sch"), FALLBACK_SCH).unwrap();
    fs::write(fallback.join("rules.yml"), FALLBACK_RULES).unwrap();
    dir
}

fn pipeline(root: &Path) -> Pipeline {
    Pipeline::new(&Config::default_for(root))
}

#[test]
fn clean_document_yields_one_success_marker_per_stage() {
    let dir = resources();
    let report = pipeline(dir.path()).run_text(CLEAN_DOC, "clean.xml", &RunOptions::default());
    assert_eq!(report.variant, Variant::None);
    assert!(!report.recognized);
    assert_eq!(report.findings.len(), 3);
    for f in &report.findings {
        assert_eq!(f.level, Level::Info);
        assert_eq!(f.domain, "validation-success");
    }
    let stages: Vec<Stage> = report.findings.iter().map(|f| f.source_stage).collect();
    assert_eq!(stages, vec![Stage::Schema, Stage::Schematron, Stage::Rules]);
}

#[test]
fn reports_are_deterministic() {
    let dir = resources();
    let p = pipeline(dir.path());
    let options = RunOptions { completeness: true, retailers: Some(vec![]) };
    let a = p.run_text(CLEAN_DOC, "clean.xml", &options);
    let b = p.run_text(CLEAN_DOC, "clean.xml", &options);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn artifact_record_carries_fingerprints() {
    let dir = resources();
    let report = pipeline(dir.path()).run_text(CLEAN_DOC, "clean.xml", &RunOptions::default());
    let artifacts = report.artifacts.unwrap();
    assert!(artifacts.fallback);
    assert!(artifacts.schema.ends_with("fallback/onix.xsd"));
    assert_eq!(artifacts.schema_sha256.unwrap().len(), 64);
    assert_eq!(artifacts.dsl_rules_sha256.unwrap().len(), 64);
}

#[test]
fn recognized_variant_resolves_production_artifacts() {
    let dir = resources();
    let doc = r#"<ONIXMessage xmlns="http://ns.editeur.org/onix/3.0/reference"><Product/></ONIXMessage>"#;
    let report = pipeline(dir.path()).run_text(doc, "ref.xml", &RunOptions::default());
    assert_eq!(report.variant, Variant::Reference);
    assert!(report.recognized);
    let artifacts = report.artifacts.unwrap();
    assert!(!artifacts.fallback);
    assert!(artifacts.schema.ends_with("production/onix_reference.xsd"));
    // The production triple is absent from this fixture tree, so each
    // stage degrades to its missing-artifact error.
    let domains: Vec<&str> = report.findings.iter().map(|f| f.domain.as_str()).collect();
    assert_eq!(domains, vec!["schema-missing", "schematron-missing", "rules-missing"]);
}

#[test]
fn violations_surface_with_lines_and_stages() {
    let dir = resources();
    let doc = "<ONIX>\n  <Product>\n    <Bogus/>\n  </Product>\n</ONIX>";
    let report = pipeline(dir.path()).run_text(doc, "bad.xml", &RunOptions::default());
    let schema: Vec<_> = report
        .findings
        .iter()
        .filter(|f| f.source_stage == Stage::Schema)
        .collect();
    // The undeclared child plus the missing required RecordReference.
    assert_eq!(schema.len(), 2);
    assert_eq!(schema[0].level, Level::Error);
    assert!(schema[0].message.contains("'Bogus'"));
    assert_eq!(schema[0].line, 3);
    assert!(schema[1].message.contains("'RecordReference'"));
    assert_eq!(schema[1].line, 2);

    let schematron: Vec<_> = report
        .findings
        .iter()
        .filter(|f| f.source_stage == Stage::Schematron)
        .collect();
    assert_eq!(schematron.len(), 1);
    assert_eq!(schematron[0].level, Level::Warning);
    assert_eq!(schematron[0].line, 2);

    let rules: Vec<_> = report
        .findings
        .iter()
        .filter(|f| f.source_stage == Stage::Rules)
        .collect();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].rule_id.as_deref(), Some("title-present"));
}

#[test]
fn malformed_rule_does_not_abort_the_stage() {
    let dir = resources();
    fs::write(
        dir.path().join("fallback/rules.yml"),
        "- id: broken\n  name: Broken\n  when: \"//Product[\"\n  assert: \".\"\n- id: title-present\n  name: Product must carry a title\n  when: \"//Product\"\n  assert: \".//TitleText\"\n  severity: error\n",
    )
    .unwrap();
    let doc = "<ONIX><Product><RecordReference>r</RecordReference></Product></ONIX>";
    let report = pipeline(dir.path()).run_text(doc, "iso.xml", &RunOptions::default());
    let rules: Vec<_> = report
        .findings
        .iter()
        .filter(|f| f.source_stage == Stage::Rules)
        .collect();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0].domain, "xpath-error");
    assert_eq!(rules[1].rule_id.as_deref(), Some("title-present"));
}

#[test]
fn arbitrary_input_never_panics() {
    let dir = resources();
    let p = pipeline(dir.path());
    let options = RunOptions { completeness: true, retailers: Some(vec![]) };
    for text in ["", "not xml", "<a><b/></a>", "<ONIX>&broken;</ONIX>", "\u{0}\u{1}"] {
        let report = p.run_text(text, "junk.xml", &options);
        assert!(!report.findings.is_empty());
        for f in &report.findings {
            assert!(f.line >= 1);
        }
    }
}

#[test]
fn completeness_example_through_the_pipeline() {
    let dir = resources();
    let doc = r#"<ONIX><Product>
      <RecordReference>r-1</RecordReference>
      <TitleText>x</TitleText>
      <ProductIdentifier><ProductIDType>15</ProductIDType><IDValue>9781234567890</IDValue></ProductIdentifier>
      <TitleDetail><TitleElement><TitleText>A Wizard of Earthsea</TitleText></TitleElement></TitleDetail>
    </Product></ONIX>"#;
    let options = RunOptions { completeness: true, retailers: None };
    let report = pipeline(dir.path()).run_text(doc, "scored.xml", &options);
    let completeness = report.completeness.unwrap();
    assert_eq!(completeness.overall_score, 35.0);
    assert_eq!(completeness.missing_fields.len(), 10);
    assert!(report.retailer_comparison.is_none());
}
