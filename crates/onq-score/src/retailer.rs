use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use onq_codelists::CodelistRegistry;
use onq_core::Detection;
use onq_xml::roxmltree::Document;

use crate::classify::is_digital_form;
use crate::fields::{product_nodes, Field};
use crate::profiles::{profile, RetailerProfile};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ComplianceStatus {
    #[serde(rename = "COMPLIANT")]
    Compliant,
    #[serde(rename = "PARTIAL_COMPLIANCE")]
    PartialCompliance,
    #[serde(rename = "NON_COMPLIANT")]
    NonCompliant,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldScore {
    pub present: bool,
    pub weight: u32,
    pub earned: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct RetailerReport {
    pub retailer: String,
    pub retailer_key: String,
    pub overall_score: f64,
    pub max_possible: u32,
    pub field_breakdown: BTreeMap<&'static str, FieldScore>,
    pub critical_missing: Vec<&'static str>,
    pub recommended_missing: Vec<&'static str>,
    pub discovery_score: f64,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
    pub compliance_status: ComplianceStatus,
}

#[derive(Clone, Debug, Serialize)]
pub struct RetailerComparison {
    pub retailers_analyzed: usize,
    pub average_score: f64,
    pub best_fit_retailer: String,
    pub best_fit_score: f64,
    pub worst_fit_retailer: String,
    pub worst_fit_score: f64,
    /// Fields critically missing in at least half the evaluated retailers,
    /// in taxonomy order.
    pub common_gaps: Vec<&'static str>,
    pub details: BTreeMap<String, RetailerReport>,
    pub recommendation: String,
}

/// Score the first product of a message against one retailer profile.
/// Returns `None` for an unknown profile key.
pub fn score_retailer(
    doc: &Document,
    detection: Detection,
    retailer_key: &str,
    registry: &CodelistRegistry,
) -> Option<RetailerReport> {
    let profile = profile(retailer_key)?;
    let products = product_nodes(doc, detection.variant);
    let Some(product) = products.first() else {
        return Some(RetailerReport {
            retailer: profile.name.to_string(),
            retailer_key: profile.key.to_string(),
            overall_score: 0.0,
            max_possible: 100,
            field_breakdown: BTreeMap::new(),
            critical_missing: profile.critical.to_vec(),
            recommended_missing: profile.recommended.to_vec(),
            discovery_score: 0.0,
            risk_level: RiskLevel::High,
            risk_factors: vec!["No products found in the message".to_string()],
            recommendations: vec![format!(
                "CRITICAL: Add missing required fields: {}",
                profile.critical.join(", ")
            )],
            compliance_status: ComplianceStatus::NonCompliant,
        });
    };

    let mut field_breakdown = BTreeMap::new();
    let mut critical_missing = Vec::new();
    let mut recommended_missing = Vec::new();
    let mut earned_total = 0u32;
    for (key, weight) in profile.weights {
        // Profile tables only name taxonomy fields; the unit test enforces it.
        let present = Field::from_key(key)
            .map(|f| f.present(*product, detection.variant))
            .unwrap_or(false);
        let earned = if present { *weight } else { 0 };
        earned_total += earned;
        field_breakdown.insert(*key, FieldScore { present, weight: *weight, earned });
        if !present {
            if profile.critical.contains(key) {
                critical_missing.push(*key);
            } else if profile.recommended.contains(key) {
                recommended_missing.push(*key);
            }
        }
    }

    let discovery_score = discovery_score(&field_breakdown, profile.discovery_boost);
    let (risk_level, risk_factors) = assess_risk(&critical_missing, profile);
    let form_code = Field::ProductForm.value(*product, detection.variant);
    let recommendations = recommendations(
        &critical_missing,
        &recommended_missing,
        profile,
        form_code.as_deref(),
        registry,
    );
    debug!(retailer = profile.key, score = earned_total, "retailer scored");

    Some(RetailerReport {
        retailer: profile.name.to_string(),
        retailer_key: profile.key.to_string(),
        overall_score: earned_total as f64,
        max_possible: 100,
        field_breakdown,
        compliance_status: compliance(&critical_missing),
        critical_missing,
        recommended_missing,
        discovery_score,
        risk_level,
        risk_factors,
        recommendations,
    })
}

/// Score several profiles and derive the comparative view. Unknown keys are
/// skipped; returns `None` when no key resolved.
pub fn compare_retailers(
    doc: &Document,
    detection: Detection,
    retailer_keys: &[&str],
    registry: &CodelistRegistry,
) -> Option<RetailerComparison> {
    let mut details = BTreeMap::new();
    for key in retailer_keys {
        if let Some(report) = score_retailer(doc, detection, key, registry) {
            details.insert(key.to_string(), report);
        }
    }
    if details.is_empty() {
        return None;
    }

    let analyzed = details.len();
    let average =
        round1(details.values().map(|r| r.overall_score).sum::<f64>() / analyzed as f64);
    let best = details
        .iter()
        .max_by(|a, b| a.1.overall_score.total_cmp(&b.1.overall_score))?;
    let worst = details
        .iter()
        .min_by(|a, b| a.1.overall_score.total_cmp(&b.1.overall_score))?;
    let (best_key, best_score) = (best.0.clone(), best.1.overall_score);
    let (worst_key, worst_score) = (worst.0.clone(), worst.1.overall_score);

    let common_gaps: Vec<&'static str> = Field::ALL
        .iter()
        .map(|f| f.key())
        .filter(|key| {
            let count = details.values().filter(|r| r.critical_missing.contains(key)).count();
            count * 2 >= analyzed
        })
        .collect();

    let recommendation = if common_gaps.is_empty() {
        "Good cross-retailer compatibility. Consider optimizing for your primary sales channels."
            .to_string()
    } else {
        format!(
            "Priority: Fix common gaps across retailers: {}. This will improve acceptance rates across all platforms.",
            common_gaps.iter().take(5).copied().collect::<Vec<_>>().join(", ")
        )
    };

    Some(RetailerComparison {
        retailers_analyzed: analyzed,
        average_score: average,
        best_fit_retailer: best_key,
        best_fit_score: best_score,
        worst_fit_retailer: worst_key,
        worst_fit_score: worst_score,
        common_gaps,
        details,
        recommendation,
    })
}

fn discovery_score(breakdown: &BTreeMap<&'static str, FieldScore>, boost: &[&str]) -> f64 {
    let mut earned = 0u32;
    let mut possible = 0u32;
    for key in boost {
        if let Some(fs) = breakdown.get(key) {
            earned += fs.earned;
            possible += fs.weight;
        }
    }
    if possible == 0 {
        return 0.0;
    }
    round1(earned as f64 / possible as f64 * 100.0)
}

/// A missing identifier, price or format always escalates to HIGH: those
/// fields gate the buy button regardless of how many other criticals hold.
fn assess_risk(missing: &[&'static str], profile: &RetailerProfile) -> (RiskLevel, Vec<String>) {
    let buy_button_gap = ["isbn", "price", "product_form"]
        .iter()
        .any(|key| missing.contains(key));
    if missing.is_empty() {
        return (RiskLevel::Low, vec!["All critical fields present".to_string()]);
    }
    if buy_button_gap {
        return (
            RiskLevel::High,
            vec![
                format!("Missing {} critical fields", missing.len()),
                "Buy button functionality at risk".to_string(),
            ],
        );
    }
    // <= 30% of the profile's critical set.
    if missing.len() * 10 <= profile.critical.len() * 3 {
        (
            RiskLevel::Medium,
            vec![
                format!("Missing {} critical fields", missing.len()),
                "May affect discoverability".to_string(),
            ],
        )
    } else {
        (
            RiskLevel::High,
            vec![
                format!("Missing {} critical fields", missing.len()),
                "High rejection risk".to_string(),
            ],
        )
    }
}

fn compliance(missing: &[&'static str]) -> ComplianceStatus {
    match missing.len() {
        0 => ComplianceStatus::Compliant,
        1 | 2 => ComplianceStatus::PartialCompliance,
        _ => ComplianceStatus::NonCompliant,
    }
}

fn recommendations(
    critical_missing: &[&'static str],
    recommended_missing: &[&'static str],
    profile: &RetailerProfile,
    form_code: Option<&str>,
    registry: &CodelistRegistry,
) -> Vec<String> {
    let mut out = Vec::new();
    if !critical_missing.is_empty() {
        out.push(format!(
            "CRITICAL: Add missing required fields: {}",
            critical_missing.iter().take(5).copied().collect::<Vec<_>>().join(", ")
        ));
    }
    if !recommended_missing.is_empty() {
        out.push(format!(
            "OPTIMIZE: Add recommended fields for better discovery: {}",
            recommended_missing.iter().take(3).copied().collect::<Vec<_>>().join(", ")
        ));
    }
    if profile.key == "amazon" && critical_missing.contains(&"description") {
        out.push("Amazon requires rich descriptions for search ranking".to_string());
    }
    if profile.key == "ingram" && critical_missing.contains(&"publisher") {
        out.push("IngramSpark requires publisher info for distribution".to_string());
    }
    if profile.digital_storefront {
        if let Some(code) = form_code {
            if !is_digital_form(registry, code) {
                out.push(format!(
                    "{} is a digital storefront; supply a digital product form (found '{}')",
                    profile.name, code
                ));
            }
        }
    }
    if out.is_empty() {
        out.push(format!("Excellent! Meets all {} requirements", profile.name));
    }
    out
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE: &str = r#"<ONIX><Product>
      <ProductIdentifier><ProductIDType>15</ProductIDType><IDValue>9781234567890</IDValue></ProductIdentifier>
      <TitleDetail><TitleElement><TitleText>The Word for World Is Forest</TitleText></TitleElement></TitleDetail>
      <Contributor><PersonName>Ursula K. Le Guin</PersonName></Contributor>
      <TextContent><TextType>03</TextType><Text>A novella of occupied Athshe, where the logging of an entire world forces a forest people to learn war, first published as part of an anthology.</Text></TextContent>
      <Subject><SubjectCode>FIC028000</SubjectCode></Subject>
      <ProductForm>ED</ProductForm>
      <Price><PriceAmount>9.99</PriceAmount></Price>
      <PublishingDate><Date>20240115</Date></PublishingDate>
      <Publisher><PublisherName>Tor</PublisherName></Publisher>
      <Collection><TitleDetail><TitleElement><TitleText>Hainish Cycle</TitleText></TitleElement></TitleDetail></Collection>
    </Product></ONIX>"#;

    const BARE: &str = r#"<ONIX><Product>
      <TitleDetail><TitleElement><TitleText>Untracked Manuscript</TitleText></TitleElement></TitleDetail>
    </Product></ONIX>"#;

    fn run(doc_text: &str, key: &str) -> RetailerReport {
        let doc = Document::parse(doc_text).unwrap();
        let registry = CodelistRegistry::bundled();
        score_retailer(&doc, Detection::none(), key, &registry).unwrap()
    }

    #[test]
    fn complete_product_is_compliant_and_low_risk() {
        let report = run(COMPLETE, "kobo");
        assert_eq!(report.overall_score, 100.0);
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert_eq!(report.compliance_status, ComplianceStatus::Compliant);
        assert!(report.critical_missing.is_empty());
        assert_eq!(report.discovery_score, 100.0);
        assert_eq!(report.recommendations, vec!["Excellent! Meets all Kobo requirements"]);
    }

    #[test]
    fn missing_buy_button_field_always_escalates_to_high() {
        // Title and contributors only: isbn/price/product_form all missing.
        let report = run(BARE, "amazon");
        assert_eq!(report.risk_level, RiskLevel::High);
        assert!(report.risk_factors.iter().any(|f| f.contains("Buy button")));
        assert_eq!(report.compliance_status, ComplianceStatus::NonCompliant);
        assert!(report.recommendations[0].starts_with("CRITICAL:"));
    }

    #[test]
    fn medium_risk_without_buy_button_gaps() {
        // Everything except description: one non-buy-button critical gap.
        let doc_text = COMPLETE.replace("<TextType>03</TextType>", "<TextType>02</TextType>");
        let report = run(&doc_text, "kobo");
        assert_eq!(report.critical_missing, vec!["description"]);
        assert_eq!(report.risk_level, RiskLevel::Medium);
        assert_eq!(report.compliance_status, ComplianceStatus::PartialCompliance);
    }

    #[test]
    fn digital_storefront_flags_physical_form() {
        let doc_text = COMPLETE.replace("<ProductForm>ED</ProductForm>", "<ProductForm>BB</ProductForm>");
        let report = run(&doc_text, "kobo");
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("digital storefront")));
    }

    #[test]
    fn unknown_profile_key_is_none() {
        let doc = Document::parse(COMPLETE).unwrap();
        let registry = CodelistRegistry::bundled();
        assert!(score_retailer(&doc, Detection::none(), "walmart", &registry).is_none());
    }

    #[test]
    fn zero_products_is_high_risk_with_all_critical_missing() {
        let report = run("<ONIX/>", "ingram");
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.risk_level, RiskLevel::High);
        assert_eq!(report.critical_missing.len(), 6);
    }

    #[test]
    fn comparison_is_symmetric_and_bounded() {
        let doc = Document::parse(BARE).unwrap();
        let registry = CodelistRegistry::bundled();
        let keys = crate::profiles::profile_keys();
        let cmp = compare_retailers(&doc, Detection::none(), &keys, &registry).unwrap();
        assert_eq!(cmp.retailers_analyzed, 6);
        assert!(cmp.best_fit_score >= cmp.average_score);
        assert!(cmp.average_score >= cmp.worst_fit_score);
        // isbn is critically missing everywhere, so it is a common gap.
        assert!(cmp.common_gaps.contains(&"isbn"));
        assert!(cmp.recommendation.contains("common gaps"));
        for gap in &cmp.common_gaps {
            assert!(cmp.details.values().any(|r| r.critical_missing.contains(gap)));
        }
    }

    #[test]
    fn comparison_skips_unknown_keys() {
        let doc = Document::parse(COMPLETE).unwrap();
        let registry = CodelistRegistry::bundled();
        let cmp =
            compare_retailers(&doc, Detection::none(), &["kobo", "walmart"], &registry).unwrap();
        assert_eq!(cmp.retailers_analyzed, 1);
        assert!(compare_retailers(&doc, Detection::none(), &["walmart"], &registry).is_none());
    }
}
