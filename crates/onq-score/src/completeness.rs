use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use onq_core::Detection;
use onq_xml::roxmltree::Document;

use crate::fields::{product_nodes, Field};

/// Per-product completeness result. `percentage` is the earned weight over
/// a possible 100, so it doubles as the score.
#[derive(Clone, Debug, Serialize)]
pub struct ProductScore {
    pub product_index: usize,
    pub percentage: f64,
    pub earned: u32,
    pub breakdown: BTreeMap<&'static str, u32>,
    pub missing: Vec<&'static str>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CompletenessReport {
    /// Mean of per-product percentages, one decimal.
    pub overall_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub products_count: usize,
    pub total_possible: u32,
    pub products: Vec<ProductScore>,
    /// Union of fields missing in any product, in taxonomy order.
    pub missing_fields: Vec<&'static str>,
    pub sales_impact: String,
    pub recommendation: String,
}

/// Score every product in the document against the fixed taxonomy.
/// A document with zero products scores 0 with every field missing.
pub fn score_completeness(doc: &Document, detection: Detection) -> CompletenessReport {
    let products = product_nodes(doc, detection.variant);
    if products.is_empty() {
        return CompletenessReport {
            overall_score: 0.0,
            min_score: 0.0,
            max_score: 0.0,
            products_count: 0,
            total_possible: 100,
            products: Vec::new(),
            missing_fields: Field::ALL.iter().map(|f| f.key()).collect(),
            sales_impact: "Unable to calculate - no products".to_string(),
            recommendation: "Add at least one Product composite to the message".to_string(),
        };
    }

    let mut scores = Vec::with_capacity(products.len());
    for (product_index, product) in products.iter().enumerate() {
        let mut breakdown = BTreeMap::new();
        let mut missing = Vec::new();
        let mut earned = 0;
        for field in Field::ALL {
            let awarded = if field.present(*product, detection.variant) { field.weight() } else { 0 };
            breakdown.insert(field.key(), awarded);
            if awarded == 0 {
                missing.push(field.key());
            }
            earned += awarded;
        }
        debug!(product_index, earned, "product scored");
        scores.push(ProductScore {
            product_index,
            percentage: round1(earned as f64),
            earned,
            breakdown,
            missing,
        });
    }

    let overall = round1(scores.iter().map(|s| s.percentage).sum::<f64>() / scores.len() as f64);
    let min = scores.iter().map(|s| s.percentage).fold(f64::INFINITY, f64::min);
    let max = scores.iter().map(|s| s.percentage).fold(0.0, f64::max);
    let missing_union: Vec<&'static str> = Field::ALL
        .iter()
        .map(|f| f.key())
        .filter(|key| scores.iter().any(|s| s.missing.contains(key)))
        .collect();

    CompletenessReport {
        overall_score: overall,
        min_score: min,
        max_score: max,
        products_count: scores.len(),
        total_possible: 100,
        sales_impact: sales_impact(overall),
        recommendation: recommendation(overall, &missing_union),
        products: scores,
        missing_fields: missing_union,
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn sales_impact(score: f64) -> String {
    if score >= 90.0 {
        "Excellent metadata completeness - estimated 70-75% sales uplift potential"
    } else if score >= 75.0 {
        "Good metadata completeness - estimated 50-70% sales uplift potential"
    } else if score >= 60.0 {
        "Fair metadata completeness - estimated 30-50% sales uplift potential"
    } else if score >= 40.0 {
        "Poor metadata completeness - estimated 15-30% sales uplift potential"
    } else {
        "Critical metadata gaps - significant sales impact risk"
    }
    .to_string()
}

fn recommendation(score: f64, missing: &[&'static str]) -> String {
    let join = |n: usize| missing.iter().take(n).copied().collect::<Vec<_>>().join(", ");
    if score >= 85.0 {
        "Excellent metadata quality. Consider adding series/imprint data for maximum discoverability.".to_string()
    } else if score >= 70.0 {
        format!("Good metadata foundation. Priority improvements: {}", join(3))
    } else if score >= 50.0 {
        format!("Moderate metadata gaps affecting discoverability. Critical missing: {}", join(5))
    } else {
        format!("Significant metadata deficiencies. Immediate action needed for: {}", join(7))
    }
}
