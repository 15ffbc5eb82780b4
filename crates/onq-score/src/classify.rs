use onq_codelists::CodelistRegistry;

/// ProductForm codelist number.
const FORM_LIST: &str = "150";

const AUDIO_KEYWORDS: [&str; 2] = ["audio", "spoken word"];
const DIGITAL_KEYWORDS: [&str; 4] = ["digital", "electronic", "download", "online"];

fn description_matches(registry: &CodelistRegistry, code: &str, keywords: &[&str]) -> bool {
    match registry.describe(FORM_LIST, code.trim()) {
        Some(description) => {
            let lower = description.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        }
        None => false,
    }
}

/// Whether a ProductForm code describes an audio product. Classification is
/// keyword-based over the code's official description, so it follows the
/// codelist issue rather than a hardcoded code set.
pub fn is_audio_form(registry: &CodelistRegistry, code: &str) -> bool {
    description_matches(registry, code, &AUDIO_KEYWORDS)
}

/// Whether a ProductForm code describes a digitally delivered product.
pub fn is_digital_form(registry: &CodelistRegistry, code: &str) -> bool {
    description_matches(registry, code, &DIGITAL_KEYWORDS)
}
