use serde::{Deserialize, Serialize};

/// Official ONIX 3.x namespace URIs.
pub const ONIX_REFERENCE_NS: &str = "http://ns.editeur.org/onix/3.0/reference";
pub const ONIX_SHORT_NS: &str = "http://ns.editeur.org/onix/3.0/short";

/// Recognized ONIX namespace variants. Anything that is not one of the two
/// official namespaces reduces to `None` — unrecognized input never errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    #[serde(rename = "reference-namespace")]
    Reference,
    #[serde(rename = "short-tag-namespace")]
    ShortTag,
    #[serde(rename = "none")]
    None,
}

impl Variant {
    pub fn namespace_uri(self) -> Option<&'static str> {
        match self {
            Variant::Reference => Some(ONIX_REFERENCE_NS),
            Variant::ShortTag => Some(ONIX_SHORT_NS),
            Variant::None => None,
        }
    }

    /// True for the two official namespace forms.
    pub fn is_recognized_standard(self) -> bool {
        !matches!(self, Variant::None)
    }
}

/// Result of variant detection on a parsed document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub variant: Variant,
    pub recognized: bool,
}

impl Detection {
    pub fn none() -> Self {
        Detection { variant: Variant::None, recognized: false }
    }
}
