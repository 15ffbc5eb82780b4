use roxmltree::Document;

use onq_core::{Detection, Variant, ONIX_REFERENCE_NS, ONIX_SHORT_NS};

use crate::xpath::NamespaceMap;

/// Root local names accepted for the namespace-less legacy/demo form.
const LEGACY_ROOT_NAMES: [&str; 2] = ["ONIXMessage", "ONIX"];

/// Classify a parsed document as one of the ONIX variants.
///
/// Checks the root element's own namespace first, then the namespaces
/// declared on the root. A namespace-less document whose root local name
/// looks like ONIX classifies as the permissive legacy form rather than
/// erroring; everything else reduces to `Variant::None`.
pub fn detect_variant(doc: &Document) -> Detection {
    let root = doc.root_element();

    match root.tag_name().namespace() {
        Some(ONIX_REFERENCE_NS) => {
            return Detection { variant: Variant::Reference, recognized: true };
        }
        Some(ONIX_SHORT_NS) => {
            return Detection { variant: Variant::ShortTag, recognized: true };
        }
        _ => {}
    }

    for ns in root.namespaces() {
        if ns.uri() == ONIX_REFERENCE_NS {
            return Detection { variant: Variant::Reference, recognized: true };
        }
        if ns.uri() == ONIX_SHORT_NS {
            return Detection { variant: Variant::ShortTag, recognized: true };
        }
    }

    // Legacy/demo roots and unrelated documents both reduce to the
    // namespace-less variant; the root-name check only drives logging upstream.
    Detection::none()
}

/// Whether a namespace-less root still looks like an ONIX message.
pub fn is_legacy_onix_root(doc: &Document) -> bool {
    let root = doc.root_element();
    root.tag_name().namespace().is_none() && LEGACY_ROOT_NAMES.contains(&root.tag_name().name())
}

/// Prefix map for namespace-aware XPath queries against the detected variant.
pub fn namespace_map_for(variant: Variant) -> NamespaceMap {
    match variant.namespace_uri() {
        Some(uri) => NamespaceMap::empty().with_binding("onix", uri),
        None => NamespaceMap::empty(),
    }
}
