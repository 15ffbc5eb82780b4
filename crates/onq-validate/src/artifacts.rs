use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use onq_core::Variant;

/// The resource triple one validation run operates on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactSet {
    pub schema: PathBuf,
    pub pattern_rules: PathBuf,
    pub dsl_rules: PathBuf,
    /// True when this is the permissive triple for legacy/demo documents.
    pub fallback: bool,
}

/// Resolves validation artifacts under a resource root laid out as
/// `production/` and `fallback/` triples.
///
/// Recognized variants always map to the production triple and the
/// namespace-less variant always maps to the fallback triple, so a demo
/// document never silently meets production-grade strictness (and vice
/// versa without a warning from the validators).
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactStore { root: root.into() }
    }

    pub fn select(&self, variant: Variant) -> ArtifactSet {
        match variant {
            Variant::Reference => ArtifactSet {
                schema: self.root.join("production/onix_reference.xsd"),
                pattern_rules: self.root.join("production/rules.sch"),
                dsl_rules: self.root.join("production/rules.yml"),
                fallback: false,
            },
            Variant::ShortTag => ArtifactSet {
                schema: self.root.join("production/onix_short.xsd"),
                pattern_rules: self.root.join("production/rules.sch"),
                dsl_rules: self.root.join("production/rules.yml"),
                fallback: false,
            },
            Variant::None => ArtifactSet {
                schema: self.root.join("fallback/onix.xsd"),
                pattern_rules: self.root.join("fallback/rules.sch"),
                dsl_rules: self.root.join("fallback/rules.yml"),
                fallback: true,
            },
        }
    }
}

/// SHA-256 of an artifact file, for audit trails. `None` when unreadable.
pub fn artifact_fingerprint(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Some(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn recognized_variants_map_to_production() {
        let store = ArtifactStore::new("/res");
        let set = store.select(Variant::Reference);
        assert_eq!(set.schema, PathBuf::from("/res/production/onix_reference.xsd"));
        assert!(!set.fallback);
        let set = store.select(Variant::ShortTag);
        assert_eq!(set.schema, PathBuf::from("/res/production/onix_short.xsd"));
        assert!(!set.fallback);
    }

    #[test]
    fn none_variant_maps_to_fallback() {
        let set = ArtifactStore::new("/res").select(Variant::None);
        assert_eq!(set.schema, PathBuf::from("/res/fallback/onix.xsd"));
        assert_eq!(set.dsl_rules, PathBuf::from("/res/fallback/rules.yml"));
        assert!(set.fallback);
    }

    #[test]
    fn fingerprint_is_stable_and_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xsd");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(b"schema").unwrap();
        let fp1 = artifact_fingerprint(&path).unwrap();
        let fp2 = artifact_fingerprint(&path).unwrap();
        assert_eq!(fp1, fp2);
        assert_eq!(fp1.len(), 64);
        assert!(artifact_fingerprint(Path::new("/nonexistent")).is_none());
    }
}
