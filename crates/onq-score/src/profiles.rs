/// A retailer's metadata requirements: which fields it treats as critical
/// or recommended, its own weight table (summing to 100), and the subset
/// its discovery algorithm rewards.
#[derive(Clone, Copy, Debug)]
pub struct RetailerProfile {
    pub key: &'static str,
    pub name: &'static str,
    pub critical: &'static [&'static str],
    pub recommended: &'static [&'static str],
    pub weights: &'static [(&'static str, u32)],
    pub discovery_boost: &'static [&'static str],
    /// Digital-only storefronts get format advice when the product form
    /// is not a digital one.
    pub digital_storefront: bool,
}

pub const PROFILES: [RetailerProfile; 6] = [
    RetailerProfile {
        key: "amazon",
        name: "Amazon KDP/Author Central",
        critical: &["isbn", "title", "contributors", "description", "product_form", "price"],
        recommended: &["subject_codes", "series", "cover_image", "publication_date"],
        weights: &[
            ("isbn", 25),
            ("title", 20),
            ("contributors", 15),
            ("description", 15),
            ("product_form", 10),
            ("price", 10),
            ("subject_codes", 3),
            ("series", 2),
        ],
        discovery_boost: &["subject_codes", "series", "description"],
        digital_storefront: false,
    },
    RetailerProfile {
        key: "ingram",
        name: "IngramSpark",
        critical: &["isbn", "title", "contributors", "product_form", "price", "publisher"],
        recommended: &["description", "subject_codes", "publication_date", "imprint"],
        weights: &[
            ("isbn", 20),
            ("title", 18),
            ("contributors", 15),
            ("product_form", 12),
            ("price", 12),
            ("publisher", 10),
            ("description", 6),
            ("subject_codes", 4),
            ("imprint", 3),
        ],
        discovery_boost: &["subject_codes", "publisher", "imprint"],
        digital_storefront: false,
    },
    RetailerProfile {
        key: "apple",
        name: "Apple Books",
        critical: &["isbn", "title", "contributors", "description", "product_form"],
        recommended: &["subject_codes", "series", "cover_image", "price"],
        weights: &[
            ("isbn", 22),
            ("title", 20),
            ("contributors", 18),
            ("description", 15),
            ("product_form", 12),
            ("subject_codes", 8),
            ("series", 3),
            ("cover_image", 2),
        ],
        discovery_boost: &["description", "subject_codes", "series"],
        digital_storefront: true,
    },
    RetailerProfile {
        key: "kobo",
        name: "Kobo",
        critical: &["isbn", "title", "contributors", "description", "product_form", "price"],
        recommended: &["subject_codes", "series", "publication_date"],
        weights: &[
            ("isbn", 20),
            ("title", 18),
            ("contributors", 16),
            ("description", 14),
            ("product_form", 12),
            ("price", 10),
            ("subject_codes", 6),
            ("series", 4),
        ],
        discovery_boost: &["description", "subject_codes", "series"],
        digital_storefront: true,
    },
    RetailerProfile {
        key: "barnes_noble",
        name: "Barnes & Noble Press",
        critical: &["isbn", "title", "contributors", "description", "product_form", "price"],
        recommended: &["subject_codes", "publisher", "series", "cover_image"],
        weights: &[
            ("isbn", 22),
            ("title", 18),
            ("contributors", 15),
            ("description", 15),
            ("product_form", 12),
            ("price", 8),
            ("subject_codes", 6),
            ("publisher", 4),
        ],
        discovery_boost: &["description", "subject_codes", "publisher"],
        digital_storefront: false,
    },
    RetailerProfile {
        key: "overdrive",
        name: "OverDrive",
        critical: &["isbn", "title", "contributors", "description", "product_form", "publisher"],
        recommended: &["subject_codes", "series", "publication_date", "imprint"],
        weights: &[
            ("isbn", 18),
            ("title", 16),
            ("contributors", 14),
            ("description", 12),
            ("product_form", 12),
            ("publisher", 12),
            ("subject_codes", 8),
            ("series", 8),
        ],
        discovery_boost: &["subject_codes", "series", "publisher"],
        digital_storefront: true,
    },
];

pub fn profile(key: &str) -> Option<&'static RetailerProfile> {
    PROFILES.iter().find(|p| p.key == key)
}

pub fn profile_keys() -> Vec<&'static str> {
    PROFILES.iter().map(|p| p.key).collect()
}
