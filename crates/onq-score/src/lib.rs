//! Metadata quality scoring: the fixed completeness taxonomy, retailer
//! compatibility profiles, cross-retailer comparison, and codelist-backed
//! product-form classification.

pub mod classify;
pub mod completeness;
pub mod fields;
pub mod profiles;
pub mod retailer;

pub use classify::*;
pub use completeness::*;
pub use fields::*;
pub use profiles::*;
pub use retailer::*;
