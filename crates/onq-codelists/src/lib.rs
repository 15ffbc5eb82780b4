//! EDItEUR codelist registry: numbered code -> description tables used for
//! semantic validation. Lookups promise membership and descriptions only;
//! classification (audio/digital/...) lives in the layers that consume them.

pub mod registry;

pub use registry::*;
