//! Declarative business-rule DSL: YAML rule sets of `when`/`assert` XPath
//! pairs evaluated against a parsed message, with codelist membership
//! available as an XPath extension function.

pub mod dsl;
pub mod engine;

pub use dsl::*;
pub use engine::*;
