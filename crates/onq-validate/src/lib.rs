//! Structural and pattern validation: artifact selection per detected
//! variant, a structural schema subset engine, and a schematron-style
//! pattern engine. Both validators share the same contract: a missing
//! artifact is a single ERROR finding, a clean run is a single INFO
//! success marker, and nothing here panics on bad input.

pub mod artifacts;
pub mod schematron;
pub mod xsd;

pub use artifacts::*;
pub use schematron::*;
pub use xsd::*;
