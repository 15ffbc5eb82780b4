pub mod finding;
pub mod variant;

pub use finding::*;
pub use variant::*;
