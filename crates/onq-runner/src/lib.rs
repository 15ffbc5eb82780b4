//! Pipeline composition: parse once, detect the variant, resolve artifacts,
//! run the validation stages independently, then optionally score.

pub mod config;
pub mod pipeline;

pub use config::*;
pub use pipeline::*;
