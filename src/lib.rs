//! fylr_search
//!
//! Finds files whose content is semantically similar to a natural-language
//! query. File contents are embedded into fixed-length vectors and stored in
//! a persistent nearest-neighbor index; queries are embedded the same way and
//! answered by distance.

pub mod config;
pub mod semantic;
pub mod telemetry;
pub mod utils;
