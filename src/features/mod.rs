//! Features module - fixed-width numeric view of traffic events.
//!
//! `layout.rs` is the single source of truth for feature order and
//! versioning; `extract.rs` is the only producer of vectors.

pub mod extract;
pub mod layout;
pub mod vector;

pub use extract::FeatureExtractor;
pub use layout::{layout_hash, LayoutInfo, FEATURE_COUNT, FEATURE_VERSION};
pub use vector::FeatureVector;
