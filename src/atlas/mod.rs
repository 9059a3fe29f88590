//! Texture atlas splitting.
//!
//! Reverses texture-sheet packing: sampled regions of each sheet are merged,
//! cropped into their own textures, and UV coordinates are remapped accordingly.

mod splitter;

pub use splitter::{merge_regions, split_textures, AtlasRegion};
