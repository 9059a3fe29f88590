//! Classic binary container formats.
//!
//! Each layout is declared once as a `binrw` struct; decoding walks the fields
//! in declaration order through a [`Reader`](crate::reader::Reader). The same
//! declarations write synthetic files in tests.

pub mod geo;
pub mod lif;
pub mod texture_list;

pub use geo::GeoFile;
pub use lif::{decode_lif, TextureFlags};
pub use texture_list::TextureList;

/// Lowercase a path and use `/` separators, for case-insensitive lookups.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").to_ascii_lowercase()
}
