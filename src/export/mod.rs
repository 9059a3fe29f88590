//! Model export formats.
//!
//! Cached models are written as Wavefront OBJ with an MTL material library;
//! textures are encoded as PNG through [`Texture::to_png`](crate::cache::Texture::to_png).

pub mod obj;

pub use obj::{export_obj, texture_filename, ObjExport, ObjTexture};
