//! # Classic Importer
//!
//! A Rust library for loading classic Geo models and Lif textures into a
//! renderer-agnostic model cache.
//!
//! ## Overview
//!
//! Assets are read from an [`AssetSource`]: a data root directory, one or
//! more BIG archives, or both layered together. Models are decoded into
//! per-triangle surfaces, fixed up, batched by material and appended to a
//! [`ModelCache`] that owns the shared vertex, texture and material pools.
//!
//! ## Quick Start
//!
//! ```ignore
//! use classic_importer::{ImportConfig, Importer, ModelCache, export_obj};
//!
//! // Point the importer at an unpacked data directory
//! let config = ImportConfig::new("path/to/DataHWClassic")
//!     .with_archive("path/to/HomeworldClassic.big")
//!     .with_texture_list("textures.ll");
//! let importer = Importer::from_config(config)?;
//!
//! // Load a model into the cache
//! let mut cache = ModelCache::new();
//! let scout = cache.load_classic_model(&importer, "R1/Scout/Rl0/LOD0/Scout.peo")?;
//!
//! // Export to OBJ
//! let (obj, mtl) = export_obj(&cache, scout, "scout")?;
//! ```
//!
//! ## Custom Sources
//!
//! Anything that can hand out file bytes by path can feed the importer by
//! implementing [`AssetSource`]:
//!
//! ```ignore
//! use classic_importer::{Importer, MemorySource};
//!
//! let source = MemorySource::new().with_file("r1/scout/scout.peo", bytes);
//! let importer = Importer::new(source);
//! ```

pub mod error;
pub mod config;
pub mod reader;
pub mod source;
pub mod format;
pub mod assembler;
pub mod atlas;
pub mod cache;
pub mod types;
pub mod export;

// Re-export main types for convenience
pub use error::{ImportError, Result};
pub use config::ImportConfig;
pub use reader::{ByteOrder, Reader};
pub use source::{ArchiveChain, AssetSource, BigArchive, DataRoot, LayeredSource, MemorySource};
pub use assembler::Importer;
pub use cache::{Material, Mesh, Model, ModelCache, Node, Texture, Vertex};
pub use types::BoundingBox;
pub use export::{export_obj, ObjExport};

/// Open an asset source from a file path (BIG archive or data directory).
pub fn load_source<P: AsRef<std::path::Path>>(path: P) -> Result<Box<dyn AssetSource>> {
    source::load_from_path(path)
}
