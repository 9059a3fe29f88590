//! Importer configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};
use crate::reader::ByteOrder;
use crate::source::{ArchiveChain, DataRoot, LayeredSource};

/// Environment variable naming the data root, read by [`ImportConfig::from_env`].
pub const DATA_ROOT_VAR: &str = "HWC_DATA";
/// Environment variable listing BIG archives separated by `;`.
pub const ARCHIVES_VAR: &str = "HW_BIG";

/// Main importer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Root that relative asset paths resolve under.
    pub data_root: PathBuf,
    /// BIG archives searched before the data root, in order.
    pub archives: Vec<PathBuf>,
    /// Byte order of the asset buffers.
    pub endian: ByteOrder,
    /// Fix known bad UVs in shipped assets.
    pub apply_patches: bool,
    /// Crop textures down to the regions the UVs actually use.
    pub split_textures: bool,
    /// Path of a `textures.ll` used to resolve shared textures.
    pub texture_list: Option<String>,
    /// Fail on a missing model instead of loading it as an empty model.
    pub strict: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            archives: Vec::new(),
            endian: ByteOrder::Little,
            apply_patches: true,
            split_textures: false,
            texture_list: None,
            strict: false,
        }
    }
}

impl ImportConfig {
    pub fn new<P: Into<PathBuf>>(data_root: P) -> Self {
        Self::default().with_data_root(data_root)
    }

    pub fn with_data_root<P: Into<PathBuf>>(mut self, data_root: P) -> Self {
        self.data_root = data_root.into();
        self
    }

    pub fn with_archive<P: Into<PathBuf>>(mut self, archive: P) -> Self {
        self.archives.push(archive.into());
        self
    }

    pub fn with_endian(mut self, endian: ByteOrder) -> Self {
        self.endian = endian;
        self
    }

    pub fn with_patches(mut self, apply: bool) -> Self {
        self.apply_patches = apply;
        self
    }

    pub fn with_split_textures(mut self, split: bool) -> Self {
        self.split_textures = split;
        self
    }

    pub fn with_texture_list(mut self, path: &str) -> Self {
        self.texture_list = Some(path.to_string());
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Configuration from `HWC_DATA` and `HW_BIG`.
    pub fn from_env() -> Result<Self> {
        let data_root = std::env::var_os(DATA_ROOT_VAR)
            .ok_or_else(|| ImportError::Config(format!("{} is not set", DATA_ROOT_VAR)))?;
        let archives = std::env::var(ARCHIVES_VAR).unwrap_or_default();
        Ok(Self::new(data_root).with_archive_list(&archives))
    }

    /// Append archives from a `;`-separated list, skipping empty items.
    pub fn with_archive_list(mut self, list: &str) -> Self {
        self.archives.extend(
            list.split(';')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(PathBuf::from),
        );
        self
    }

    /// Build the asset source: archives first, then the data root.
    pub fn open_source(&self) -> Result<LayeredSource> {
        let mut source = LayeredSource::new();
        if !self.archives.is_empty() {
            source.push(ArchiveChain::open_all(&self.archives)?);
        }
        source.push(DataRoot::new(&self.data_root));
        Ok(source)
    }
}
