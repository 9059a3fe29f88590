//! Texture list (`textures.ll`).
//!
//! Lists every texture of the data set with its size and flags. Identical
//! images are stored once: an entry with a `shared_from` index reuses the file
//! of the entry it points at.

use std::collections::HashMap;

use binrw::binrw;
use glam::UVec2;

use super::lif::TextureFlags;
use super::normalize_path;
use crate::error::Result;
use crate::reader::Reader;

const LIST_IDENTIFIER: &[u8; 8] = b"Event13\0";
const LIST_VERSION: i32 = 0x104;

#[binrw]
#[derive(Debug, Clone, PartialEq)]
pub struct ListHeader {
    pub identifier: [u8; 8],
    pub version: i32,
    pub element_count: u32,
    pub string_length: u32,
    pub sharing_length: u32,
    pub total_length: u32,
}

impl ListHeader {
    pub const SIZE: u32 = 28;
}

#[binrw]
#[derive(Debug, Clone, PartialEq)]
pub struct ListElement {
    /// Name offset from the start of the string block.
    pub name: u32,
    pub width: u32,
    pub height: u32,
    #[br(map = |bits: u32| TextureFlags::from_bits_retain(bits))]
    #[bw(map = |flags: &TextureFlags| flags.bits())]
    pub flags: TextureFlags,
    pub image_crc: u32,
    pub shared_count: i32,
    pub shared_to: u32,
    /// Index of the element this one shares its image with, or -1.
    pub shared_from: i32,
}

impl ListElement {
    pub const SIZE: u32 = 32;
}

/// One texture of the list.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureListEntry {
    pub name: String,
    pub size: UVec2,
    pub flags: TextureFlags,
    /// Name of the texture whose file holds this image.
    pub shared_from: Option<String>,
}

/// Decoded texture list, keyed by normalized texture path.
#[derive(Debug, Clone, Default)]
pub struct TextureList {
    entries: HashMap<String, TextureListEntry>,
}

impl TextureList {
    pub fn decode(reader: &mut Reader) -> Result<Self> {
        let header: ListHeader = reader.get()?;
        if &header.identifier != LIST_IDENTIFIER || header.version != LIST_VERSION {
            tracing::warn!(
                target: "classic_importer::lif",
                "unexpected texture list identifier {:?} version {:#x}",
                String::from_utf8_lossy(&header.identifier),
                header.version
            );
        }

        let elements: Vec<ListElement> = reader.get_vec(header.element_count as usize)?;
        let strings = reader.position() as u32;
        let names: Vec<String> = elements
            .iter()
            .map(|e| reader.read_string_at(strings.saturating_add(e.name)))
            .collect();

        let mut entries = HashMap::with_capacity(elements.len());
        for (element, name) in elements.iter().zip(&names) {
            if name.is_empty() {
                continue;
            }
            let shared_from = match usize::try_from(element.shared_from) {
                Ok(source) => match names.get(source) {
                    Some(source_name) => Some(source_name.clone()),
                    None => {
                        tracing::warn!(
                            target: "classic_importer::lif",
                            "texture {} shares from missing entry {}",
                            name,
                            source
                        );
                        None
                    }
                },
                Err(_) => None,
            };
            entries.insert(
                normalize_path(name),
                TextureListEntry {
                    name: name.clone(),
                    size: UVec2::new(element.width, element.height),
                    flags: element.flags,
                    shared_from,
                },
            );
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&TextureListEntry> {
        self.entries.get(&normalize_path(path))
    }

    /// Path of the file that stores the image for `path`, with `/` separators.
    ///
    /// Case is kept as listed so the result can be opened on case-sensitive
    /// data roots.
    pub fn resolve(&self, path: &str) -> String {
        let source = self
            .get(path)
            .and_then(|e| e.shared_from.as_deref())
            .unwrap_or(path);
        source.replace('\\', "/")
    }
}


#[cfg(test)]
mod tests {
    use super::fixture::*;
    use super::*;

    #[test]
    fn test_decode_shared_textures() {
        let bytes = texture_list(&[
            ("R1\\Mothership\\RL0\\LOD0\\hull", None),
            ("R1\\Carrier\\RL0\\LOD0\\hull", Some(0)),
        ]);
        let mut reader = Reader::borrowed(&bytes);
        let list = TextureList::decode(&mut reader).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(
            list.resolve("r1/carrier/rl0/lod0/hull"),
            "R1/Mothership/RL0/LOD0/hull"
        );
        assert_eq!(
            list.resolve("r1/mothership/rl0/lod0/hull"),
            "r1/mothership/rl0/lod0/hull"
        );
    }

    #[test]
    fn test_unknown_texture_resolves_to_itself() {
        let list = TextureList::default();
        assert!(list.is_empty());
        assert_eq!(list.resolve("R1\\Scout\\glass"), "R1/Scout/glass");
    }

    #[test]
    fn test_out_of_range_share_is_ignored() {
        let bytes = texture_list(&[("a", Some(7))]);
        let mut reader = Reader::borrowed(&bytes);
        let list = TextureList::decode(&mut reader).unwrap();
        assert_eq!(list.get("a").unwrap().shared_from, None);
    }
}
