//! Lif paletted texture container (`.lif`).
//!
//! A 48-byte header followed, at the offsets it names, by one palette index
//! per pixel and a 256-entry RGBA palette.

use binrw::binrw;
use bitflags::bitflags;
use glam::UVec2;

use crate::cache::Texture;
use crate::error::Result;
use crate::reader::Reader;

const LIF_IDENTIFIER: &[u8; 8] = b"Willy 7\0";
const LIF_VERSION: u32 = 0x104;

pub const PALETTE_SIZE: usize = 256;

bitflags! {
    /// Texture flags, shared with the `textures.ll` list.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TextureFlags: u32 {
        const PALETTED = 0x02;
        const ALPHA = 0x08;
        const TEAM_COLOR_0 = 0x10;
        const TEAM_COLOR_1 = 0x20;

        const _ = !0;
    }
}

#[binrw]
#[derive(Debug, Clone, PartialEq)]
pub struct LifHeader {
    pub identifier: [u8; 8],
    pub version: u32,
    #[br(map = |bits: u32| TextureFlags::from_bits_retain(bits))]
    #[bw(map = |flags: &TextureFlags| flags.bits())]
    pub flags: TextureFlags,
    pub width: u32,
    pub height: u32,
    pub palette_crc: u32,
    pub image_crc: u32,
    /// Offset of the palette indices.
    pub data: u32,
    /// Offset of the palette.
    pub palette: u32,
    /// Team color palettes, unused here.
    pub team_effect: [u32; 2],
}

impl LifHeader {
    pub const SIZE: u32 = 48;
}

/// Decode a Lif texture into RGBA pixels.
///
/// Only paletted images are supported. Anything else is logged and yields
/// `None`; the caller drops the texture rather than substituting a default.
pub fn decode_lif(reader: &mut Reader) -> Result<Option<Texture>> {
    if reader.is_empty() {
        tracing::error!(target: "classic_importer::lif", "texture file is missing or empty");
        return Ok(None);
    }
    let header: LifHeader = reader.get()?;

    if &header.identifier != LIF_IDENTIFIER {
        tracing::warn!(
            target: "classic_importer::lif",
            "unexpected identifier {:?}",
            String::from_utf8_lossy(&header.identifier)
        );
    }
    if header.version != LIF_VERSION {
        tracing::warn!(
            target: "classic_importer::lif",
            "unexpected version {:#x}",
            header.version
        );
    }

    if !header.flags.contains(TextureFlags::PALETTED) {
        tracing::error!(
            target: "classic_importer::lif",
            "Non paletted images not yet supported (flags {:#x})",
            header.flags.bits()
        );
        return Ok(None);
    }

    let pixel_count = (header.width as usize).checked_mul(header.height as usize);
    let pixel_count = match pixel_count {
        Some(count) if count <= reader.len() => count,
        _ => {
            tracing::error!(
                target: "classic_importer::lif",
                "{}x{} image does not fit in a {} byte file",
                header.width,
                header.height,
                reader.len()
            );
            return Ok(None);
        }
    };

    let mut indices = vec![0u8; pixel_count];
    reader.set_position(header.data as usize);
    reader.read_bytes(&mut indices);

    let mut palette = [0u8; PALETTE_SIZE * 4];
    reader.set_position(header.palette as usize);
    reader.read_bytes(&mut palette);

    let rgba = indices
        .iter()
        .map(|&i| {
            let at = usize::from(i) * 4;
            [palette[at], palette[at + 1], palette[at + 2], palette[at + 3]]
        })
        .collect();

    Ok(Some(Texture {
        size: UVec2::new(header.width, header.height),
        has_alpha: header.flags.contains(TextureFlags::ALPHA),
        rgba,
    }))
}
