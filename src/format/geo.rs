//! Geo mesh container (`.peo`).
//!
//! Layout, all offsets relative to the start of the file:
//! ```text
//! [68 bytes]            Header
//! [n × 112 bytes]       PolygonObject table (directly after the header)
//! per object:           VertexEntry list, normal list (VertexEntry records,
//!                       position = normal), PolyEntry list
//! [m × 32 bytes]        MaterialEntry table at the local material offset
//! strings               NUL-terminated texture names
//! ```
//!
//! Object links (`mother`, `daughter`, `sister`) are byte offsets of other
//! records in the object table. They are turned into table indices by
//! arithmetic and never followed as pointers.

use binrw::binrw;
use bitflags::bitflags;
use glam::Mat4;

use crate::error::Result;
use crate::reader::Reader;

const KNOWN_IDENTIFIERS: [&[u8; 8]; 2] = [b"RMF97ba\0", b"RMF99ba\0"];
const GEO_VERSION: u32 = 0x402;

/// File header.
#[binrw]
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub identifier: [u8; 8],
    pub version: u32,
    /// Offset to the file name.
    pub name: u32,
    /// File size, not counting this header.
    pub file_size: u32,
    pub local_size: u32,
    pub public_material_count: u32,
    pub local_material_count: u32,
    pub public_material_offset: u32,
    pub local_material_offset: u32,
    pub polygon_object_count: u32,
    pub reserved: [u8; 24],
}

impl Header {
    pub const SIZE: u32 = 68;

    pub fn material_count(&self) -> usize {
        self.public_material_count as usize + self.local_material_count as usize
    }
}

/// One node of the object hierarchy together with its geometry tables.
#[binrw]
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonObject {
    /// Offset to the animation name.
    pub name: u32,
    pub flags: u8,
    pub object_index: u8,
    pub name_crc: u16,
    pub vertex_count: i32,
    pub face_normal_count: i32,
    pub vertex_normal_count: i32,
    pub polygon_count: i32,
    pub vertex_list: u32,
    pub normal_list: u32,
    pub polygon_list: u32,
    /// Offset of the parent record, 0 for a root.
    pub mother: u32,
    pub daughter: u32,
    pub sister: u32,
    #[br(map = |m: [f32; 16]| Mat4::from_cols_array(&m))]
    #[bw(map = |m: &Mat4| m.to_cols_array())]
    pub local_matrix: Mat4,
}

impl PolygonObject {
    pub const SIZE: u32 = 112;

    /// Table index of the record at `offset`, if it lands exactly on one.
    pub fn table_index(offset: u32) -> Option<usize> {
        let relative = offset.checked_sub(Header::SIZE)?;
        (relative % Self::SIZE == 0).then_some((relative / Self::SIZE) as usize)
    }

    /// Parent node index for the object stored at `own_index`.
    ///
    /// A parent must be a record of the table that comes strictly before the
    /// child; that ordering is what keeps parent chains acyclic. Links that
    /// break it are reported and the object is treated as a root.
    pub fn parent(&self, own_index: usize) -> Option<usize> {
        if self.mother == 0 {
            return None;
        }
        match Self::table_index(self.mother) {
            Some(parent) if parent < own_index => Some(parent),
            _ => {
                tracing::warn!(
                    target: "classic_importer::geo",
                    "object {} has invalid parent offset {:#x}, treating it as a root",
                    own_index,
                    self.mother
                );
                None
            }
        }
    }

    pub fn polygon_len(&self) -> usize {
        table_count(self.polygon_count, "polygon")
    }
}

fn table_count(count: i32, what: &str) -> usize {
    usize::try_from(count).unwrap_or_else(|_| {
        tracing::warn!(target: "classic_importer::geo", "negative {} count {}", what, count);
        0
    })
}

/// A triangle.
#[binrw]
#[derive(Debug, Clone, PartialEq)]
pub struct PolyEntry {
    /// Index into the object's normal list.
    pub face_normal: u32,
    /// Indices into the object's vertex list.
    pub vertices: [u16; 3],
    /// Index into the material table.
    pub material: u16,
    pub uv: [[f32; 2]; 3],
    pub flags: u16,
    pub reserved: [u8; 2],
}

impl PolyEntry {
    pub const SIZE: u32 = 40;
}

/// A position plus the index of its smooth-shading normal.
///
/// Normal lists reuse this record; only `position` is meaningful there.
#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexEntry {
    pub position: [f32; 3],
    pub normal: u32,
}

impl VertexEntry {
    pub const SIZE: u32 = 16;
}

bitflags! {
    /// Material shading flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MaterialFlags: u16 {
        const SMOOTHING = 2;
        const DOUBLE_SIDED = 8;
        const SELF_ILLUM = 64;

        const _ = !0;
    }
}

#[binrw]
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialEntry {
    /// Offset to the material name (may be a CRC32).
    pub name: u32,
    pub ambient: [u8; 4],
    pub diffuse: [u8; 4],
    pub specular: [u8; 4],
    pub alpha: f32,
    /// Offset to the texture name, 0 when untextured.
    pub texture: u32,
    #[br(map = |bits: u16| MaterialFlags::from_bits_retain(bits))]
    #[bw(map = |flags: &MaterialFlags| flags.bits())]
    pub flags: MaterialFlags,
    pub full_ambient: u8,
    pub textures_registered: u8,
    pub texture_name_save: u32,
}

impl MaterialEntry {
    pub const SIZE: u32 = 32;

    pub fn is_smooth(&self) -> bool {
        self.flags.contains(MaterialFlags::SMOOTHING)
    }

    pub fn is_double_sided(&self) -> bool {
        self.flags.contains(MaterialFlags::DOUBLE_SIDED)
    }

    pub fn is_self_illuminated(&self) -> bool {
        self.flags.contains(MaterialFlags::SELF_ILLUM)
    }
}

/// The tables of a Geo file that are decoded up front.
///
/// Per-object polygon, vertex and normal tables stay in the buffer and are
/// decoded on demand through the same reader.
#[derive(Debug, Clone)]
pub struct GeoFile {
    pub header: Header,
    pub objects: Vec<PolygonObject>,
    pub materials: Vec<MaterialEntry>,
    /// Distinct texture names in first-seen order.
    pub texture_names: Vec<String>,
    /// Material index to `texture_names` index, `None` when untextured.
    pub texture_lookup: Vec<Option<usize>>,
}

impl GeoFile {
    pub fn decode(reader: &mut Reader) -> Result<Self> {
        let header: Header = reader.get()?;

        if !KNOWN_IDENTIFIERS.contains(&&header.identifier) {
            tracing::warn!(
                target: "classic_importer::geo",
                "unexpected identifier {:?}",
                String::from_utf8_lossy(&header.identifier)
            );
        }
        if header.version != GEO_VERSION {
            tracing::warn!(
                target: "classic_importer::geo",
                "unexpected version {:#x}",
                header.version
            );
        }

        // The object table follows the header; read it before moving the cursor.
        let objects: Vec<PolygonObject> = reader.get_vec(header.polygon_object_count as usize)?;

        if header.public_material_offset != header.local_material_offset {
            tracing::debug!(
                target: "classic_importer::geo",
                "public material table at {:#x} differs from local table at {:#x}",
                header.public_material_offset,
                header.local_material_offset
            );
        }
        let materials: Vec<MaterialEntry> =
            reader.get_vec_at(header.local_material_offset, header.material_count())?;

        let mut texture_names: Vec<String> = Vec::new();
        let mut texture_lookup = Vec::with_capacity(materials.len());
        for material in &materials {
            if material.texture == 0 {
                texture_lookup.push(None);
                continue;
            }
            let name = reader.read_string_at(material.texture);
            let index = match texture_names.iter().position(|t| *t == name) {
                Some(index) => index,
                None => {
                    texture_names.push(name);
                    texture_names.len() - 1
                }
            };
            texture_lookup.push(Some(index));
        }

        Ok(Self {
            header,
            objects,
            materials,
            texture_names,
            texture_lookup,
        })
    }

    /// Decode the triangle table of an object.
    pub fn polygons(reader: &mut Reader, object: &PolygonObject) -> Result<Vec<PolyEntry>> {
        reader.get_vec_at(object.polygon_list, object.polygon_len())
    }

    /// Decode entry `index` of an object's vertex list.
    pub fn vertex(reader: &mut Reader, object: &PolygonObject, index: u32) -> Result<VertexEntry> {
        reader.get_at(entry_offset(object.vertex_list, index))
    }

    /// Decode entry `index` of an object's normal list.
    pub fn normal(reader: &mut Reader, object: &PolygonObject, index: u32) -> Result<[f32; 3]> {
        let entry: VertexEntry = reader.get_at(entry_offset(object.normal_list, index))?;
        Ok(entry.position)
    }
}

/// Saturates instead of wrapping, so a bogus index reads past the end and is
/// reported rather than aliasing an unrelated record.
fn entry_offset(list: u32, index: u32) -> u32 {
    list.saturating_add(index.saturating_mul(VertexEntry::SIZE))
}


#[cfg(test)]
mod tests {
    use super::fixture::*;
    use super::*;
    use crate::format::test_util::encode;

    #[test]
    fn test_record_sizes_match_layout() {
        let object = ObjectSpec::new(None);
        let bytes = GeoBuilder::new().object(object).build();
        assert_eq!(bytes.len() as u32, Header::SIZE + PolygonObject::SIZE);

        let poly = triangle(0, [0, 1, 2], 0);
        assert_eq!(encode(&poly).len() as u32, PolyEntry::SIZE);

        let vertex = VertexEntry {
            position: [0.0; 3],
            normal: 0,
        };
        assert_eq!(encode(&vertex).len() as u32, VertexEntry::SIZE);
    }

    #[test]
    fn test_table_index() {
        assert_eq!(PolygonObject::table_index(68), Some(0));
        assert_eq!(PolygonObject::table_index(68 + 112 * 3), Some(3));
        assert_eq!(PolygonObject::table_index(70), None);
        assert_eq!(PolygonObject::table_index(12), None);
    }

    #[test]
    fn test_parent_must_precede_child() {
        let bytes = GeoBuilder::new()
            .object(ObjectSpec::new(None))
            .object(ObjectSpec::new(Some(0)))
            .object(ObjectSpec::new(Some(2)))
            .build();
        let mut reader = Reader::borrowed(&bytes);
        let geo = GeoFile::decode(&mut reader).unwrap();

        assert_eq!(geo.objects[0].parent(0), None);
        assert_eq!(geo.objects[1].parent(1), Some(0));
        // Self-reference would form a cycle; it is demoted to a root.
        assert_eq!(geo.objects[2].parent(2), None);
    }

    #[test]
    fn test_decode_materials_and_texture_names() {
        let bytes = GeoBuilder::new()
            .material(Some("hull"), MaterialFlags::SMOOTHING)
            .material(None, MaterialFlags::empty())
            .material(Some("engine"), MaterialFlags::SELF_ILLUM)
            .material(Some("hull"), MaterialFlags::DOUBLE_SIDED)
            .object(ObjectSpec::new(None))
            .build();
        let mut reader = Reader::borrowed(&bytes);
        let geo = GeoFile::decode(&mut reader).unwrap();

        assert_eq!(geo.materials.len(), 4);
        assert_eq!(geo.texture_names, vec!["hull", "engine"]);
        assert_eq!(geo.texture_lookup, vec![Some(0), None, Some(1), Some(0)]);
        assert!(geo.materials[0].is_smooth());
        assert!(geo.materials[2].is_self_illuminated());
        assert!(geo.materials[3].is_double_sided());
        assert_eq!(reader.overruns(), 0);
    }

    #[test]
    fn test_decode_object_tables() {
        let object = ObjectSpec::new(None)
            .vertex([1.0, 2.0, 3.0], 1)
            .vertex([4.0, 5.0, 6.0], 0)
            .normal([0.0, 0.0, 1.0])
            .normal([0.0, 1.0, 0.0])
            .triangle(0, [0, 1, 0], 0);
        let bytes = GeoBuilder::new()
            .material(None, MaterialFlags::empty())
            .object(object)
            .build();
        let mut reader = Reader::borrowed(&bytes);
        let geo = GeoFile::decode(&mut reader).unwrap();
        let object = &geo.objects[0];

        let polygons = GeoFile::polygons(&mut reader, object).unwrap();
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].vertices, [0, 1, 0]);

        let vertex = GeoFile::vertex(&mut reader, object, 1).unwrap();
        assert_eq!(vertex.position, [4.0, 5.0, 6.0]);
        assert_eq!(GeoFile::normal(&mut reader, object, 1).unwrap(), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_truncated_file_degrades_without_panicking() {
        let bytes = GeoBuilder::new()
            .material(Some("hull"), MaterialFlags::empty())
            .object(ObjectSpec::new(None).triangle(0, [0, 1, 2], 0))
            .build();
        let truncated = &bytes[..bytes.len() / 2];
        let mut reader = Reader::borrowed(truncated);

        let geo = GeoFile::decode(&mut reader).unwrap();
        assert_eq!(geo.objects.len(), 1);
        assert!(reader.overruns() > 0);
    }
}
