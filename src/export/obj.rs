//! Wavefront OBJ export.
//!
//! OBJ is a simple, widely-supported text-based 3D format. Node transforms
//! are baked into the written positions and normals, and every mesh becomes
//! its own `usemtl` group.

use std::collections::BTreeSet;
use std::fmt::Write;

use glam::{Mat3, Vec3};

use crate::cache::ModelCache;
use crate::error::{ImportError, Result};

/// Export a cached model to OBJ format.
/// Returns (obj_content, mtl_content) as strings.
pub fn export_obj(cache: &ModelCache, model: u32, name: &str) -> Result<(String, String)> {
    let model = cache
        .model(model)
        .ok_or_else(|| ImportError::Export(format!("no model with index {}", model)))?;

    let total_verts = model.vertex_count();
    let total_tris = total_verts / 3;

    // Pre-size buffers: ~60 bytes per vertex line (v/vt/vn) × 3 + ~40 per face
    let mut obj = String::with_capacity(256 + total_verts * 180 + total_tris * 40);
    let mut mtl = String::with_capacity(512);

    writeln!(obj, "# Classic Importer OBJ Export")?;
    writeln!(obj, "# Vertices: {}", total_verts)?;
    writeln!(obj, "# Triangles: {}", total_tris)?;
    writeln!(obj)?;
    writeln!(obj, "mtllib {}.mtl", name)?;
    writeln!(obj)?;
    writeln!(obj, "o {}", name)?;
    writeln!(obj)?;

    // OBJ has global pools; write every mesh's vertices in mesh order.
    for mesh in &model.meshes {
        let transform = model.world_transform(mesh.node);
        for vertex in cache.mesh_vertices(mesh) {
            let p = transform.transform_point3(Vec3::from(vertex.position));
            writeln!(obj, "v {} {} {}", p.x, p.y, p.z)?;
        }
    }
    writeln!(obj)?;

    for mesh in &model.meshes {
        for vertex in cache.mesh_vertices(mesh) {
            writeln!(obj, "vt {} {}", vertex.uv[0], vertex.uv[1])?;
        }
    }
    writeln!(obj)?;

    for mesh in &model.meshes {
        let normal_matrix = normal_matrix(Mat3::from_mat4(model.world_transform(mesh.node)));
        for vertex in cache.mesh_vertices(mesh) {
            let n = (normal_matrix * Vec3::from(vertex.normal)).normalize_or_zero();
            writeln!(obj, "vn {} {} {}", n.x, n.y, n.z)?;
        }
    }
    writeln!(obj)?;

    let mut index = 1usize;
    for (i, mesh) in model.meshes.iter().enumerate() {
        writeln!(obj, "g mesh_{}", i)?;
        writeln!(obj, "usemtl {}", material_name(name, mesh.material))?;
        for _ in 0..mesh.vertex_count / 3 {
            let (i0, i1, i2) = (index, index + 1, index + 2);
            writeln!(
                obj,
                "f {}/{}/{} {}/{}/{} {}/{}/{}",
                i0, i0, i0, i1, i1, i1, i2, i2, i2
            )?;
            index += 3;
        }
        // Trailing vertices that do not form a triangle are skipped.
        index += (mesh.vertex_count % 3) as usize;
    }

    writeln!(mtl, "# Classic Importer Material")?;
    let materials: BTreeSet<u32> = model.meshes.iter().map(|m| m.material).collect();
    for material in materials {
        writeln!(mtl)?;
        writeln!(mtl, "newmtl {}", material_name(name, material))?;
        writeln!(mtl, "Ka 1.0 1.0 1.0")?;
        writeln!(mtl, "Kd 1.0 1.0 1.0")?;
        writeln!(mtl, "Ks 0.0 0.0 0.0")?;
        writeln!(mtl, "Ns 10.0")?;
        writeln!(mtl, "d 1.0")?;
        writeln!(mtl, "illum 1")?;
        if let Some(texture) = cache.materials.get(material as usize).and_then(|m| m.texture) {
            writeln!(mtl, "map_Kd {}", texture_filename(name, texture))?;
        }
    }

    Ok((obj, mtl))
}

fn material_name(name: &str, material: u32) -> String {
    format!("{}_material_{}", name, material)
}

/// File name an exported texture is written under.
pub fn texture_filename(name: &str, texture: u32) -> String {
    format!("{}_texture_{}.png", name, texture)
}

/// Inverse transpose, falling back to the matrix itself when it is singular.
fn normal_matrix(m: Mat3) -> Mat3 {
    if m.determinant().abs() > f32::EPSILON {
        m.inverse().transpose()
    } else {
        m
    }
}

/// A named texture file for OBJ export.
pub struct ObjTexture {
    /// Filename for this texture (e.g., "scout_texture_1.png").
    pub filename: String,
    /// PNG-encoded texture data.
    pub png_data: Vec<u8>,
}

/// Export a model to OBJ format bytes for writing to files.
pub struct ObjExport {
    pub obj: String,
    pub mtl: String,
    /// Every texture the MTL file references.
    pub textures: Vec<ObjTexture>,
}

impl ObjExport {
    pub fn from_cache(cache: &ModelCache, model: u32, name: &str) -> Result<Self> {
        let (obj, mtl) = export_obj(cache, model, name)?;

        let referenced: BTreeSet<u32> = cache
            .model(model)
            .into_iter()
            .flat_map(|m| &m.meshes)
            .filter_map(|mesh| cache.materials.get(mesh.material as usize)?.texture)
            .collect();

        let textures = referenced
            .into_iter()
            .filter_map(|t| cache.textures.get(t as usize).map(|texture| (t, texture)))
            .map(|(t, texture)| {
                Ok(ObjTexture {
                    filename: texture_filename(name, t),
                    png_data: texture.to_png()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { obj, mtl, textures })
    }
}
