//! Model cache: the consolidated output of ingestion.
//!
//! [`ModelCache`] owns one shared vertex array, one texture list, one
//! deduplicated material list and every loaded [`Model`]. A model is a flat
//! node array plus meshes; each mesh is a contiguous range of the shared
//! vertex array and becomes one draw call in the renderer.

use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec2, Vec3};
use image::ImageEncoder;

use crate::assembler::{Importer, Surface, TextureSlot};
use crate::error::{ImportError, Result};
use crate::types::BoundingBox;

/// Index of the reserved 1×1 opaque white texture.
pub const DEFAULT_TEXTURE: u32 = 0;

/// A vertex of the shared vertex array.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Decoded RGBA texture.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub size: UVec2,
    pub has_alpha: bool,
    /// Row-major pixels, `size.x * size.y` entries.
    pub rgba: Vec<[u8; 4]>,
}

impl Texture {
    /// The 1×1 opaque white texture used for untextured materials.
    pub fn white() -> Self {
        Self {
            size: UVec2::ONE,
            has_alpha: false,
            rgba: vec![[255, 255, 255, 255]],
        }
    }

    pub fn width(&self) -> u32 {
        self.size.x
    }

    pub fn height(&self) -> u32 {
        self.size.y
    }

    /// Get a pixel at (x, y), `None` outside the texture.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.x || y >= self.size.y {
            return None;
        }
        let at = y as usize * self.size.x as usize + x as usize;
        self.rgba.get(at).copied()
    }

    /// Encode the texture as PNG bytes.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let cursor = std::io::Cursor::new(&mut bytes);
        let encoder = image::codecs::png::PngEncoder::new(cursor);

        let pixels: Vec<u8> = self.rgba.iter().flatten().copied().collect();
        encoder
            .write_image(
                &pixels,
                self.size.x,
                self.size.y,
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| ImportError::Export(format!("Failed to encode PNG: {}", e)))?;

        Ok(bytes)
    }
}

/// A material, deduplicated by value across the whole cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Material {
    /// Cache texture index; `None` when the texture could not be decoded.
    pub texture: Option<u32>,
}

/// A node of a model hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Parent node index within the same model, `None` for roots.
    pub parent: Option<u32>,
    pub transform: Mat4,
}

/// One draw batch: a vertex range drawn with one material under one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mesh {
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub material: u32,
    pub node: u32,
}

impl Mesh {
    /// Range of this mesh in the shared vertex array.
    pub fn vertex_range(&self) -> std::ops::Range<usize> {
        let first = self.first_vertex as usize;
        first..first + self.vertex_count as usize
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub nodes: Vec<Node>,
    pub meshes: Vec<Mesh>,
}

impl Model {
    /// Compose a node's transform with all of its ancestors (`parent * local`).
    ///
    /// Parent chains always terminate since a parent precedes its child; the
    /// walk is still capped at the node count.
    pub fn world_transform(&self, node: u32) -> Mat4 {
        let mut transform = Mat4::IDENTITY;
        let mut current = Some(node);
        for _ in 0..self.nodes.len() {
            let Some(index) = current else { break };
            let Some(n) = self.nodes.get(index as usize) else { break };
            transform = n.transform * transform;
            current = n.parent;
        }
        transform
    }

    /// Depth of a node in the hierarchy (roots are 0).
    pub fn depth(&self, node: u32) -> usize {
        let mut depth = 0;
        let mut current = self.nodes.get(node as usize).and_then(|n| n.parent);
        while let Some(parent) = current {
            if depth >= self.nodes.len() {
                break;
            }
            depth += 1;
            current = self.nodes.get(parent as usize).and_then(|n| n.parent);
        }
        depth
    }

    /// Number of vertices drawn by this model.
    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|m| m.vertex_count as usize).sum()
    }

    /// Bounds of the model with node transforms applied.
    pub fn bounds(&self, vertices: &[Vertex]) -> Option<BoundingBox> {
        let points = self.meshes.iter().flat_map(|mesh| {
            let transform = self.world_transform(mesh.node);
            vertices[mesh.vertex_range()]
                .iter()
                .map(move |v| transform.transform_point3(Vec3::from(v.position)).to_array())
        });
        BoundingBox::from_points(points)
    }
}

/// Store of everything ingested so far.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCache {
    pub vertices: Vec<Vertex>,
    /// Index 0 is always the default white texture.
    pub textures: Vec<Texture>,
    pub materials: Vec<Material>,
    pub models: Vec<Model>,
}

impl Default for ModelCache {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            textures: vec![Texture::white()],
            materials: Vec::new(),
            models: Vec::new(),
        }
    }
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a classic model and return its model index.
    pub fn load_classic_model(&mut self, importer: &Importer, path: &str) -> Result<u32> {
        importer.load_classic_model(self, path)
    }

    pub fn model(&self, index: u32) -> Option<&Model> {
        self.models.get(index as usize)
    }

    /// Vertices of one mesh.
    pub fn mesh_vertices(&self, mesh: &Mesh) -> &[Vertex] {
        &self.vertices[mesh.vertex_range()]
    }

    /// Texture used by a material, falling back to the default texture.
    pub fn material_texture(&self, material: u32) -> &Texture {
        self.materials
            .get(material as usize)
            .and_then(|m| m.texture)
            .and_then(|t| self.textures.get(t as usize))
            .unwrap_or(&self.textures[DEFAULT_TEXTURE as usize])
    }

    /// Raw bytes of the vertex array. Zero-allocation view.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index of a material equal to `material`, appending it if there is none.
    pub fn intern_material(&mut self, material: Material) -> u32 {
        match self.materials.iter().position(|m| *m == material) {
            Some(index) => index as u32,
            None => {
                self.materials.push(material);
                (self.materials.len() - 1) as u32
            }
        }
    }

    /// Append an assembled model.
    ///
    /// `textures` are the model's own textures; `TextureSlot::Local(i)` in a
    /// surface refers to `textures[i]`. Each surface becomes one mesh.
    pub fn push_model(
        &mut self,
        nodes: Vec<Node>,
        surfaces: Vec<Surface>,
        textures: Vec<Texture>,
    ) -> u32 {
        let texture_base = self.textures.len() as u32;
        let local_count = textures.len();

        let mut meshes = Vec::with_capacity(surfaces.len());
        for surface in surfaces {
            let texture = match surface.texture {
                TextureSlot::Default => Some(DEFAULT_TEXTURE),
                TextureSlot::Local(i) if i < local_count => Some(texture_base + i as u32),
                TextureSlot::Local(_) | TextureSlot::Missing => None,
            };
            let material = self.intern_material(Material { texture });

            meshes.push(Mesh {
                first_vertex: self.vertices.len() as u32,
                vertex_count: surface.vertices.len() as u32,
                material,
                node: surface.node,
            });
            self.vertices.extend(surface.vertices);
        }

        self.textures.extend(textures);
        self.models.push(Model { nodes, meshes });
        (self.models.len() - 1) as u32
    }
}

const _: () = assert!(mem::size_of::<Vertex>() == 32);
