//! Geometry assembly and the classic model import driver.
//!
//! [`Importer`] ties the pieces together: it decodes a Geo file, turns every
//! polygon entry into a triangle with concrete positions, normals and UVs,
//! patches known-bad assets, loads the referenced Lif textures, optionally
//! splits texture sheets, batches the triangles and appends the result to a
//! [`ModelCache`].

pub mod batch;
pub mod patch;

pub use batch::{batch_surfaces, Surface, SurfaceKey, TextureSlot};

use crate::atlas::split_textures;
use crate::cache::{ModelCache, Node, Texture, Vertex};
use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::format::geo::{MaterialFlags, PolyEntry, PolygonObject};
use crate::format::{decode_lif, GeoFile, TextureList};
use crate::reader::Reader;
use crate::source::{open_reader, AssetSource};

/// Nodes and per-triangle surfaces of one Geo file.
#[derive(Debug, Clone, Default)]
pub struct AssembledGeometry {
    pub nodes: Vec<Node>,
    /// One surface per polygon entry, in file order.
    pub triangles: Vec<Surface>,
}

/// Build nodes and triangles from a decoded Geo file.
///
/// `TextureSlot::Local` indices refer to `geo.texture_names`.
pub fn assemble(reader: &mut Reader, geo: &GeoFile) -> Result<AssembledGeometry> {
    let mut nodes = Vec::with_capacity(geo.objects.len());
    let mut triangles = Vec::new();

    for (index, object) in geo.objects.iter().enumerate() {
        let node = index as u32;
        nodes.push(Node {
            parent: object.parent(index).map(|p| p as u32),
            transform: object.local_matrix,
        });

        for polygon in GeoFile::polygons(reader, object)? {
            triangles.push(assemble_triangle(reader, geo, object, node, &polygon)?);
        }
    }

    Ok(AssembledGeometry { nodes, triangles })
}

fn assemble_triangle(
    reader: &mut Reader,
    geo: &GeoFile,
    object: &PolygonObject,
    node: u32,
    polygon: &PolyEntry,
) -> Result<Surface> {
    let material_index = usize::from(polygon.material);
    let flags = match geo.materials.get(material_index) {
        Some(material) => material.flags,
        None => {
            tracing::warn!(
                target: "classic_importer::assembler",
                "polygon uses material {} of {}, drawing it untextured",
                material_index,
                geo.materials.len()
            );
            MaterialFlags::empty()
        }
    };
    let texture = geo.texture_lookup.get(material_index).copied().flatten();

    // Flat shading uses the face normal for every corner.
    let face_normal = if flags.contains(MaterialFlags::SMOOTHING) {
        None
    } else {
        Some(GeoFile::normal(reader, object, polygon.face_normal)?)
    };

    let mut vertices = Vec::with_capacity(3);
    for (corner, &vertex_index) in polygon.vertices.iter().enumerate() {
        let entry = GeoFile::vertex(reader, object, u32::from(vertex_index))?;
        let normal = match face_normal {
            Some(normal) => normal,
            None => GeoFile::normal(reader, object, entry.normal)?,
        };

        let uv = polygon.uv[corner];
        if uv.iter().any(|c| !(0.0..=1.0).contains(c)) {
            let name = texture
                .and_then(|t| geo.texture_names.get(t))
                .map_or("<default>", String::as_str);
            tracing::warn!(
                target: "classic_importer::assembler",
                "Texture \"{}\" ({:?}) will be read out of range: uv {:?}",
                name,
                texture,
                uv
            );
        }

        vertices.push(Vertex::new(entry.position, normal, uv));
    }

    Ok(Surface {
        node,
        texture: texture.map_or(TextureSlot::Default, TextureSlot::Local),
        emissive: flags.contains(MaterialFlags::SELF_ILLUM),
        double_sided: flags.contains(MaterialFlags::DOUBLE_SIDED),
        vertices,
    })
}

/// Path of texture `name` next to the model at `model_path`, without extension.
pub fn texture_base_path(model_path: &str, name: &str) -> String {
    let model_path = model_path.replace('\\', "/");
    let name = name.replace('\\', "/");
    match model_path.rfind('/') {
        Some(slash) => format!("{}/{}", &model_path[..slash], name),
        None => name,
    }
}

/// The classic model importer.
pub struct Importer {
    source: Box<dyn AssetSource>,
    config: ImportConfig,
    texture_list: TextureList,
}

impl Importer {
    /// Create an importer with default configuration.
    pub fn new<S: AssetSource + 'static>(source: S) -> Self {
        Self::with_config(source, ImportConfig::default())
    }

    /// Create an importer with custom configuration.
    ///
    /// The configured texture list is loaded once here. A missing or broken
    /// list is logged and treated as empty.
    pub fn with_config<S: AssetSource + 'static>(source: S, config: ImportConfig) -> Self {
        let texture_list = match &config.texture_list {
            Some(path) => {
                let mut reader = open_reader(&source, path).with_byte_order(config.endian);
                TextureList::decode(&mut reader).unwrap_or_else(|e| {
                    tracing::warn!(
                        target: "classic_importer::lif",
                        "texture list {} could not be decoded: {}",
                        path,
                        e
                    );
                    TextureList::default()
                })
            }
            None => TextureList::default(),
        };

        Self {
            source: Box::new(source),
            config,
            texture_list,
        }
    }

    /// Create an importer reading from the sources named in `config`.
    pub fn from_config(config: ImportConfig) -> Result<Self> {
        let source = config.open_source()?;
        Ok(Self::with_config(source, config))
    }

    pub fn source(&self) -> &dyn AssetSource {
        self.source.as_ref()
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn texture_list(&self) -> &TextureList {
        &self.texture_list
    }

    /// Load the model at `path` into `cache` and return its model index.
    pub fn load_classic_model(&self, cache: &mut ModelCache, path: &str) -> Result<u32> {
        if self.config.strict && !self.source.contains(path) {
            return Err(ImportError::AssetNotFound(path.to_string()));
        }
        // A missing file decodes from an empty reader into an empty model.
        let mut reader = open_reader(self.source.as_ref(), path).with_byte_order(self.config.endian);

        let geo = GeoFile::decode(&mut reader)?;
        let AssembledGeometry {
            nodes,
            mut triangles,
        } = assemble(&mut reader, &geo)?;

        if reader.overruns() > 0 {
            tracing::warn!(
                target: "classic_importer::assembler",
                "{}: {} reads ran past the end of the file",
                path,
                reader.overruns()
            );
        }

        if self.config.apply_patches {
            patch::apply_patches(path, &mut triangles);
        }

        let (textures, remap) = self.load_model_textures(path, &geo.texture_names)?;
        for triangle in &mut triangles {
            if let TextureSlot::Local(name) = triangle.texture {
                triangle.texture = remap
                    .get(name)
                    .copied()
                    .flatten()
                    .map_or(TextureSlot::Missing, TextureSlot::Local);
            }
        }

        let textures = if self.config.split_textures {
            split_textures(textures, &mut triangles)
        } else {
            textures
        };

        let triangle_count = triangles.len();
        let surfaces = batch_surfaces(triangles);
        let index = cache.push_model(nodes, surfaces, textures);

        tracing::info!(
            target: "classic_importer::assembler",
            "loaded {} as model {}: {} triangles, {} meshes",
            path,
            index,
            triangle_count,
            cache.models[index as usize].meshes.len()
        );
        Ok(index)
    }

    /// Load the textures named by a model.
    ///
    /// Returns the decoded textures and, per name, its index among them;
    /// textures that could not be decoded are left out.
    fn load_model_textures(
        &self,
        model_path: &str,
        names: &[String],
    ) -> Result<(Vec<Texture>, Vec<Option<usize>>)> {
        let mut textures = Vec::new();
        let mut remap = Vec::with_capacity(names.len());

        for name in names {
            let base = self.texture_list.resolve(&texture_base_path(model_path, name));
            match self.load_texture(&format!("{}.lif", base))? {
                Some(texture) => {
                    remap.push(Some(textures.len()));
                    textures.push(texture);
                }
                None => remap.push(None),
            }
        }

        Ok((textures, remap))
    }

    /// Decode the Lif texture at `path`.
    ///
    /// A missing file decodes from an empty buffer and yields `None`.
    pub fn load_texture(&self, path: &str) -> Result<Option<Texture>> {
        let mut reader = open_reader(self.source.as_ref(), path).with_byte_order(self.config.endian);
        decode_lif(&mut reader)
    }
}
