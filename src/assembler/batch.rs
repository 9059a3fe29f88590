//! Surface batching.
//!
//! Triangles are grouped into runs that share a node, a texture and the two
//! material flags that change how they are drawn. Each run becomes one mesh.

use crate::cache::Vertex;

/// Texture reference of a surface before it is resolved against the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TextureSlot {
    /// Untextured material; drawn with the default white texture.
    Default,
    /// Index into the model's own decoded textures.
    Local(usize),
    /// The material names a texture that could not be decoded.
    Missing,
}

/// A run of triangles sharing one batching key.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub node: u32,
    pub texture: TextureSlot,
    pub emissive: bool,
    pub double_sided: bool,
    /// Three vertices per triangle.
    pub vertices: Vec<Vertex>,
}

/// Batching key: `(node, texture, emissive, double_sided)`.
pub type SurfaceKey = (u32, TextureSlot, bool, bool);

impl Surface {
    pub fn key(&self) -> SurfaceKey {
        (self.node, self.texture, self.emissive, self.double_sided)
    }

    pub fn can_merge(&self, other: &Surface) -> bool {
        self.key() == other.key()
    }

    fn merge(&mut self, mut other: Surface) {
        debug_assert!(self.can_merge(&other));
        self.vertices.append(&mut other.vertices);
    }

    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }
}

/// Merge per-triangle surfaces into one surface per distinct key.
///
/// The sort is stable, so triangles that share a key keep their original
/// relative order.
pub fn batch_surfaces(mut triangles: Vec<Surface>) -> Vec<Surface> {
    triangles.sort_by_key(Surface::key);

    let mut surfaces: Vec<Surface> = Vec::new();
    for t in triangles {
        match surfaces.last_mut() {
            Some(merge) if merge.can_merge(&t) => merge.merge(t),
            _ => surfaces.push(t),
        }
    }

    tracing::debug!(
        target: "classic_importer::assembler",
        "batched into {} surfaces",
        surfaces.len()
    );
    surfaces
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// A triangle whose vertices carry `id` in their position for tracking.
    fn triangle(node: u32, texture: TextureSlot, emissive: bool, id: f32) -> Surface {
        Surface {
            node,
            texture,
            emissive,
            double_sided: false,
            vertices: vec![Vertex::new([id, 0.0, 0.0], [0.0; 3], [0.0; 2]); 3],
        }
    }

    #[test]
    fn test_merges_equal_keys() {
        let triangles = vec![
            triangle(0, TextureSlot::Local(1), false, 0.0),
            triangle(0, TextureSlot::Default, false, 1.0),
            triangle(0, TextureSlot::Local(1), false, 2.0),
        ];
        let surfaces = batch_surfaces(triangles);

        assert_eq!(surfaces.len(), 2);
        assert_eq!(surfaces[0].texture, TextureSlot::Default);
        assert_eq!(surfaces[1].texture, TextureSlot::Local(1));
        assert_eq!(surfaces[1].triangle_count(), 2);
    }

    #[test]
    fn test_key_order() {
        let triangles = vec![
            triangle(1, TextureSlot::Default, false, 0.0),
            triangle(0, TextureSlot::Missing, false, 1.0),
            triangle(0, TextureSlot::Local(0), true, 2.0),
            triangle(0, TextureSlot::Local(0), false, 3.0),
        ];
        let keys: Vec<_> = batch_surfaces(triangles).iter().map(Surface::key).collect();

        assert_eq!(
            keys,
            vec![
                (0, TextureSlot::Local(0), false, false),
                (0, TextureSlot::Local(0), true, false),
                (0, TextureSlot::Missing, false, false),
                (1, TextureSlot::Default, false, false),
            ]
        );
    }

    #[test]
    fn test_double_sided_splits_batches() {
        let mut second = triangle(0, TextureSlot::Default, false, 1.0);
        second.double_sided = true;
        let surfaces = batch_surfaces(vec![triangle(0, TextureSlot::Default, false, 0.0), second]);
        assert_eq!(surfaces.len(), 2);
    }

    proptest! {
        #[test]
        fn two_interleaved_keys_make_two_ordered_batches(keys in prop::collection::vec(any::<bool>(), 1..64)) {
            let triangles: Vec<Surface> = keys
                .iter()
                .enumerate()
                .map(|(i, &k)| triangle(0, TextureSlot::Local(usize::from(k)), false, i as f32))
                .collect();
            let surfaces = batch_surfaces(triangles);

            let distinct = keys.iter().any(|&k| k) as usize + keys.iter().any(|&k| !k) as usize;
            prop_assert_eq!(surfaces.len(), distinct);

            let total: usize = surfaces.iter().map(|s| s.vertices.len()).sum();
            prop_assert_eq!(total, keys.len() * 3);

            for surface in &surfaces {
                let ids: Vec<f32> = surface.vertices.iter().step_by(3).map(|v| v.position[0]).collect();
                prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }
}
