//! Fixes for known-bad data in shipped assets.
//!
//! Patches are keyed by normalized asset path. Each one overwrites a single
//! vertex component, guarded by the exact value it expects to replace. The
//! patches of an asset are applied together or not at all.

use super::batch::Surface;
use crate::cache::Vertex;
use crate::format::normalize_path;

/// Vertex component targeted by a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Position(usize),
    Normal(usize),
    Uv(usize),
}

impl Component {
    fn get_mut(self, vertex: &mut Vertex) -> Option<&mut f32> {
        match self {
            Component::Position(axis) => vertex.position.get_mut(axis),
            Component::Normal(axis) => vertex.normal.get_mut(axis),
            Component::Uv(axis) => vertex.uv.get_mut(axis),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Patch {
    pub triangle: usize,
    pub corner: usize,
    pub component: Component,
    pub old: f32,
    pub new: f32,
}

const fn uv_x(triangle: usize, corner: usize, old: f32, new: f32) -> Patch {
    Patch {
        triangle,
        corner,
        component: Component::Uv(0),
        old,
        new,
    }
}

const fn uv_y(triangle: usize, corner: usize, old: f32, new: f32) -> Patch {
    Patch {
        triangle,
        corner,
        component: Component::Uv(1),
        old,
        new,
    }
}

pub const PATCHES: &[(&str, &[Patch])] = &[
    (
        "r1/resourcecollector/rl0/lod0/resourcecollector.peo",
        &[
            uv_x(177, 2, 0.49725038, 0.25),
            uv_x(179, 2, 0.49725038, 0.25),
        ],
    ),
    (
        "r1/mothership/rl0/lod0/mothership.peo",
        &[
            uv_y(415, 0, 0.9865452, 0.8771702),
            uv_y(415, 2, 0.9962938, 0.875),
            uv_y(419, 2, 1.0037062, 1.0),
        ],
    ),
];

/// Patches registered for an asset path.
pub fn patches_for(path: &str) -> Option<&'static [Patch]> {
    let path = normalize_path(path);
    PATCHES
        .iter()
        .find(|(target, _)| *target == path)
        .map(|(_, patches)| *patches)
}

/// Apply the patches registered for `path` to per-triangle surfaces.
///
/// Returns the number of components changed.
pub fn apply_patches(path: &str, triangles: &mut [Surface]) -> usize {
    match patches_for(path) {
        Some(patches) => apply(patches, triangles),
        None => 0,
    }
}

/// Apply `patches` if every guard matches; otherwise change nothing.
pub fn apply(patches: &[Patch], triangles: &mut [Surface]) -> usize {
    let guards_hold = patches
        .iter()
        .all(|patch| matches!(target(triangles, patch), Some(value) if *value == patch.old));
    if !guards_hold {
        tracing::warn!(target: "classic_importer::patch", "Failed to apply patch");
        return 0;
    }

    for patch in patches {
        if let Some(value) = target(triangles, patch) {
            *value = patch.new;
        }
    }
    tracing::debug!(
        target: "classic_importer::patch",
        "applied {} patches",
        patches.len()
    );
    patches.len()
}

fn target<'a>(triangles: &'a mut [Surface], patch: &Patch) -> Option<&'a mut f32> {
    let vertex = triangles
        .get_mut(patch.triangle)?
        .vertices
        .get_mut(patch.corner)?;
    patch.component.get_mut(vertex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::batch::TextureSlot;

    fn triangles(count: usize) -> Vec<Surface> {
        (0..count)
            .map(|_| Surface {
                node: 0,
                texture: TextureSlot::Default,
                emissive: false,
                double_sided: false,
                vertices: vec![Vertex::default(); 3],
            })
            .collect()
    }

    #[test]
    fn test_resource_collector_patch_applies() {
        let mut tris = triangles(180);
        tris[177].vertices[2].uv = [0.49725038, 0.999_999_76];
        tris[179].vertices[2].uv = [0.49725038, 0.999_999_76];

        let applied = apply_patches("R1\\ResourceCollector\\Rl0\\LOD0\\ResourceCollector.peo", &mut tris);

        assert_eq!(applied, 2);
        assert_eq!(tris[177].vertices[2].uv, [0.25, 0.999_999_76]);
        assert_eq!(tris[179].vertices[2].uv, [0.25, 0.999_999_76]);
    }

    #[test]
    fn test_failed_guard_changes_nothing() {
        let mut tris = triangles(420);
        tris[415].vertices[0].uv[1] = 0.9865452;
        tris[415].vertices[2].uv[1] = 0.9962938;
        // Already fixed, so the guard on this one fails.
        tris[419].vertices[2].uv[1] = 1.0;
        let before = tris.clone();

        let applied = apply_patches("r1/mothership/rl0/lod0/mothership.peo", &mut tris);

        assert_eq!(applied, 0);
        assert_eq!(tris, before);
    }

    #[test]
    fn test_short_model_is_not_patched() {
        let mut tris = triangles(3);
        assert_eq!(
            apply_patches("r1/resourcecollector/rl0/lod0/resourcecollector.peo", &mut tris),
            0
        );
    }

    #[test]
    fn test_unpatched_path() {
        let mut tris = triangles(1);
        assert!(patches_for("r1/scout/rl0/lod0/scout.peo").is_none());
        assert_eq!(apply_patches("r1/scout/rl0/lod0/scout.peo", &mut tris), 0);
    }

    #[test]
    fn test_position_and_normal_components() {
        let mut tris = triangles(1);
        tris[0].vertices[1].position[2] = 5.0;
        tris[0].vertices[1].normal[0] = 0.5;
        let patches = [
            Patch {
                triangle: 0,
                corner: 1,
                component: Component::Position(2),
                old: 5.0,
                new: 6.0,
            },
            Patch {
                triangle: 0,
                corner: 1,
                component: Component::Normal(0),
                old: 0.5,
                new: 1.0,
            },
        ];

        assert_eq!(apply(&patches, &mut tris), 2);
        assert_eq!(tris[0].vertices[1].position[2], 6.0);
        assert_eq!(tris[0].vertices[1].normal[0], 1.0);
    }
}
