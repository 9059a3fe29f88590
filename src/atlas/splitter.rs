//! Texture sheet splitting.
//!
//! Some textures pack several unrelated images into one sheet, which bleeds
//! under filtering. The splitter finds the texel rectangles the surfaces
//! actually sample, merges the ones that overlap, crops each merged rectangle
//! into its own texture and moves the UVs into the crop.

use glam::{IVec2, UVec2, Vec2};

use crate::assembler::{Surface, TextureSlot};
use crate::cache::Texture;

/// A texel-space rectangle of one source texture, `min` inclusive, `max`
/// exclusive. Bounds may lie outside the texture; sampling wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasRegion {
    pub texture: usize,
    pub min: IVec2,
    pub max: IVec2,
}

impl AtlasRegion {
    pub fn new(texture: usize, min: IVec2, max: IVec2) -> Self {
        Self { texture, min, max }
    }

    /// Texel footprint of a set of UVs on a texture of `texture_size`.
    ///
    /// Always at least one texel wide and tall.
    pub fn from_uvs(
        texture: usize,
        uvs: impl IntoIterator<Item = [f32; 2]>,
        texture_size: UVec2,
    ) -> Option<Self> {
        let mut uvs = uvs.into_iter().map(Vec2::from);
        let first = uvs.next()?;
        let (min, max) = uvs.fold((first, first), |(min, max), uv| (min.min(uv), max.max(uv)));

        let size = texture_size.as_vec2();
        let min = (min * size).floor().as_ivec2();
        let max = (max * size).ceil().as_ivec2().max(min.saturating_add(IVec2::ONE));
        Some(Self { texture, min, max })
    }

    pub fn size(&self) -> UVec2 {
        self.max.saturating_sub(self.min).max(IVec2::ONE).as_uvec2()
    }

    fn sort_key(&self) -> (usize, i32, i32, i32, i32) {
        (self.texture, self.min.x, self.min.y, self.max.x, self.max.y)
    }

    fn overlaps_y(&self, other: &AtlasRegion) -> bool {
        self.max.y > other.min.y && self.min.y < other.max.y
    }

    fn absorb(&mut self, other: &AtlasRegion) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn is_power_of_two(&self) -> bool {
        let size = self.size();
        size.x.is_power_of_two() && size.y.is_power_of_two()
    }

    /// Whether the region is exactly the whole source texture.
    pub fn covers(&self, source: &Texture) -> bool {
        self.min == IVec2::ZERO && self.size() == source.size
    }

    /// UV of the region's origin on the source texture.
    pub fn offset(&self, texture_size: UVec2) -> Vec2 {
        self.min.as_vec2() / texture_size.as_vec2()
    }

    /// Ratio of source texture size to region size.
    pub fn scale(&self, texture_size: UVec2) -> Vec2 {
        texture_size.as_vec2() / self.size().as_vec2()
    }

    /// Move a source UV into the region's local [0, 1] space.
    pub fn remap_uv(&self, uv: [f32; 2], texture_size: UVec2) -> [f32; 2] {
        ((Vec2::from(uv) - self.offset(texture_size)) * self.scale(texture_size)).to_array()
    }

    /// Shrink the region to at most one full wrap of a `texture_size`
    /// texture, keeping `min`.
    pub fn clamp_to_wrap(&self, texture_size: UVec2) -> Self {
        let limit = texture_size.max(UVec2::ONE).min(UVec2::splat(i32::MAX as u32));
        let size = self.size().min(limit).as_ivec2();
        Self {
            max: self.min.saturating_add(size),
            ..*self
        }
    }

    /// Copy the region out of `source`, wrapping coordinates around its edges.
    ///
    /// At most one full wrap of the source is copied.
    pub fn crop(&self, source: &Texture) -> Texture {
        let size = self.clamp_to_wrap(source.size).size();
        let width = i64::from(source.size.x.max(1));
        let height = i64::from(source.size.y.max(1));

        let texels = (size.x as usize).checked_mul(size.y as usize).unwrap_or(0);
        let mut rgba = Vec::with_capacity(texels);
        for y in 0..i64::from(size.y) {
            let sy = (i64::from(self.min.y) + y).rem_euclid(height);
            for x in 0..i64::from(size.x) {
                let sx = (i64::from(self.min.x) + x).rem_euclid(width);
                let at = (sy * width + sx) as usize;
                rgba.push(source.rgba.get(at).copied().unwrap_or([0; 4]));
            }
        }

        Texture {
            size,
            has_alpha: source.has_alpha,
            rgba,
        }
    }
}

/// Merge overlapping regions of the same texture.
///
/// Returns the merged regions and, for every input region, the index of the
/// merged region that contains it. Sweeps repeat until a pass merges nothing.
pub fn merge_regions(regions: &[AtlasRegion]) -> (Vec<AtlasRegion>, Vec<usize>) {
    let mut order: Vec<usize> = (0..regions.len()).collect();
    order.sort_by_key(|&i| regions[i].sort_key());

    let mut grown = regions.to_vec();
    let mut merged_into: Vec<Option<usize>> = vec![None; regions.len()];

    loop {
        let mut changed = false;
        for (pos, &root) in order.iter().enumerate() {
            if merged_into[root].is_some() {
                continue;
            }
            for &other in &order[pos + 1..] {
                // Sorted by texture then min.x, nothing further can overlap.
                if grown[other].texture != grown[root].texture
                    || grown[root].max.x <= grown[other].min.x
                {
                    break;
                }
                if merged_into[other].is_some() || !grown[root].overlaps_y(&grown[other]) {
                    continue;
                }
                merged_into[other] = Some(root);
                let absorbed = grown[other];
                grown[root].absorb(&absorbed);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut compact = vec![0usize; regions.len()];
    let mut merged = Vec::new();
    for &i in &order {
        if merged_into[i].is_none() {
            compact[i] = merged.len();
            merged.push(grown[i]);
        }
    }

    let assignment = (0..regions.len())
        .map(|i| {
            let mut root = i;
            while let Some(parent) = merged_into[root] {
                root = parent;
            }
            compact[root]
        })
        .collect();

    (merged, assignment)
}

/// Split texture sheets into the regions the surfaces use.
///
/// `surfaces` refer to `textures` through [`TextureSlot::Local`]. On return
/// they refer to the returned textures instead, with UVs remapped. Default
/// and missing textures are left alone.
pub fn split_textures(textures: Vec<Texture>, surfaces: &mut [Surface]) -> Vec<Texture> {
    let mut regions = Vec::new();
    let mut owners = Vec::new();

    for (index, surface) in surfaces.iter_mut().enumerate() {
        let TextureSlot::Local(texture) = surface.texture else {
            continue;
        };
        let region = textures
            .get(texture)
            .filter(|t| t.size.x > 0 && t.size.y > 0)
            .and_then(|t| AtlasRegion::from_uvs(texture, surface.vertices.iter().map(|v| v.uv), t.size));
        match region {
            Some(region) => {
                regions.push(region);
                owners.push(index);
            }
            None => {
                tracing::warn!(
                    target: "classic_importer::atlas",
                    "surface {} has no usable texture {}, dropping its texture",
                    index,
                    texture
                );
                surface.texture = TextureSlot::Missing;
            }
        }
    }

    let (merged, assignment) = merge_regions(&regions);

    // Repeat sampling makes anything past one wrap redundant.
    let merged: Vec<AtlasRegion> = merged
        .into_iter()
        .map(|region| {
            let source = textures[region.texture].size;
            let size = region.size();
            if size.x > source.x || size.y > source.y {
                tracing::warn!(
                    target: "classic_importer::atlas",
                    "Region {}x{} of texture {} wraps past its {}x{} source, clamping",
                    size.x,
                    size.y,
                    region.texture,
                    source.x,
                    source.y
                );
                region.clamp_to_wrap(source)
            } else {
                region
            }
        })
        .collect();

    for region in &merged {
        if !region.is_power_of_two() {
            let size = region.size();
            tracing::warn!(
                target: "classic_importer::atlas",
                "Region is not a power of 2: {}x{} at ({}, {}) of texture {}",
                size.x,
                size.y,
                region.min.x,
                region.min.y,
                region.texture
            );
        }
    }

    for (&region_index, &owner) in assignment.iter().zip(&owners) {
        let region = &merged[region_index];
        let texture_size = textures[region.texture].size;
        let surface = &mut surfaces[owner];
        for vertex in &mut surface.vertices {
            vertex.uv = region.remap_uv(vertex.uv, texture_size);
        }
        surface.texture = TextureSlot::Local(region_index);
    }

    tracing::debug!(
        target: "classic_importer::atlas",
        "split {} textures into {} regions",
        textures.len(),
        merged.len()
    );

    merged
        .iter()
        .map(|region| {
            let source = &textures[region.texture];
            if region.covers(source) {
                source.clone()
            } else {
                region.crop(source)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Vertex;

    fn region(texture: usize, min: [i32; 2], max: [i32; 2]) -> AtlasRegion {
        AtlasRegion::new(texture, IVec2::from(min), IVec2::from(max))
    }

    /// Texture whose pixel (x, y) is `[x, y, 0, 255]`.
    fn coordinates(width: u32, height: u32) -> Texture {
        let rgba = (0..height)
            .flat_map(|y| (0..width).map(move |x| [x as u8, y as u8, 0, 255]))
            .collect();
        Texture {
            size: UVec2::new(width, height),
            has_alpha: false,
            rgba,
        }
    }

    fn surface(texture: TextureSlot, uvs: [[f32; 2]; 3]) -> Surface {
        Surface {
            node: 0,
            texture,
            emissive: false,
            double_sided: false,
            vertices: uvs.iter().map(|&uv| Vertex::new([0.0; 3], [0.0; 3], uv)).collect(),
        }
    }

    #[test]
    fn test_region_from_uvs() {
        let uvs = [[0.1, 0.2], [0.5, 0.25], [0.3, 0.6]];
        let r = AtlasRegion::from_uvs(0, uvs, UVec2::new(16, 16)).unwrap();
        assert_eq!(r.min, IVec2::new(1, 3));
        assert_eq!(r.max, IVec2::new(8, 10));
    }

    #[test]
    fn test_degenerate_uvs_keep_one_texel() {
        let r = AtlasRegion::from_uvs(0, [[0.5, 0.5]; 3], UVec2::new(8, 8)).unwrap();
        assert_eq!(r.size(), UVec2::ONE);
    }

    #[test]
    fn test_overlapping_regions_merge_to_union() {
        let regions = [region(0, [0, 0], [8, 8]), region(0, [4, 4], [12, 16])];
        let (merged, assignment) = merge_regions(&regions);

        assert_eq!(merged, vec![region(0, [0, 0], [12, 16])]);
        assert_eq!(assignment, vec![0, 0]);
    }

    #[test]
    fn test_disjoint_regions_stay_separate() {
        let regions = [region(0, [8, 0], [16, 8]), region(0, [0, 0], [8, 8])];
        let (merged, assignment) = merge_regions(&regions);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], region(0, [0, 0], [8, 8]));
        assert_eq!(assignment, vec![1, 0]);
    }

    #[test]
    fn test_other_texture_never_merges() {
        let regions = [region(0, [0, 0], [8, 8]), region(1, [0, 0], [8, 8])];
        let (merged, _) = merge_regions(&regions);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_is_transitive() {
        // The first and last only overlap once the middle one has grown the root.
        let regions = [
            region(0, [0, 0], [4, 4]),
            region(0, [2, 2], [6, 8]),
            region(0, [5, 6], [9, 10]),
        ];
        let (merged, assignment) = merge_regions(&regions);

        assert_eq!(merged, vec![region(0, [0, 0], [9, 10])]);
        assert_eq!(assignment, vec![0, 0, 0]);
    }

    #[test]
    fn test_crop_wraps_past_right_edge() {
        let source = coordinates(4, 2);
        let cropped = region(0, [3, 0], [5, 1]).crop(&source);

        assert_eq!(cropped.size, UVec2::new(2, 1));
        assert_eq!(cropped.rgba, vec![[3, 0, 0, 255], [0, 0, 0, 255]]);
    }

    #[test]
    fn test_crop_wraps_negative_coordinates() {
        let source = coordinates(4, 4);
        let cropped = region(0, [-1, -1], [0, 0]).crop(&source);
        assert_eq!(cropped.rgba, vec![[3, 3, 0, 255]]);
    }

    #[test]
    fn test_crop_far_out_of_range_uvs() {
        let source = coordinates(256, 256);
        let r = AtlasRegion::from_uvs(0, [[-200.0, -200.0], [200.0, 200.0]], source.size).unwrap();
        assert_eq!(r.size(), UVec2::new(102_400, 102_400));

        let cropped = r.crop(&source);
        assert_eq!(cropped.size, UVec2::new(256, 256));
        assert_eq!(cropped.rgba.len(), 256 * 256);
    }

    #[test]
    fn test_split_clamps_wrapping_region() {
        let mut surfaces = vec![surface(
            TextureSlot::Local(0),
            [[-200.0, -200.0], [200.0, 200.0], [0.0, 200.0]],
        )];

        let split = split_textures(vec![coordinates(4, 4)], &mut surfaces);

        assert_eq!(split.len(), 1);
        assert_eq!(split[0].size, UVec2::new(4, 4));
        // min is (-800, -800), which wraps to the source origin.
        assert_eq!(split[0].pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(surfaces[0].texture, TextureSlot::Local(0));
        assert_eq!(surfaces[0].vertices[0].uv, [0.0, 0.0]);
        assert_eq!(surfaces[0].vertices[1].uv, [400.0, 400.0]);
    }

    #[test]
    fn test_remap_uv_into_region() {
        let r = region(0, [8, 0], [16, 8]);
        let size = UVec2::new(16, 16);
        assert_eq!(r.remap_uv([0.5, 0.0], size), [0.0, 0.0]);
        assert_eq!(r.remap_uv([1.0, 0.5], size), [1.0, 1.0]);
    }

    #[test]
    fn test_power_of_two() {
        assert!(region(0, [0, 0], [8, 4]).is_power_of_two());
        assert!(!region(0, [0, 0], [6, 4]).is_power_of_two());
    }

    #[test]
    fn test_split_sheet_into_halves() {
        let textures = vec![coordinates(8, 4)];
        let mut surfaces = vec![
            surface(TextureSlot::Local(0), [[0.5, 0.0], [1.0, 0.0], [1.0, 1.0]]),
            surface(TextureSlot::Default, [[0.0, 0.0]; 3]),
            surface(TextureSlot::Local(0), [[0.0, 0.0], [0.5, 0.0], [0.5, 1.0]]),
        ];

        let split = split_textures(textures, &mut surfaces);

        assert_eq!(split.len(), 2);
        assert_eq!(split[0].size, UVec2::new(4, 4));
        assert_eq!(split[0].pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(split[1].pixel(0, 0), Some([4, 0, 0, 255]));

        assert_eq!(surfaces[0].texture, TextureSlot::Local(1));
        assert_eq!(surfaces[1].texture, TextureSlot::Default);
        assert_eq!(surfaces[2].texture, TextureSlot::Local(0));
        assert_eq!(surfaces[0].vertices[0].uv, [0.0, 0.0]);
        assert_eq!(surfaces[0].vertices[2].uv, [1.0, 1.0]);
    }

    #[test]
    fn test_full_coverage_reuses_texture() {
        let source = coordinates(4, 4);
        let mut surfaces = vec![surface(
            TextureSlot::Local(0),
            [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
        )];

        let split = split_textures(vec![source.clone()], &mut surfaces);

        assert_eq!(split, vec![source]);
        assert_eq!(surfaces[0].vertices[1].uv, [1.0, 0.0]);
    }

    #[test]
    fn test_invalid_local_texture_becomes_missing() {
        let mut surfaces = vec![surface(TextureSlot::Local(3), [[0.0, 0.0]; 3])];
        let split = split_textures(Vec::new(), &mut surfaces);
        assert!(split.is_empty());
        assert_eq!(surfaces[0].texture, TextureSlot::Missing);
    }
}
