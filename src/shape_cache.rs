//! Rasterized fill/stroke texture cache, keyed on quantized geometry and
//! style so bitwise-near-equal inputs share an entry.

use crate::command::{LineCap, LineJoin};
use crate::geom::{quantize, Matrix2D, Vec2};
use ahash::AHasher;
use lru::LruCache;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::rc::Rc;

pub const DEFAULT_CAPACITY: usize = 64;
pub const PATH_COORD_QUANT_STEP: f32 = 1.0 / 16.0;
pub const STROKE_WIDTH_QUANT_STEP: f32 = 1.0 / 16.0;
pub const COLOR_QUANT_STEP: f32 = 1.0 / 256.0;
pub const OPACITY_QUANT_STEP: f32 = 1.0 / 256.0;
pub const MITER_LIMIT_QUANT_STEP: f32 = 1.0 / 16.0;

/// A rasterized, premultiplied BGRA texture ready for GPU upload.
#[derive(Debug, Clone)]
pub struct CachedRaster {
    pub width: u32,
    pub height: u32,
    pub premultiplied_bgra: Vec<u8>,
}

fn hash_positions<H: Hasher>(positions: &[Vec2], state: &mut H) {
    positions.len().hash(state);
    for p in positions {
        quantize(p.x, PATH_COORD_QUANT_STEP).hash(state);
        quantize(p.y, PATH_COORD_QUANT_STEP).hash(state);
    }
}

fn hash_color_opacity<H: Hasher>(color: [u8; 4], opacity: f32, state: &mut H) {
    color.hash(state);
    quantize(opacity, OPACITY_QUANT_STEP).hash(state);
}

pub fn fill_cache_key(
    positions: &[Vec2],
    target_size: (u32, u32),
    transform: &Matrix2D,
    color: [u8; 4],
    opacity: f32,
) -> u64 {
    let mut hasher = AHasher::default();
    hash_positions(positions, &mut hasher);
    target_size.hash(&mut hasher);
    transform.quantized_hash(PATH_COORD_QUANT_STEP, &mut hasher);
    hash_color_opacity(color, opacity, &mut hasher);
    hasher.finish()
}

#[allow(clippy::too_many_arguments)]
pub fn stroke_cache_key(
    positions: &[Vec2],
    target_size: (u32, u32),
    transform: &Matrix2D,
    color: [u8; 4],
    opacity: f32,
    stroke_width: f32,
    cap: LineCap,
    join: LineJoin,
    miter_limit: f32,
) -> u64 {
    let mut hasher = AHasher::default();
    hash_positions(positions, &mut hasher);
    target_size.hash(&mut hasher);
    transform.quantized_hash(PATH_COORD_QUANT_STEP, &mut hasher);
    hash_color_opacity(color, opacity, &mut hasher);
    quantize(stroke_width, STROKE_WIDTH_QUANT_STEP).hash(&mut hasher);
    cap.hash(&mut hasher);
    join.hash(&mut hasher);
    quantize(miter_limit, MITER_LIMIT_QUANT_STEP).hash(&mut hasher);
    hasher.finish()
}

pub struct ShapeRasterCache {
    lru: LruCache<u64, Rc<CachedRaster>>,
    #[cfg(feature = "perf-metrics")]
    hits: u64,
    #[cfg(feature = "perf-metrics")]
    misses: u64,
}

impl ShapeRasterCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru: LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            ),
            #[cfg(feature = "perf-metrics")]
            hits: 0,
            #[cfg(feature = "perf-metrics")]
            misses: 0,
        }
    }

    pub fn get_or_insert(
        &mut self,
        key: u64,
        producer: impl FnOnce() -> CachedRaster,
    ) -> Rc<CachedRaster> {
        if let Some(hit) = self.lru.get(&key) {
            #[cfg(feature = "perf-metrics")]
            {
                self.hits += 1;
            }
            return hit.clone();
        }
        #[cfg(feature = "perf-metrics")]
        {
            self.misses += 1;
        }
        let raster = Rc::new(producer());
        self.lru.put(key, raster.clone());
        raster
    }

    /// Drains this frame's hit/miss counts for `FrameMetrics`, resetting
    /// them to zero.
    #[cfg(feature = "perf-metrics")]
    pub fn take_hit_counts(&mut self) -> (u64, u64) {
        (std::mem::take(&mut self.hits), std::mem::take(&mut self.misses))
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    pub fn clear(&mut self) {
        self.lru.clear();
    }
}

impl Default for ShapeRasterCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Converts an 8-bit coverage buffer plus a solid color into a
/// premultiplied BGRA buffer: `out = color.rgb * color.a * coverage`,
/// `out.a = color.a * coverage`.
pub fn coverage_to_premultiplied_bgra(coverage: &[u8], color: [u8; 4], opacity: f32) -> Vec<u8> {
    let [r, g, b, a] = color;
    let alpha_scale = (a as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    let mut out = Vec::with_capacity(coverage.len() * 4);
    for &c in coverage {
        let coverage_f = c as f32 / 255.0;
        let final_alpha = coverage_f * alpha_scale;
        let pr = (r as f32 / 255.0 * final_alpha * 255.0).round() as u8;
        let pg = (g as f32 / 255.0 * final_alpha * 255.0).round() as u8;
        let pb = (b as f32 / 255.0 * final_alpha * 255.0).round() as u8;
        let pa = (final_alpha * 255.0).round() as u8;
        out.push(pb);
        out.push(pg);
        out.push(pr);
        out.push(pa);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_produce_the_same_key() {
        let positions = [Vec2::new(1.0, 1.0), Vec2::new(2.0, 2.0), Vec2::new(1.0, 2.0)];
        let a = fill_cache_key(&positions, (32, 32), &Matrix2D::IDENTITY, [255, 0, 0, 255], 1.0);
        let b = fill_cache_key(&positions, (32, 32), &Matrix2D::IDENTITY, [255, 0, 0, 255], 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn near_equal_positions_share_a_key_after_quantization() {
        let a = [Vec2::new(1.0, 1.0), Vec2::new(2.0, 2.0), Vec2::new(1.0, 2.0)];
        let b = [
            Vec2::new(1.0 + 1e-5, 1.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(1.0, 2.0),
        ];
        let key_a = fill_cache_key(&a, (32, 32), &Matrix2D::IDENTITY, [0, 0, 0, 255], 1.0);
        let key_b = fill_cache_key(&b, (32, 32), &Matrix2D::IDENTITY, [0, 0, 0, 255], 1.0);
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn different_color_changes_the_key() {
        let positions = [Vec2::new(1.0, 1.0), Vec2::new(2.0, 2.0), Vec2::new(1.0, 2.0)];
        let a = fill_cache_key(&positions, (32, 32), &Matrix2D::IDENTITY, [255, 0, 0, 255], 1.0);
        let b = fill_cache_key(&positions, (32, 32), &Matrix2D::IDENTITY, [0, 255, 0, 255], 1.0);
        assert_ne!(a, b);
    }

    #[test]
    fn cache_producer_runs_once_per_key() {
        let mut cache = ShapeRasterCache::new(8);
        let mut calls = 0;
        cache.get_or_insert(1, || {
            calls += 1;
            CachedRaster {
                width: 1,
                height: 1,
                premultiplied_bgra: vec![0, 0, 0, 0],
            }
        });
        cache.get_or_insert(1, || {
            calls += 1;
            CachedRaster {
                width: 1,
                height: 1,
                premultiplied_bgra: vec![0, 0, 0, 0],
            }
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn opaque_coverage_premultiplies_correctly() {
        let out = coverage_to_premultiplied_bgra(&[255], [255, 0, 0, 255], 1.0);
        assert_eq!(out, vec![0, 0, 255, 255]);
    }
}
