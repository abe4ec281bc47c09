//! Path storage: per-path keyframe data and deterministic sampling at an
//! arbitrary frame.

use crate::command::PathId;
use crate::geom::Vec2;
use ahash::AHashMap;

/// A flattened, closed-by-convention polyline with per-vertex tangents.
/// Paths produced by sampling never carry tangents (the registry only
/// stores flattened positions), so `in_tangent`/`out_tangent` are zero;
/// the fields exist so the type can also represent paths with real
/// tangent data supplied directly by a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct BezierPath {
    pub vertices: Vec<Vec2>,
    pub in_tangents: Vec<Vec2>,
    pub out_tangents: Vec<Vec2>,
    pub closed: bool,
}

impl BezierPath {
    pub fn from_positions(positions: &[Vec2], closed: bool) -> Self {
        let n = positions.len();
        Self {
            vertices: positions.to_vec(),
            in_tangents: vec![Vec2::ZERO; n],
            out_tangents: vec![Vec2::ZERO; n],
            closed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Per-segment easing between keyframe `i` and `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Easing {
    Hold,
    CubicBezier {
        out_x: f32,
        out_y: f32,
        in_x: f32,
        in_y: f32,
    },
}

impl Easing {
    /// Maps linear progress `t` in `[0, 1]` to eased progress.
    pub fn ease(&self, t: f32) -> f32 {
        match self {
            Easing::Hold => 0.0,
            Easing::CubicBezier {
                out_x,
                out_y,
                in_x,
                in_y,
            } => cubic_bezier_ease(*out_x, *out_y, *in_x, *in_y, t),
        }
    }
}

/// Solves the CSS-style cubic-bezier timing function with control points
/// `(0,0)`, `(out_x, out_y)`, `(in_x, in_y)`, `(1,1)` for the `y` value at
/// the given `x = t` via bisection on `x`.
fn cubic_bezier_ease(out_x: f32, out_y: f32, in_x: f32, in_y: f32, t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    let bezier = |p1: f32, p2: f32, u: f32| -> f32 {
        let mu = 1.0 - u;
        3.0 * mu * mu * u * p1 + 3.0 * mu * u * u * p2 + u * u * u
    };

    let mut lo = 0.0f32;
    let mut hi = 1.0f32;
    let mut u = t;
    for _ in 0..24 {
        let x = bezier(out_x, in_x, u);
        if (x - t).abs() < 1e-5 {
            break;
        }
        if x < t {
            lo = u;
        } else {
            hi = u;
        }
        u = (lo + hi) * 0.5;
    }
    bezier(out_y, in_y, u).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub positions: Vec<f32>,
}

/// A single path identity's full keyframe store.
#[derive(Debug, Clone)]
pub struct PathResource {
    pub vertex_count: usize,
    pub keyframes: Vec<Keyframe>,
    /// One entry per segment between consecutive keyframes; empty for a
    /// single-keyframe (non-animated) resource.
    pub segment_easings: Vec<Easing>,
    pub indices: Vec<u16>,
}

impl PathResource {
    pub fn is_animated(&self) -> bool {
        self.keyframes.len() > 1
    }

    pub fn static_single(vertex_count: usize, positions: Vec<f32>, indices: Vec<u16>) -> Self {
        debug_assert_eq!(positions.len(), vertex_count * 2);
        Self {
            vertex_count,
            keyframes: vec![Keyframe {
                time: 0.0,
                positions,
            }],
            segment_easings: Vec::new(),
            indices,
        }
    }

    /// Builds a full keyframe resource, triangulating the fixed index
    /// pattern from `keyframes[0]`'s positions via `crate::triangulate::earcut`.
    /// Every later keyframe must share the first one's vertex count and
    /// winding closely enough for that pattern to stay a valid (if
    /// approximate) triangulation as the shape interpolates.
    pub fn animated_earcut(
        vertex_count: usize,
        keyframes: Vec<Keyframe>,
        segment_easings: Vec<Easing>,
    ) -> Self {
        let indices = keyframes
            .first()
            .map(|kf| crate::triangulate::earcut(&kf.positions))
            .unwrap_or_default();
        Self {
            vertex_count,
            keyframes,
            segment_easings,
            indices,
        }
    }

    /// Deterministic interpolation at an arbitrary frame. Empty resources
    /// (no keyframes) return `None`.
    pub fn sample(&self, frame: f32) -> Option<BezierPath> {
        let first = self.keyframes.first()?;
        if !self.is_animated() {
            return Some(positions_to_path(&first.positions, self.vertex_count));
        }

        if frame <= first.time {
            return Some(positions_to_path(&first.positions, self.vertex_count));
        }
        let last = self.keyframes.last().unwrap();
        if frame >= last.time {
            return Some(positions_to_path(&last.positions, self.vertex_count));
        }

        let seg_index = self
            .keyframes
            .windows(2)
            .position(|w| frame >= w[0].time && frame <= w[1].time)?;
        let a = &self.keyframes[seg_index];
        let b = &self.keyframes[seg_index + 1];

        let span = b.time - a.time;
        let t = if span > 0.0 {
            (frame - a.time) / span
        } else {
            0.0
        };

        let eased_t = self
            .segment_easings
            .get(seg_index)
            .map(|e| e.ease(t))
            .unwrap_or(t);

        let mut positions = Vec::with_capacity(a.positions.len());
        for i in 0..a.positions.len() {
            positions.push(a.positions[i] + (b.positions[i] - a.positions[i]) * eased_t);
        }
        Some(positions_to_path(&positions, self.vertex_count))
    }
}

fn positions_to_path(flat: &[f32], vertex_count: usize) -> BezierPath {
    let mut vertices = Vec::with_capacity(vertex_count);
    for i in 0..vertex_count {
        vertices.push(Vec2::new(flat[i * 2], flat[i * 2 + 1]));
    }
    BezierPath {
        vertices,
        in_tangents: vec![Vec2::ZERO; vertex_count],
        out_tangents: vec![Vec2::ZERO; vertex_count],
        closed: true,
    }
}

/// Owns every path identity for one compiled generation of IR. Immutable
/// once built; `rebuild_from` replaces the table wholesale and bumps
/// `generation_id` so dependent cache entries key off a fresh value.
#[derive(Debug, Default)]
pub struct PathRegistry {
    paths: AHashMap<PathId, PathResource>,
    generation_id: u64,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation_id(&self) -> u64 {
        self.generation_id
    }

    pub fn insert(&mut self, id: PathId, resource: PathResource) {
        self.paths.insert(id, resource);
    }

    pub fn get(&self, id: PathId) -> Option<&PathResource> {
        self.paths.get(&id)
    }

    /// Swaps in a freshly compiled path table, incrementing the
    /// generation so all cache keys derived from the old generation miss.
    pub fn rebuild_from(&mut self, paths: AHashMap<PathId, PathResource>) {
        self.paths = paths;
        self.generation_id = self.generation_id.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource_with_two_keyframes(easing: Easing) -> PathResource {
        PathResource {
            vertex_count: 1,
            keyframes: vec![
                Keyframe {
                    time: 0.0,
                    positions: vec![0.0, 0.0],
                },
                Keyframe {
                    time: 10.0,
                    positions: vec![10.0, 0.0],
                },
            ],
            segment_easings: vec![easing],
            indices: vec![0],
        }
    }

    #[test]
    fn non_animated_resource_returns_keyframe_zero_for_all_frames() {
        let resource =
            PathResource::static_single(1, vec![3.0, 4.0], vec![0]);
        for frame in [-5.0, 0.0, 100.0] {
            let path = resource.sample(frame).unwrap();
            assert_eq!(path.vertices[0], Vec2::new(3.0, 4.0));
        }
    }

    #[test]
    fn linear_easing_interpolates_midpoint() {
        let resource = resource_with_two_keyframes(Easing::CubicBezier {
            out_x: 0.0,
            out_y: 0.0,
            in_x: 1.0,
            in_y: 1.0,
        });
        let path = resource.sample(5.0).unwrap();
        assert!((path.vertices[0].x - 5.0).abs() < 1e-3);
    }

    #[test]
    fn hold_easing_freezes_at_segment_start() {
        let resource = resource_with_two_keyframes(Easing::Hold);
        let path = resource.sample(7.0).unwrap();
        assert_eq!(path.vertices[0], Vec2::new(0.0, 0.0));
    }

    #[test]
    fn sampling_is_deterministic() {
        let resource = resource_with_two_keyframes(Easing::CubicBezier {
            out_x: 0.25,
            out_y: 0.1,
            in_x: 0.25,
            in_y: 1.0,
        });
        let a = resource.sample(3.0).unwrap();
        let b = resource.sample(3.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn animated_earcut_triangulates_from_the_first_keyframe() {
        let square = vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let resource = PathResource::animated_earcut(
            4,
            vec![Keyframe {
                time: 0.0,
                positions: square,
            }],
            Vec::new(),
        );
        assert_eq!(resource.indices.len(), 6);
    }

    #[test]
    fn registry_rebuild_bumps_generation() {
        let mut registry = PathRegistry::new();
        assert_eq!(registry.generation_id(), 0);
        registry.rebuild_from(AHashMap::default());
        assert_eq!(registry.generation_id(), 1);
    }
}
