//! Ear-clipping triangulation of a flattened, simple polygon.
//!
//! `lyon`'s `FillTessellator` is not used here: it re-tessellates from
//! scratch on every call and offers no guarantee that two polygons with the
//! same vertex count but different (interpolated) positions produce the
//! same index list. The mask/coverage path needs a *fixed* topology that is
//! computed once per path identity and then reused, unchanged, across every
//! interpolated keyframe sharing that vertex count — so triangulation here
//! runs once over the index *pattern*, driven by one representative
//! (typically the first keyframe's) position set, and the resulting
//! indices are stored on the `PathResource` and replayed against whichever
//! positions a later frame samples.

use crate::geom::Vec2;

/// Triangulates a simple (non-self-intersecting), hole-free polygon given
/// as a flat `[x0, y0, x1, y1, ...]` array, returning triangle indices into
/// that same vertex array. Degenerate input (fewer than 3 vertices) yields
/// an empty index list.
pub fn earcut(positions: &[f32]) -> Vec<u16> {
    let vertex_count = positions.len() / 2;
    if vertex_count < 3 {
        return Vec::new();
    }
    let points: Vec<Vec2> = (0..vertex_count)
        .map(|i| Vec2::new(positions[i * 2], positions[i * 2 + 1]))
        .collect();
    earcut_points(&points)
}

pub fn earcut_points(points: &[Vec2]) -> Vec<u16> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }
    if n > u16::MAX as usize + 1 {
        // Cannot express indices in u16; caller-side invariant, not
        // expected for animation-authored paths.
        return Vec::new();
    }

    let signed_area = polygon_signed_area(points);
    let clockwise = signed_area < 0.0;

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut indices = Vec::with_capacity((n - 2) * 3);

    let mut guard = 0usize;
    let max_iterations = n * n + 8;

    while remaining.len() > 3 && guard < max_iterations {
        guard += 1;
        let m = remaining.len();
        let mut clipped = false;
        for i in 0..m {
            let prev = remaining[(i + m - 1) % m];
            let cur = remaining[i];
            let next = remaining[(i + 1) % m];

            if is_ear(points, &remaining, prev, cur, next, clockwise) {
                indices.push(prev as u16);
                indices.push(cur as u16);
                indices.push(next as u16);
                remaining.remove(i);
                clipped = true;
                break;
            }
        }
        if !clipped {
            // No ear found (degenerate/self-intersecting input); stop
            // rather than spin — best-effort partial triangulation.
            break;
        }
    }

    if remaining.len() == 3 {
        indices.push(remaining[0] as u16);
        indices.push(remaining[1] as u16);
        indices.push(remaining[2] as u16);
    }

    indices
}

fn polygon_signed_area(points: &[Vec2]) -> f32 {
    let n = points.len();
    let mut sum = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    sum * 0.5
}

fn is_convex(a: Vec2, b: Vec2, c: Vec2, clockwise: bool) -> bool {
    let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    if clockwise {
        cross <= 0.0
    } else {
        cross >= 0.0
    }
}

fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    let d1 = sign(p, a, b);
    let d2 = sign(p, b, c);
    let d3 = sign(p, c, a);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

fn sign(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    (p.x - b.x) * (a.y - b.y) - (a.x - b.x) * (p.y - b.y)
}

fn is_ear(
    points: &[Vec2],
    remaining: &[usize],
    prev: usize,
    cur: usize,
    next: usize,
    clockwise: bool,
) -> bool {
    let (a, b, c) = (points[prev], points[cur], points[next]);
    if !is_convex(a, b, c, clockwise) {
        return false;
    }
    for &idx in remaining {
        if idx == prev || idx == cur || idx == next {
            continue;
        }
        if point_in_triangle(points[idx], a, b, c) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangulates_a_square_into_two_triangles() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        let indices = earcut_points(&square);
        assert_eq!(indices.len(), 6);
    }

    #[test]
    fn triangle_input_returns_itself() {
        let triangle = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
        ];
        let indices = earcut_points(&triangle);
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn degenerate_input_returns_empty() {
        assert!(earcut_points(&[Vec2::ZERO, Vec2::new(1.0, 0.0)]).is_empty());
    }

    #[test]
    fn triangulates_a_concave_polygon_without_crossing_outside() {
        // A chevron / arrow shape: concave at index 4.
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(4.0, 0.0),
            Vec2::new(4.0, 4.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 4.0),
        ];
        let indices = earcut_points(&points);
        assert_eq!(indices.len(), (points.len() - 2) * 3);
        for chunk in indices.chunks(3) {
            let [ia, ib, ic] = [chunk[0], chunk[1], chunk[2]];
            assert_ne!(ia, ib);
            assert_ne!(ib, ic);
        }
    }

    #[test]
    fn clockwise_winding_still_triangulates() {
        let square_cw = [
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
        ];
        let indices = earcut_points(&square_cw);
        assert_eq!(indices.len(), 6);
    }
}
