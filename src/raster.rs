//! CPU rasterization of a flattened path into an 8-bit alpha coverage
//! buffer, feeding the shape/stroke raster cache (`crate::shape_cache`).
//!
//! Fills rasterize the path polygon directly under the non-zero winding
//! rule. Strokes are first converted to a fill outline with
//! `lyon_tessellation::StrokeTessellator` (the host's 2D path routines,
//! here `lyon`) and the resulting triangles are rasterized the same way.

use crate::command::{LineCap, LineJoin};
use crate::geom::Vec2;
use lyon::math::point;
use lyon::path::Path as LyonPath;
use lyon::tessellation::{
    BuffersBuilder, FillOptions, FillTessellator, FillVertex, LineCap as LyonLineCap,
    LineJoin as LyonLineJoin, StrokeOptions, StrokeTessellator, StrokeVertex, VertexBuffers,
};

const SUPERSAMPLE: u32 = 4;

/// Rasterizes the closed polygon `positions` (already in target pixel
/// space) into a `width * height` single-channel coverage buffer, values
/// in `0..=255`, antialiased by `SUPERSAMPLE`x`SUPERSAMPLE` per-pixel
/// sampling against the non-zero winding rule.
pub fn rasterize_fill_coverage(positions: &[Vec2], width: u32, height: u32) -> Vec<u8> {
    let mut buffer = vec![0u8; (width * height) as usize];
    if positions.len() < 3 {
        return buffer;
    }

    for y in 0..height {
        for x in 0..width {
            let mut hits = 0u32;
            for sy in 0..SUPERSAMPLE {
                for sx in 0..SUPERSAMPLE {
                    let px = x as f32 + (sx as f32 + 0.5) / SUPERSAMPLE as f32;
                    let py = y as f32 + (sy as f32 + 0.5) / SUPERSAMPLE as f32;
                    if winding_number(Vec2::new(px, py), positions) != 0 {
                        hits += 1;
                    }
                }
            }
            let total = SUPERSAMPLE * SUPERSAMPLE;
            let coverage = (hits as f32 / total as f32 * 255.0).round() as u8;
            buffer[(y * width + x) as usize] = coverage;
        }
    }
    buffer
}

/// Rasterizes a triangle soup (already in target pixel space), taking the
/// maximum per-pixel coverage across overlapping triangles so stroke
/// joins don't over-brighten.
pub fn rasterize_triangles_coverage(
    triangles: &[[Vec2; 3]],
    width: u32,
    height: u32,
) -> Vec<u8> {
    let mut buffer = vec![0u8; (width * height) as usize];
    if triangles.is_empty() {
        return buffer;
    }

    for y in 0..height {
        for x in 0..width {
            let mut hits = 0u32;
            for sy in 0..SUPERSAMPLE {
                for sx in 0..SUPERSAMPLE {
                    let px = x as f32 + (sx as f32 + 0.5) / SUPERSAMPLE as f32;
                    let py = y as f32 + (sy as f32 + 0.5) / SUPERSAMPLE as f32;
                    let p = Vec2::new(px, py);
                    if triangles
                        .iter()
                        .any(|tri| point_in_triangle(p, tri[0], tri[1], tri[2]))
                    {
                        hits += 1;
                    }
                }
            }
            let total = SUPERSAMPLE * SUPERSAMPLE;
            let coverage = (hits as f32 / total as f32 * 255.0).round() as u8;
            buffer[(y * width + x) as usize] = coverage;
        }
    }
    buffer
}

fn winding_number(p: Vec2, polygon: &[Vec2]) -> i32 {
    let n = polygon.len();
    let mut winding = 0i32;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if a.y <= p.y {
            if b.y > p.y && is_left(a, b, p) > 0.0 {
                winding += 1;
            }
        } else if b.y <= p.y && is_left(a, b, p) < 0.0 {
            winding -= 1;
        }
    }
    winding
}

fn is_left(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (p.x - a.x) * (b.y - a.y)
}

fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    let d1 = is_left(a, b, p);
    let d2 = is_left(b, c, p);
    let d3 = is_left(c, a, p);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

fn to_lyon_cap(cap: LineCap) -> LyonLineCap {
    match cap {
        LineCap::Butt => LyonLineCap::Butt,
        LineCap::Round => LyonLineCap::Round,
        LineCap::Square => LyonLineCap::Square,
    }
}

fn to_lyon_join(join: LineJoin) -> LyonLineJoin {
    match join {
        LineJoin::Miter => LyonLineJoin::Miter,
        LineJoin::Round => LyonLineJoin::Round,
        LineJoin::Bevel => LyonLineJoin::Bevel,
    }
}

/// Converts a closed polyline plus stroke style into a triangle soup
/// (already expanded to the line's actual width, in the same units as
/// `positions`) ready for `rasterize_triangles_coverage`.
pub fn stroke_to_triangles(
    positions: &[Vec2],
    closed: bool,
    width: f32,
    cap: LineCap,
    join: LineJoin,
    miter_limit: f32,
) -> Vec<[Vec2; 3]> {
    if positions.len() < 2 {
        return Vec::new();
    }

    let mut builder = LyonPath::builder();
    builder.begin(point(positions[0].x, positions[0].y));
    for p in &positions[1..] {
        builder.line_to(point(p.x, p.y));
    }
    builder.end(closed);
    let path = builder.build();

    let options = StrokeOptions::default()
        .with_line_width(width.max(1e-4))
        .with_line_cap(to_lyon_cap(cap))
        .with_line_join(to_lyon_join(join))
        .with_miter_limit(miter_limit.max(1.0));

    let mut geometry: VertexBuffers<Vec2, u16> = VertexBuffers::new();
    let mut tessellator = StrokeTessellator::new();
    let result = tessellator.tessellate_path(
        &path,
        &options,
        &mut BuffersBuilder::new(&mut geometry, |vertex: StrokeVertex| {
            let p = vertex.position();
            Vec2::new(p.x, p.y)
        }),
    );
    if result.is_err() {
        return Vec::new();
    }

    geometry
        .indices
        .chunks(3)
        .filter(|c| c.len() == 3)
        .map(|c| {
            [
                geometry.vertices[c[0] as usize],
                geometry.vertices[c[1] as usize],
                geometry.vertices[c[2] as usize],
            ]
        })
        .collect()
}

/// Rasterizes `positions` via `lyon::FillTessellator` first (non-zero
/// fill rule matches the winding-number rasterizer above; this path is
/// available for callers that already have a `lyon::Path` and want to
/// reuse its tessellation rather than this module's direct winding test).
pub fn tessellate_fill_triangles(positions: &[Vec2], closed: bool) -> Vec<[Vec2; 3]> {
    if positions.len() < 3 {
        return Vec::new();
    }
    let mut builder = LyonPath::builder();
    builder.begin(point(positions[0].x, positions[0].y));
    for p in &positions[1..] {
        builder.line_to(point(p.x, p.y));
    }
    builder.end(closed);
    let path = builder.build();

    let mut geometry: VertexBuffers<Vec2, u16> = VertexBuffers::new();
    let mut tessellator = FillTessellator::new();
    let result = tessellator.tessellate_path(
        &path,
        &FillOptions::default(),
        &mut BuffersBuilder::new(&mut geometry, |vertex: FillVertex| {
            let p = vertex.position();
            Vec2::new(p.x, p.y)
        }),
    );
    if result.is_err() {
        return Vec::new();
    }
    geometry
        .indices
        .chunks(3)
        .filter(|c| c.len() == 3)
        .map(|c| {
            [
                geometry.vertices[c[0] as usize],
                geometry.vertices[c[1] as usize],
                geometry.vertices[c[2] as usize],
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_fill_covers_interior_and_not_exterior() {
        let square = [
            Vec2::new(2.0, 2.0),
            Vec2::new(6.0, 2.0),
            Vec2::new(6.0, 6.0),
            Vec2::new(2.0, 6.0),
        ];
        let coverage = rasterize_fill_coverage(&square, 8, 8);
        assert_eq!(coverage[(4 * 8 + 4) as usize], 255);
        assert_eq!(coverage[(0 * 8 + 0) as usize], 0);
    }

    #[test]
    fn degenerate_fill_is_all_zero() {
        let coverage = rasterize_fill_coverage(&[Vec2::ZERO, Vec2::new(1.0, 1.0)], 4, 4);
        assert!(coverage.iter().all(|&c| c == 0));
    }

    #[test]
    fn stroke_to_triangles_produces_nonempty_geometry_for_a_line() {
        let positions = [Vec2::new(0.0, 4.0), Vec2::new(8.0, 4.0)];
        let triangles = stroke_to_triangles(
            &positions,
            false,
            2.0,
            LineCap::Butt,
            LineJoin::Miter,
            4.0,
        );
        assert!(!triangles.is_empty());
        let coverage = rasterize_triangles_coverage(&triangles, 8, 8);
        assert!(coverage[(4 * 8 + 4) as usize] > 0);
    }
}
