//! Linear command executor: maintains the transform/clip/group stacks and
//! dispatches primitives, segmenting out `BeginMask`/`BeginMatte` scopes to
//! the mask and matte engines as it goes.
//!
//! Composition convention: `Matrix2D::then` applies the receiver first,
//! then its argument. `push_transform(m)` therefore pushes
//! `m.then(current_top)`, since `m` is expressed in the local coordinate
//! system that sits *inside* everything already on the stack.

use super::mask_engine;
use super::matte_engine;
use super::pipelines::create_mvp_buffer;
use super::{viewport_to_ndc_matrix, RenderContext, RenderTarget, TextureProvider};
use crate::command::{Command, LineCap, LineJoin};
use crate::error::{RenderError, RenderResult};
use crate::geom::{IntRect, Matrix2D, Rect, Vec2};
use crate::gpu::{PoolFormat, ScopedTexture};
use crate::shape_cache::{coverage_to_premultiplied_bgra, fill_cache_key, stroke_cache_key};
use crate::vertex::{quad_from_corners, QuadVertex};
use smallvec::SmallVec;

/// Upper bound on nested mask/matte scope recursion (spec.md §9 "matte
/// subtree containing its own nested matte scope"). A command stream
/// this deeply nested is almost certainly malformed or generated
/// pathologically; rather than let the recursive `executor::run` calls
/// blow the stack, each scope engine checks `scope_depth` against this
/// bound before recursing.
pub const MAX_SCOPE_DEPTH: u32 = 16;

#[derive(Clone)]
pub struct ExecutionState {
    pub transform_stack: SmallVec<[Matrix2D; 8]>,
    pub clip_stack: SmallVec<[IntRect; 8]>,
    pub group_depth: i32,
    pub anim_to_viewport: Matrix2D,
    pub viewport_to_ndc: Matrix2D,
    pub target_width: u32,
    pub target_height: u32,
    /// How many mask/matte scopes enclose this state, incremented by
    /// each scope engine before recursing into its subtree(s).
    pub scope_depth: u32,
}

impl ExecutionState {
    pub fn new(
        anim_to_viewport: Matrix2D,
        viewport_to_ndc: Matrix2D,
        target_width: u32,
        target_height: u32,
    ) -> Self {
        let base_clip = IntRect {
            x: 0,
            y: 0,
            width: target_width as i32,
            height: target_height as i32,
        };
        Self {
            transform_stack: SmallVec::new(),
            clip_stack: SmallVec::from_buf([base_clip]),
            group_depth: 0,
            anim_to_viewport,
            viewport_to_ndc,
            target_width,
            target_height,
            scope_depth: 0,
        }
    }

    pub fn current_transform(&self) -> Matrix2D {
        self.transform_stack.last().copied().unwrap_or(Matrix2D::IDENTITY)
    }

    pub fn current_clip(&self) -> IntRect {
        *self.clip_stack.last().expect("clip stack always has a base entry")
    }

    pub fn push_transform(&mut self, m: Matrix2D) {
        let top = self.current_transform();
        self.transform_stack.push(m.then(&top));
    }

    pub fn pop_transform(&mut self) -> RenderResult<()> {
        if self.transform_stack.is_empty() {
            return Err(RenderError::InvalidCommandStack(
                "PopTransform with no matching PushTransform".into(),
            ));
        }
        self.transform_stack.pop();
        Ok(())
    }

    /// Clip rects are expressed in animation space and mapped straight to
    /// viewport pixels by `anim_to_viewport`; the current transform does
    /// not participate; a clip is a viewport-fixed window, not a
    /// transformed shape.
    pub fn push_clip_rect(&mut self, rect: Rect) {
        let corners = rect.corners().map(|p| self.anim_to_viewport.apply_point(p));
        let bounds = IntRect::bounding(&corners).unwrap_or(IntRect {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        });
        let clamped = bounds.clamped(self.target_width as i32, self.target_height as i32);
        let intersected = clamped.intersected(&self.current_clip());
        self.clip_stack.push(intersected);
    }

    pub fn pop_clip_rect(&mut self) -> RenderResult<()> {
        if self.clip_stack.len() <= 1 {
            return Err(RenderError::InvalidCommandStack(
                "PopClipRect with no matching PushClipRect".into(),
            ));
        }
        self.clip_stack.pop();
        Ok(())
    }

    pub fn clone_for_subtree(&self, target_width: u32, target_height: u32, anim_to_viewport: Matrix2D) -> ExecutionState {
        ExecutionState {
            transform_stack: self.transform_stack.clone(),
            clip_stack: SmallVec::from_buf([IntRect {
                x: 0,
                y: 0,
                width: target_width as i32,
                height: target_height as i32,
            }]),
            group_depth: 0,
            anim_to_viewport,
            viewport_to_ndc: viewport_to_ndc_matrix(target_width, target_height),
            target_width,
            target_height,
            scope_depth: self.scope_depth + 1,
        }
    }
}

fn is_begin_mask(c: &Command) -> bool {
    matches!(c, Command::BeginMask { .. })
}
fn is_end_mask(c: &Command) -> bool {
    matches!(c, Command::EndMask)
}
fn is_begin_matte(c: &Command) -> bool {
    matches!(c, Command::BeginMatte(_))
}
fn is_end_matte(c: &Command) -> bool {
    matches!(c, Command::EndMatte)
}

/// Scans forward from `start` (which must be a begin-command) tracking
/// same-kind nesting depth and returns the index of the matching end
/// command. A malformed (unterminated) scope resolves to the last index of
/// the slice, so a caller can still make forward progress.
fn find_matching_end(
    commands: &[Command],
    start: usize,
    is_begin: impl Fn(&Command) -> bool,
    is_end: impl Fn(&Command) -> bool,
) -> usize {
    let mut depth = 0i32;
    for (offset, command) in commands[start..].iter().enumerate() {
        if is_begin(command) {
            depth += 1;
        } else if is_end(command) {
            depth -= 1;
            if depth == 0 {
                return start + offset;
            }
        }
    }
    commands.len().saturating_sub(1)
}

/// Runs `commands` against `state`, opening and closing render passes on
/// `target.view` for contiguous non-scope runs and delegating `BeginMask`/
/// `BeginMatte` scopes to the mask/matte engines.
pub fn run(
    ctx: &mut RenderContext,
    state: &mut ExecutionState,
    commands: &[Command],
    textures: &dyn TextureProvider,
    target: &RenderTarget,
    encoder: &mut wgpu::CommandEncoder,
) -> RenderResult<()> {
    let mut i = 0;
    while i < commands.len() {
        let boundary = commands[i..]
            .iter()
            .position(|c| is_begin_mask(c) || is_begin_matte(c))
            .map(|p| i + p)
            .unwrap_or(commands.len());

        if boundary > i {
            #[cfg(feature = "perf-metrics")]
            let timer = super::metrics::PhaseTimer::start();
            run_linear_segment(ctx, state, &commands[i..boundary], textures, target, encoder, i)?;
            #[cfg(feature = "perf-metrics")]
            timer.stop_into(&mut ctx.metrics.phase_timings.linear_segments);
        }

        if boundary >= commands.len() {
            break;
        }

        if is_begin_mask(&commands[boundary]) {
            let end = find_matching_end(commands, boundary, is_begin_mask, is_end_mask);
            #[cfg(feature = "perf-metrics")]
            let timer = super::metrics::PhaseTimer::start();
            mask_engine::execute_mask_scope(
                ctx,
                state,
                &commands[boundary..=end],
                boundary,
                textures,
                target,
                encoder,
            )?;
            #[cfg(feature = "perf-metrics")]
            timer.stop_into(&mut ctx.metrics.phase_timings.mask_scopes);
            i = end + 1;
        } else {
            let end = find_matching_end(commands, boundary, is_begin_matte, is_end_matte);
            #[cfg(feature = "perf-metrics")]
            let timer = super::metrics::PhaseTimer::start();
            matte_engine::execute_matte_scope(
                ctx,
                state,
                &commands[boundary..=end],
                boundary,
                textures,
                target,
                encoder,
            )?;
            #[cfg(feature = "perf-metrics")]
            timer.stop_into(&mut ctx.metrics.phase_timings.matte_scopes);
            i = end + 1;
        }
    }
    Ok(())
}

fn run_linear_segment(
    ctx: &mut RenderContext,
    state: &mut ExecutionState,
    commands: &[Command],
    textures: &dyn TextureProvider,
    target: &RenderTarget,
    encoder: &mut wgpu::CommandEncoder,
    base_index: usize,
) -> RenderResult<()> {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("animcore_linear_segment_pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target.view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });

    for (offset, command) in commands.iter().enumerate() {
        let index = base_index + offset;
        #[cfg(feature = "perf-metrics")]
        ctx.metrics.commands.record(command);
        match command {
            Command::BeginGroup(_) => state.group_depth += 1,
            Command::EndGroup => state.group_depth -= 1,
            Command::PushTransform(m) => state.push_transform(*m),
            Command::PopTransform => state.pop_transform()?,
            Command::PushClipRect(rect) => state.push_clip_rect(*rect),
            Command::PopClipRect => state.pop_clip_rect()?,
            Command::DrawImage { asset_key, opacity } => {
                draw_image(ctx, state, &mut pass, textures, asset_key, *opacity, index)?;
            }
            Command::DrawShape {
                path,
                fill_color,
                fill_opacity,
                layer_opacity,
                frame,
            } => {
                draw_shape(
                    ctx,
                    state,
                    &mut pass,
                    *path,
                    *fill_color,
                    *fill_opacity,
                    *layer_opacity,
                    *frame,
                    index,
                )?;
            }
            Command::DrawStroke {
                path,
                stroke_color,
                stroke_opacity,
                stroke_width,
                line_cap,
                line_join,
                miter_limit,
                layer_opacity,
                frame,
            } => {
                draw_stroke(
                    ctx,
                    state,
                    &mut pass,
                    *path,
                    *stroke_color,
                    *stroke_opacity,
                    *stroke_width,
                    *line_cap,
                    *line_join,
                    *miter_limit,
                    *layer_opacity,
                    *frame,
                    index,
                )?;
            }
            Command::BeginMask { .. }
            | Command::EndMask
            | Command::BeginMatte(_)
            | Command::EndMatte => {
                unreachable!("scope commands are segmented out before reaching a linear run")
            }
        }
    }
    Ok(())
}

fn set_pass_scissor(pass: &mut wgpu::RenderPass, clip: IntRect, target_width: u32, target_height: u32) {
    let clamped = clip.clamped(target_width as i32, target_height as i32);
    if clamped.is_empty() {
        pass.set_scissor_rect(0, 0, 1, 1);
        return;
    }
    pass.set_scissor_rect(
        clamped.x as u32,
        clamped.y as u32,
        clamped.width as u32,
        clamped.height as u32,
    );
}

fn draw_image(
    ctx: &mut RenderContext,
    state: &ExecutionState,
    pass: &mut wgpu::RenderPass,
    textures: &dyn TextureProvider,
    asset_key: &str,
    opacity: f32,
    command_index: usize,
) -> RenderResult<()> {
    if opacity <= 0.0 {
        return Ok(());
    }
    let Some(view) = textures.get(asset_key) else {
        if ctx.options.enable_warnings_for_unsupported_commands {
            log::warn!("DrawImage: no texture for asset key {asset_key:?}");
        }
        return Err(RenderError::MissingTextureForAsset(asset_key.to_string()));
    };

    let mvp = state
        .current_transform()
        .then(&state.anim_to_viewport)
        .then(&state.viewport_to_ndc);

    // A declared asset size (a per-call override, else the provider's own
    // native size) sizes the quad in local, pre-transform units, matching
    // how a `DrawShape`'s path geometry is expressed; with neither
    // available, fall back to filling the current local unit square scaled
    // to the full animation canvas, the best-effort behavior for an asset
    // whose size truly isn't known anywhere (spec.md §1 Non-goals).
    let declared_size = ctx
        .asset_size_overrides
        .and_then(|overrides| overrides.get(asset_key).copied())
        .or_else(|| textures.native_size(asset_key));

    let corners_local = match declared_size {
        Some((w, h)) => Rect::new(0.0, 0.0, w as f32, h as f32).corners(),
        None => Rect::new(0.0, 0.0, ctx_anim_width(state), ctx_anim_height(state)).corners(),
    };
    let corners_ndc = corners_local.map(|p| {
        let q = mvp.apply_point(p);
        [q.x, q.y]
    });
    let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
    let vertices = quad_from_corners(corners_ndc, uvs);

    draw_textured_quad(ctx, pass, &vertices, view, &Matrix2D::IDENTITY, opacity, state);
    Ok(())
}

// `DrawImage` draws the entire animation-space rect; `ExecutionState`
// doesn't carry animation size directly (it only needs the derived
// matrices), so the two helpers below recover it from `anim_to_viewport`'s
// scale factors, which were built as `viewport / animation`.
fn ctx_anim_width(state: &ExecutionState) -> f32 {
    if state.anim_to_viewport.a.abs() < 1e-9 {
        1.0
    } else {
        state.target_width as f32 / state.anim_to_viewport.a
    }
}
fn ctx_anim_height(state: &ExecutionState) -> f32 {
    if state.anim_to_viewport.d.abs() < 1e-9 {
        1.0
    } else {
        state.target_height as f32 / state.anim_to_viewport.d
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_shape(
    ctx: &mut RenderContext,
    state: &ExecutionState,
    pass: &mut wgpu::RenderPass,
    path: crate::command::PathId,
    fill_color: Option<[u8; 4]>,
    fill_opacity: f32,
    layer_opacity: f32,
    frame: f32,
    command_index: usize,
) -> RenderResult<()> {
    let Some(color) = fill_color else { return Ok(()) };
    let opacity = fill_opacity * layer_opacity;
    if opacity <= 0.0 {
        return Ok(());
    }

    let Some(resource) = ctx.path_registry.get(path) else {
        debug_assert!(false, "DrawShape references unknown path {path}");
        return Err(RenderError::MissingPathResource(path));
    };
    let generation = ctx.path_registry.generation_id();
    let Some(sampled) = ctx.path_cache.sample(generation, path, frame, || resource.sample(frame)) else {
        return Ok(());
    };
    if sampled.vertices.len() < 3 {
        return Ok(());
    }

    let to_viewport = state.current_transform().then(&state.anim_to_viewport);
    let viewport_positions: Vec<Vec2> = sampled.vertices.iter().map(|p| to_viewport.apply_point(*p)).collect();
    let Some(bbox) = IntRect::bounding(&viewport_positions) else {
        return Ok(());
    };
    let bbox = bbox.expanded(1).clamped(state.target_width as i32, state.target_height as i32);
    if bbox.is_empty() {
        return Ok(());
    }

    let key = fill_cache_key(&viewport_positions, (bbox.width as u32, bbox.height as u32), &to_viewport, color, opacity);
    let local_positions: Vec<Vec2> = viewport_positions
        .iter()
        .map(|p| Vec2::new(p.x - bbox.x as f32, p.y - bbox.y as f32))
        .collect();
    let raster = ctx.shape_cache.get_or_insert(key, || {
        let coverage = crate::raster::rasterize_fill_coverage(&local_positions, bbox.width as u32, bbox.height as u32);
        crate::shape_cache::CachedRaster {
            width: bbox.width as u32,
            height: bbox.height as u32,
            premultiplied_bgra: coverage_to_premultiplied_bgra(&coverage, color, opacity),
        }
    });

    draw_cached_raster(ctx, state, pass, &raster, bbox);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn draw_stroke(
    ctx: &mut RenderContext,
    state: &ExecutionState,
    pass: &mut wgpu::RenderPass,
    path: crate::command::PathId,
    stroke_color: [u8; 4],
    stroke_opacity: f32,
    stroke_width: f32,
    line_cap: LineCap,
    line_join: LineJoin,
    miter_limit: f32,
    layer_opacity: f32,
    frame: f32,
    command_index: usize,
) -> RenderResult<()> {
    let opacity = stroke_opacity * layer_opacity;
    if opacity <= 0.0 || stroke_width <= 0.0 {
        return Ok(());
    }

    let Some(resource) = ctx.path_registry.get(path) else {
        debug_assert!(false, "DrawStroke references unknown path {path}");
        return Err(RenderError::MissingPathResource(path));
    };
    let generation = ctx.path_registry.generation_id();
    let Some(sampled) = ctx.path_cache.sample(generation, path, frame, || resource.sample(frame)) else {
        return Ok(());
    };
    if sampled.vertices.len() < 2 {
        return Ok(());
    }

    let to_viewport = state.current_transform().then(&state.anim_to_viewport);
    let viewport_width = stroke_width * to_viewport.x_basis_length();
    let viewport_positions: Vec<Vec2> = sampled.vertices.iter().map(|p| to_viewport.apply_point(*p)).collect();

    let half = viewport_width * 0.5 + 1.0;
    let Some(raw_bbox) = IntRect::bounding(&viewport_positions) else {
        return Ok(());
    };
    let bbox = raw_bbox
        .expanded(half.ceil() as i32)
        .clamped(state.target_width as i32, state.target_height as i32);
    if bbox.is_empty() {
        return Ok(());
    }

    let key = stroke_cache_key(
        &viewport_positions,
        (bbox.width as u32, bbox.height as u32),
        &to_viewport,
        stroke_color,
        opacity,
        viewport_width,
        line_cap,
        line_join,
        miter_limit,
    );
    let local_positions: Vec<Vec2> = viewport_positions
        .iter()
        .map(|p| Vec2::new(p.x - bbox.x as f32, p.y - bbox.y as f32))
        .collect();
    let raster = ctx.shape_cache.get_or_insert(key, || {
        let triangles = crate::raster::stroke_to_triangles(
            &local_positions,
            sampled.closed,
            viewport_width,
            line_cap,
            line_join,
            miter_limit,
        );
        let coverage = crate::raster::rasterize_triangles_coverage(&triangles, bbox.width as u32, bbox.height as u32);
        crate::shape_cache::CachedRaster {
            width: bbox.width as u32,
            height: bbox.height as u32,
            premultiplied_bgra: coverage_to_premultiplied_bgra(&coverage, stroke_color, opacity),
        }
    });

    draw_cached_raster(ctx, state, pass, &raster, bbox);
    Ok(())
}

/// Uploads a rasterized shape/stroke texture and blits it at its own bbox.
/// The raster already encodes the correct viewport position and the
/// current transform/opacity/color, so its MVP is the bare
/// `viewport_to_ndc` with no further transform multiplication.
fn draw_cached_raster(
    ctx: &mut RenderContext,
    state: &ExecutionState,
    pass: &mut wgpu::RenderPass,
    raster: &crate::shape_cache::CachedRaster,
    bbox: IntRect,
) {
    let scoped = ScopedTexture::acquire(ctx.texture_pool, ctx.device, raster.width, raster.height, PoolFormat::Bgra8);
    ctx.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &scoped.get().texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &raster.premultiplied_bgra,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(raster.width * 4),
            rows_per_image: Some(raster.height),
        },
        wgpu::Extent3d {
            width: raster.width,
            height: raster.height,
            depth_or_array_layers: 1,
        },
    );

    let corners_px = [
        Vec2::new(bbox.x as f32, bbox.y as f32),
        Vec2::new((bbox.x + bbox.width) as f32, bbox.y as f32),
        Vec2::new((bbox.x + bbox.width) as f32, (bbox.y + bbox.height) as f32),
        Vec2::new(bbox.x as f32, (bbox.y + bbox.height) as f32),
    ];
    let corners_ndc = corners_px.map(|p| {
        let q = state.viewport_to_ndc.apply_point(p);
        [q.x, q.y]
    });
    let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
    let vertices = quad_from_corners(corners_ndc, uvs);

    draw_textured_quad(ctx, pass, &vertices, &scoped.get().view, &Matrix2D::IDENTITY, 1.0, state);
}

/// Uploads `vertices` and issues the quad-blit draw, scissored to the
/// current clip rect. `mvp` is pre-baked into `vertices` (already NDC), so
/// the uniform buffer always carries identity; the parameter exists so
/// future passes that need a runtime MVP (e.g. a future instanced variant)
/// can reuse this helper without reshaping it.
fn draw_textured_quad(
    ctx: &mut RenderContext,
    pass: &mut wgpu::RenderPass,
    vertices: &[QuadVertex; 6],
    view: &wgpu::TextureView,
    mvp: &Matrix2D,
    _opacity_already_baked: f32,
    state: &ExecutionState,
) {
    let flat: Vec<f32> = vertices.iter().flat_map(|v| [v.position[0], v.position[1], v.uv[0], v.uv[1]]).collect();
    let slice = ctx.vertex_pool.upload_floats(ctx.device, ctx.queue, &flat);

    let mvp_buffer = create_mvp_buffer(ctx.device, mvp);
    let mvp_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("animcore_quad_blit_mvp_bind_group"),
        layout: &ctx.pipelines.mvp_bgl,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: mvp_buffer.as_entire_binding(),
        }],
    });
    let texture_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("animcore_quad_blit_texture_bind_group"),
        layout: &ctx.pipelines.quad_blit_texture_bgl,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&ctx.pipelines.sampler),
            },
        ],
    });

    set_pass_scissor(pass, state.current_clip(), state.target_width, state.target_height);
    pass.set_pipeline(&ctx.pipelines.quad_blit);
    pass.set_bind_group(0, &mvp_bind_group, &[]);
    pass.set_bind_group(1, &texture_bind_group, &[]);
    pass.set_vertex_buffer(0, ctx.vertex_pool.current_buffer().slice(slice.offset..slice.offset + slice.length));
    pass.draw(0..6, 0..1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MaskMode;

    #[test]
    fn find_matching_end_skips_nested_scopes_of_the_same_kind() {
        let commands = vec![
            Command::BeginMask {
                mode: MaskMode::Add,
                inverted: false,
                path: crate::command::PathId(0),
                opacity: 1.0,
                frame: 0.0,
            },
            Command::BeginMask {
                mode: MaskMode::Add,
                inverted: false,
                path: crate::command::PathId(1),
                opacity: 1.0,
                frame: 0.0,
            },
            Command::EndMask,
            Command::EndMask,
        ];
        let end = find_matching_end(&commands, 0, is_begin_mask, is_end_mask);
        assert_eq!(end, 3);
    }

    #[test]
    fn push_transform_applies_self_before_existing_top() {
        let mut state = ExecutionState::new(Matrix2D::IDENTITY, Matrix2D::IDENTITY, 100, 100);
        state.push_transform(Matrix2D::translation(10.0, 0.0));
        state.push_transform(Matrix2D::scale(2.0, 2.0));
        let p = state.current_transform().apply_point(Vec2::new(0.0, 0.0));
        assert_eq!(p, Vec2::new(20.0, 0.0));
    }

    #[test]
    fn clip_rect_intersects_with_parent() {
        let mut state = ExecutionState::new(Matrix2D::IDENTITY, Matrix2D::IDENTITY, 100, 100);
        state.push_clip_rect(Rect::new(0.0, 0.0, 50.0, 50.0));
        state.push_clip_rect(Rect::new(25.0, 25.0, 50.0, 50.0));
        let clip = state.current_clip();
        assert_eq!(clip, IntRect { x: 25, y: 25, width: 25, height: 25 });
    }

    #[test]
    fn pop_transform_below_baseline_is_an_error() {
        let mut state = ExecutionState::new(Matrix2D::IDENTITY, Matrix2D::IDENTITY, 100, 100);
        assert!(state.pop_transform().is_err());
        state.push_transform(Matrix2D::translation(1.0, 0.0));
        assert!(state.pop_transform().is_ok());
        assert!(state.pop_transform().is_err());
    }

    #[test]
    fn pop_clip_rect_below_baseline_is_an_error() {
        let mut state = ExecutionState::new(Matrix2D::IDENTITY, Matrix2D::IDENTITY, 100, 100);
        assert!(state.pop_clip_rect().is_err());
        state.push_clip_rect(Rect::new(0.0, 0.0, 50.0, 50.0));
        assert!(state.pop_clip_rect().is_ok());
        assert!(state.pop_clip_rect().is_err());
    }

    #[test]
    fn clone_for_subtree_increments_scope_depth() {
        let state = ExecutionState::new(Matrix2D::IDENTITY, Matrix2D::IDENTITY, 100, 100);
        assert_eq!(state.scope_depth, 0);
        let child = state.clone_for_subtree(50, 50, Matrix2D::IDENTITY);
        assert_eq!(child.scope_depth, 1);
        let grandchild = child.clone_for_subtree(25, 25, Matrix2D::IDENTITY);
        assert_eq!(grandchild.scope_depth, 2);
    }

    #[test]
    fn max_scope_depth_is_reachable_in_finite_steps() {
        let mut state = ExecutionState::new(Matrix2D::IDENTITY, Matrix2D::IDENTITY, 100, 100);
        for _ in 0..MAX_SCOPE_DEPTH {
            state = state.clone_for_subtree(10, 10, Matrix2D::IDENTITY);
        }
        assert!(state.scope_depth >= MAX_SCOPE_DEPTH);
    }
}
