//! Mask group engine: renders a `BeginMask { .. } .. EndMask` scope by
//! rasterizing the mask path's coverage into a bbox-sized texture,
//! combining it into a running accumulator, rendering the scope's inner
//! content into its own bbox-sized texture, and compositing
//! `content * accumulator` back onto the target.
//!
//! Nested `BeginMask` scopes are not special-cased here: the inner content
//! render is a normal recursive `executor::run` call, so a mask nested
//! inside another mask's content simply re-enters this function from one
//! level down, applying the innermost mask to the raw content first and
//! the outer mask to that already-masked result — exactly the nesting
//! order the command stream implies.

use super::executor::{self, ExecutionState};
use super::{RenderContext, RenderTarget, TextureProvider};
use crate::command::{Command, MaskMode};
use crate::error::{RenderIssue, RenderIssueKind, RenderResult};
use crate::geom::{IntRect, Vec2};
use crate::gpu::{PoolFormat, ScopedTexture};

fn mask_mode_identity(mode: MaskMode) -> f64 {
    match mode {
        MaskMode::Add => 0.0,
        MaskMode::Subtract => 1.0,
        MaskMode::Intersect => 1.0,
    }
}

fn mask_mode_code(mode: MaskMode) -> u32 {
    match mode {
        MaskMode::Add => 0,
        MaskMode::Subtract => 1,
        MaskMode::Intersect => 2,
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CombineParams {
    mode: u32,
    inverted: u32,
    opacity: f32,
    _pad: f32,
}

fn clear_view(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, color: wgpu::Color, label: &str) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(color),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

/// Runs the scope's inner content directly onto `target`, as if no mask
/// had been present, for the degenerate-bbox / missing-path fallback.
fn render_unmasked_fallback(
    ctx: &mut RenderContext,
    state: &mut ExecutionState,
    inner_commands: &[Command],
    textures: &dyn TextureProvider,
    target: &RenderTarget,
    encoder: &mut wgpu::CommandEncoder,
    begin_index: usize,
    issue: RenderIssueKind,
) -> RenderResult<()> {
    ctx.issues.push(RenderIssue {
        command_index: begin_index,
        kind: issue,
    });
    *ctx.mask_fallback_count += 1;
    #[cfg(feature = "perf-metrics")]
    {
        ctx.metrics.mask_fallbacks_this_frame += 1;
    }
    executor::run(ctx, state, inner_commands, textures, target, encoder)
}

struct MaskOp {
    mode: MaskMode,
    inverted: bool,
    path: crate::command::PathId,
    opacity: f32,
    frame: crate::command::Frame,
}

/// Splits a mask scope's LIFO chain `BeginMask(Mn) .. BeginMask(M0) [inner]
/// EndMask .. EndMask` (as produced by the compiler, see spec.md §4.3) into
/// its ops in application order `[M0, M1, .., Mn]` and the inner command
/// range. Returns `None` if the chain isn't shaped as expected (unequal
/// leading/trailing run lengths), signalling the caller to fall back to
/// rendering the scope unmasked.
fn split_mask_chain(scope_commands: &[Command]) -> Option<(Vec<MaskOp>, &[Command])> {
    let mut n_begin = 0;
    while let Some(Command::BeginMask { .. }) = scope_commands.get(n_begin) {
        n_begin += 1;
    }
    if n_begin == 0 || scope_commands.len() < 2 * n_begin {
        return None;
    }
    let tail_start = scope_commands.len() - n_begin;
    if !scope_commands[tail_start..].iter().all(|c| matches!(c, Command::EndMask)) {
        return None;
    }
    let mut encounter_order = Vec::with_capacity(n_begin);
    for command in &scope_commands[..n_begin] {
        let Command::BeginMask {
            mode,
            inverted,
            path,
            opacity,
            frame,
        } = command
        else {
            unreachable!("checked above");
        };
        encounter_order.push(MaskOp {
            mode: *mode,
            inverted: *inverted,
            path: *path,
            opacity: *opacity,
            frame: *frame,
        });
    }
    encounter_order.reverse();
    Some((encounter_order, &scope_commands[n_begin..tail_start]))
}

pub fn execute_mask_scope(
    ctx: &mut RenderContext,
    state: &mut ExecutionState,
    scope_commands: &[Command],
    begin_index: usize,
    textures: &dyn TextureProvider,
    target: &RenderTarget,
    encoder: &mut wgpu::CommandEncoder,
) -> RenderResult<()> {
    if state.scope_depth >= executor::MAX_SCOPE_DEPTH {
        let inner_commands = &scope_commands[1..scope_commands.len().saturating_sub(1)];
        return render_unmasked_fallback(
            ctx,
            state,
            inner_commands,
            textures,
            target,
            encoder,
            begin_index,
            RenderIssueKind::MaxNestingDepthExceeded,
        );
    }

    let Some((ops, inner_commands)) = split_mask_chain(scope_commands) else {
        // scope_commands[1..len-1] is the best-effort inner range for a
        // chain shape we don't recognize.
        let inner_commands = &scope_commands[1..scope_commands.len().saturating_sub(1)];
        return render_unmasked_fallback(
            ctx,
            state,
            inner_commands,
            textures,
            target,
            encoder,
            begin_index,
            RenderIssueKind::DegenerateMaskBbox,
        );
    };

    let to_viewport = state.current_transform().then(&state.anim_to_viewport);
    let generation = ctx.path_registry.generation_id();

    // Sample every op up front and union their bboxes (spec.md §4.3 step 1).
    let mut op_positions: Vec<Vec<Vec2>> = Vec::with_capacity(ops.len());
    let mut op_indices: Vec<&[u16]> = Vec::with_capacity(ops.len());
    let mut union_bbox: Option<IntRect> = None;
    for op in &ops {
        let Some(resource) = ctx.path_registry.get(op.path) else {
            return render_unmasked_fallback(
                ctx,
                state,
                inner_commands,
                textures,
                target,
                encoder,
                begin_index,
                RenderIssueKind::DegenerateMaskBbox,
            );
        };
        let Some(sampled) = ctx.path_cache.sample(generation, op.path, op.frame, || resource.sample(op.frame)) else {
            return render_unmasked_fallback(
                ctx,
                state,
                inner_commands,
                textures,
                target,
                encoder,
                begin_index,
                RenderIssueKind::DegenerateMaskBbox,
            );
        };
        if sampled.vertices.len() < 3 || resource.indices.len() < 3 {
            return render_unmasked_fallback(
                ctx,
                state,
                inner_commands,
                textures,
                target,
                encoder,
                begin_index,
                RenderIssueKind::DegenerateMaskBbox,
            );
        }
        let viewport_positions: Vec<Vec2> = sampled.vertices.iter().map(|p| to_viewport.apply_point(*p)).collect();
        let Some(op_bbox) = IntRect::bounding(&viewport_positions) else {
            return render_unmasked_fallback(
                ctx,
                state,
                inner_commands,
                textures,
                target,
                encoder,
                begin_index,
                RenderIssueKind::DegenerateMaskBbox,
            );
        };
        union_bbox = Some(match union_bbox {
            Some(acc) => acc.union(&op_bbox),
            None => op_bbox,
        });
        op_positions.push(viewport_positions);
        op_indices.push(&resource.indices);
    }

    let Some(raw_bbox) = union_bbox else {
        return render_unmasked_fallback(
            ctx,
            state,
            inner_commands,
            textures,
            target,
            encoder,
            begin_index,
            RenderIssueKind::DegenerateMaskBbox,
        );
    };
    let bbox = raw_bbox
        .expanded(2)
        .clamped(state.target_width as i32, state.target_height as i32)
        .intersected(&state.current_clip());
    if bbox.is_empty() {
        return render_unmasked_fallback(
            ctx,
            state,
            inner_commands,
            textures,
            target,
            encoder,
            begin_index,
            RenderIssueKind::DegenerateMaskBbox,
        );
    }

    let width = bbox.width as u32;
    let height = bbox.height as u32;

    let coverage = ScopedTexture::acquire(ctx.texture_pool, ctx.device, width, height, PoolFormat::R8);
    let accum_a = ScopedTexture::acquire(ctx.texture_pool, ctx.device, width, height, PoolFormat::R8);
    let accum_b = ScopedTexture::acquire(ctx.texture_pool, ctx.device, width, height, PoolFormat::R8);
    let content = ScopedTexture::acquire(ctx.texture_pool, ctx.device, width, height, PoolFormat::Bgra8);

    let identity = mask_mode_identity(ops[0].mode);
    clear_view(
        encoder,
        &accum_a.get().view,
        wgpu::Color { r: identity, g: 0.0, b: 0.0, a: 0.0 },
        "animcore_mask_accum_clear",
    );
    clear_view(encoder, &content.get().view, wgpu::Color::TRANSPARENT, "animcore_mask_content_clear");

    let bbox_mvp = super::viewport_to_ndc_matrix(width, height);
    let accum_views = [&accum_a.get().view, &accum_b.get().view];
    // accumIn = A, accumOut = B initially (spec.md §4.3 step 3); ping-pong
    // by toggling which index is "in" after each op so no pass ever reads
    // and writes the same texture.
    let mut in_idx = 0usize;
    for (op, (positions, indices)) in ops.iter().zip(op_positions.iter().zip(op_indices.iter())) {
        clear_view(encoder, &coverage.get().view, wgpu::Color::BLACK, "animcore_mask_coverage_clear");

        let local_positions: Vec<Vec2> = positions.iter().map(|p| Vec2::new(p.x - bbox.x as f32, p.y - bbox.y as f32)).collect();
        draw_coverage_mesh(ctx, encoder, &coverage.get().view, op.path, &local_positions, *indices, &bbox_mvp);

        let out_idx = 1 - in_idx;
        combine_accumulator(
            ctx,
            encoder,
            &coverage.get().view,
            accum_views[in_idx],
            accum_views[out_idx],
            op.mode,
            op.inverted,
            op.opacity,
        );
        in_idx = out_idx;
    }
    let final_accum = accum_views[in_idx];

    // Render the scope's inner content into its own bbox-sized texture,
    // translated so the bbox origin lands at (0, 0).
    let content_anim_to_viewport = target
        .anim_to_viewport()
        .then(&crate::geom::Matrix2D::translation(-(bbox.x as f32), -(bbox.y as f32)));
    let mut inner_state = state.clone_for_subtree(width, height, content_anim_to_viewport);
    let content_target = RenderTarget {
        view: &content.get().view,
        viewport_width: width,
        viewport_height: height,
        animation_width: target.animation_width,
        animation_height: target.animation_height,
    };
    executor::run(ctx, &mut inner_state, inner_commands, textures, &content_target, encoder)?;

    composite_mask_result(ctx, encoder, target, &content.get().view, final_accum, bbox);

    Ok(())
}

/// Uploads a path's *unique* vertices (not an expanded triangle soup) and
/// draws its fixed triangulation through the per-path cached index buffer
/// (spec.md §4.3 step 5 / §4.7 `PathIndexBufferCache`), rather than
/// re-expanding `indices` into per-triangle vertices on every call.
fn draw_coverage_mesh(
    ctx: &mut RenderContext,
    encoder: &mut wgpu::CommandEncoder,
    coverage_view: &wgpu::TextureView,
    path_id: crate::command::PathId,
    local_positions: &[Vec2],
    indices: &[u16],
    mvp: &crate::geom::Matrix2D,
) {
    if local_positions.is_empty() || indices.is_empty() {
        return;
    }
    let flat: Vec<f32> = local_positions.iter().flat_map(|p| [p.x, p.y, 0.0, 0.0]).collect();
    let slice = ctx.vertex_pool.upload_floats(ctx.device, ctx.queue, &flat);
    let mvp_buffer = super::pipelines::create_mvp_buffer(ctx.device, mvp);
    let mvp_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("animcore_mask_coverage_mvp_bind_group"),
        layout: &ctx.pipelines.mvp_bgl,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: mvp_buffer.as_entire_binding(),
        }],
    });
    let index_buffer = ctx.index_cache.get_or_create(ctx.device, path_id, indices);

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("animcore_mask_coverage_pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: coverage_view,
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
    pass.set_pipeline(&ctx.pipelines.coverage);
    pass.set_bind_group(0, &mvp_bind_group, &[]);
    pass.set_vertex_buffer(0, ctx.vertex_pool.current_buffer().slice(slice.offset..slice.offset + slice.length));
    pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint16);
    pass.draw_indexed(0..indices.len() as u32, 0, 0..1);
}

#[allow(clippy::too_many_arguments)]
fn combine_accumulator(
    ctx: &mut RenderContext,
    encoder: &mut wgpu::CommandEncoder,
    coverage_view: &wgpu::TextureView,
    accum_in_view: &wgpu::TextureView,
    accum_out_view: &wgpu::TextureView,
    mode: MaskMode,
    inverted: bool,
    opacity: f32,
) {
    let params = CombineParams {
        mode: mask_mode_code(mode),
        inverted: inverted as u32,
        opacity,
        _pad: 0.0,
    };
    let params_buffer = wgpu::util::DeviceExt::create_buffer_init(
        ctx.device,
        &wgpu::util::BufferInitDescriptor {
            label: Some("animcore_mask_combine_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        },
    );
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("animcore_mask_combine_bind_group"),
        layout: &ctx.pipelines.mask_combine_bgl,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(coverage_view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(accum_in_view) },
            wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&ctx.pipelines.sampler) },
            wgpu::BindGroupEntry { binding: 3, resource: params_buffer.as_entire_binding() },
        ],
    });

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("animcore_mask_combine_pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: accum_out_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.set_pipeline(&ctx.pipelines.mask_combine);
    pass.set_bind_group(0, &bind_group, &[]);
    pass.draw(0..3, 0..1);
}

fn composite_mask_result(
    ctx: &mut RenderContext,
    encoder: &mut wgpu::CommandEncoder,
    target: &RenderTarget,
    content_view: &wgpu::TextureView,
    accum_view: &wgpu::TextureView,
    bbox: IntRect,
) {
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("animcore_mask_composite_bind_group"),
        layout: &ctx.pipelines.mask_composite_bgl,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(content_view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(accum_view) },
            wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&ctx.pipelines.sampler) },
        ],
    });

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("animcore_mask_composite_pass"),
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
    pass.set_viewport(bbox.x as f32, bbox.y as f32, bbox.width as f32, bbox.height as f32, 0.0, 1.0);
    pass.set_scissor_rect(bbox.x as u32, bbox.y as u32, bbox.width as u32, bbox.height as u32);
    pass.set_pipeline(&ctx.pipelines.mask_composite);
    pass.set_bind_group(0, &bind_group, &[]);
    pass.draw(0..3, 0..1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_mode_identity_is_zero() {
        assert_eq!(mask_mode_identity(MaskMode::Add), 0.0);
    }

    #[test]
    fn subtract_and_intersect_identity_is_one() {
        assert_eq!(mask_mode_identity(MaskMode::Subtract), 1.0);
        assert_eq!(mask_mode_identity(MaskMode::Intersect), 1.0);
    }

    #[test]
    fn mode_codes_are_stable_for_the_wgsl_switch() {
        assert_eq!(mask_mode_code(MaskMode::Add), 0);
        assert_eq!(mask_mode_code(MaskMode::Subtract), 1);
        assert_eq!(mask_mode_code(MaskMode::Intersect), 2);
    }

    fn begin_mask(mode: MaskMode, path_id: u64) -> Command {
        Command::BeginMask {
            mode,
            inverted: false,
            path: crate::command::PathId(path_id),
            opacity: 1.0,
            frame: 0.0,
        }
    }

    #[test]
    fn split_mask_chain_reverses_lifo_encounter_order_to_application_order() {
        // Compiler emits BeginMask(Mn) .. BeginMask(M0) [inner] EndMask..EndMask;
        // M0 (last encountered before inner) must come first in application order.
        let commands = vec![
            begin_mask(MaskMode::Subtract, 1),
            begin_mask(MaskMode::Add, 0),
            Command::DrawImage { asset_key: "inner".into(), opacity: 1.0 },
            Command::EndMask,
            Command::EndMask,
        ];
        let (ops, inner) = split_mask_chain(&commands).expect("well-formed chain");
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].path, crate::command::PathId(0));
        assert_eq!(ops[0].mode, MaskMode::Add);
        assert_eq!(ops[1].path, crate::command::PathId(1));
        assert_eq!(ops[1].mode, MaskMode::Subtract);
        assert_eq!(inner.len(), 1);
        assert!(matches!(inner[0], Command::DrawImage { .. }));
    }

    #[test]
    fn split_mask_chain_single_op_matches_prior_behavior() {
        let commands = vec![
            begin_mask(MaskMode::Intersect, 5),
            Command::DrawImage { asset_key: "x".into(), opacity: 1.0 },
            Command::EndMask,
        ];
        let (ops, inner) = split_mask_chain(&commands).expect("well-formed chain");
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, crate::command::PathId(5));
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn split_mask_chain_rejects_mismatched_begin_end_counts() {
        let commands = vec![
            begin_mask(MaskMode::Add, 0),
            begin_mask(MaskMode::Add, 1),
            Command::DrawImage { asset_key: "x".into(), opacity: 1.0 },
            Command::EndMask,
        ];
        assert!(split_mask_chain(&commands).is_none());
    }
}
