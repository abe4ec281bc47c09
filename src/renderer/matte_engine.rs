//! Track-matte engine: renders a `BeginMatte(mode) .. EndMatte` scope's
//! `matteSource` and `matteConsumer` child groups to their own
//! target-sized textures, then composites `consumer * matteFactor(mode,
//! source)` back onto the target.
//!
//! Matte scopes are strictly shaped (spec §4.4): `BeginGroup("matteSource")
//! .. EndGroup` immediately followed by `BeginGroup("matteConsumer") ..
//! EndGroup`, nothing else in between. Any deviation is a runtime
//! structural violation, surfaced as `RenderError::InvalidCommandStack`
//! rather than a best-effort fallback — unlike a degenerate mask bbox, a
//! malformed matte scope has no sensible unmasked rendering to fall back
//! to (there is no single "inner region", just two subtrees with no
//! defined relationship to each other).

use super::executor::{self, ExecutionState, MAX_SCOPE_DEPTH};
use super::{RenderContext, RenderTarget, TextureProvider};
use crate::command::{Command, MatteMode};
use crate::error::{RenderError, RenderResult};
use crate::gpu::{PoolFormat, ScopedTexture};

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct MatteParams {
    mode: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

fn matte_mode_code(mode: MatteMode) -> u32 {
    match mode {
        MatteMode::Alpha => 0,
        MatteMode::AlphaInverted => 1,
        MatteMode::Luma => 2,
        MatteMode::LumaInverted => 3,
    }
}

/// Scans from a `BeginGroup` at `start`, tracking nested group depth, and
/// returns the index of its matching `EndGroup`.
fn find_group_end(commands: &[Command], start: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (offset, command) in commands[start..].iter().enumerate() {
        match command {
            Command::BeginGroup(_) => depth += 1,
            Command::EndGroup => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn clear_transparent(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, label: &str) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

fn malformed(begin_index: usize) -> RenderError {
    RenderError::InvalidCommandStack(format!(
        "matte scope at command {begin_index} must contain exactly \
         BeginGroup(\"matteSource\")..EndGroup followed by \
         BeginGroup(\"matteConsumer\")..EndGroup"
    ))
}

fn nesting_too_deep(begin_index: usize) -> RenderError {
    RenderError::InvalidCommandStack(format!(
        "matte scope at command {begin_index} nests more than {MAX_SCOPE_DEPTH} \
         mask/matte scopes deep; refusing to recurse further"
    ))
}

pub fn execute_matte_scope(
    ctx: &mut RenderContext,
    state: &mut ExecutionState,
    scope_commands: &[Command],
    begin_index: usize,
    textures: &dyn TextureProvider,
    target: &RenderTarget,
    encoder: &mut wgpu::CommandEncoder,
) -> RenderResult<()> {
    if state.scope_depth >= MAX_SCOPE_DEPTH {
        return Err(nesting_too_deep(begin_index));
    }

    let mode = match &scope_commands[0] {
        Command::BeginMatte(mode) => *mode,
        _ => unreachable!("matte scope must begin with BeginMatte"),
    };
    // scope_commands[..] is `[BeginMatte, .. , EndMatte]`.
    let inner = &scope_commands[1..scope_commands.len() - 1];

    let Some(Command::BeginGroup(name)) = inner.first() else {
        return Err(malformed(begin_index));
    };
    if name != "matteSource" {
        return Err(malformed(begin_index));
    }
    let Some(source_end) = find_group_end(inner, 0) else {
        return Err(malformed(begin_index));
    };
    let source_commands = &inner[1..source_end];

    let consumer_start = source_end + 1;
    let Some(Command::BeginGroup(name)) = inner.get(consumer_start) else {
        return Err(malformed(begin_index));
    };
    if name != "matteConsumer" {
        return Err(malformed(begin_index));
    }
    let Some(consumer_end) = find_group_end(inner, consumer_start) else {
        return Err(malformed(begin_index));
    };
    if consumer_end != inner.len() - 1 {
        return Err(malformed(begin_index));
    }
    let consumer_commands = &inner[consumer_start + 1..consumer_end];

    let width = target.viewport_width;
    let height = target.viewport_height;

    let source_tex = ScopedTexture::acquire(ctx.texture_pool, ctx.device, width, height, PoolFormat::Bgra8);
    let consumer_tex = ScopedTexture::acquire(ctx.texture_pool, ctx.device, width, height, PoolFormat::Bgra8);

    clear_transparent(encoder, &source_tex.get().view, "animcore_matte_source_clear");
    clear_transparent(encoder, &consumer_tex.get().view, "animcore_matte_consumer_clear");

    // Each subtree renders with the current execution state, but with the
    // current scissor pushed once more on top so a nested clip inside the
    // subtree intersects with it rather than replacing the base (spec
    // §4.4 step 2/3).
    let mut source_state = state.clone();
    source_state.scope_depth = state.scope_depth + 1;
    source_state.clip_stack.push(state.current_clip());
    let source_target = RenderTarget {
        view: &source_tex.get().view,
        viewport_width: width,
        viewport_height: height,
        animation_width: target.animation_width,
        animation_height: target.animation_height,
    };
    executor::run(ctx, &mut source_state, source_commands, textures, &source_target, encoder)?;

    let mut consumer_state = state.clone();
    consumer_state.scope_depth = state.scope_depth + 1;
    consumer_state.clip_stack.push(state.current_clip());
    let consumer_target = RenderTarget {
        view: &consumer_tex.get().view,
        viewport_width: width,
        viewport_height: height,
        animation_width: target.animation_width,
        animation_height: target.animation_height,
    };
    executor::run(ctx, &mut consumer_state, consumer_commands, textures, &consumer_target, encoder)?;

    composite_matte_result(
        ctx,
        encoder,
        target,
        &consumer_tex.get().view,
        &source_tex.get().view,
        mode,
        state,
    );

    Ok(())
}

fn composite_matte_result(
    ctx: &mut RenderContext,
    encoder: &mut wgpu::CommandEncoder,
    target: &RenderTarget,
    consumer_view: &wgpu::TextureView,
    source_view: &wgpu::TextureView,
    mode: MatteMode,
    state: &ExecutionState,
) {
    let params = MatteParams {
        mode: matte_mode_code(mode),
        _pad0: 0,
        _pad1: 0,
        _pad2: 0,
    };
    let params_buffer = wgpu::util::DeviceExt::create_buffer_init(
        ctx.device,
        &wgpu::util::BufferInitDescriptor {
            label: Some("animcore_matte_composite_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        },
    );
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("animcore_matte_composite_bind_group"),
        layout: &ctx.pipelines.matte_composite_bgl,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(consumer_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(source_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&ctx.pipelines.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: params_buffer.as_entire_binding(),
            },
        ],
    });

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("animcore_matte_composite_pass"),
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
    let clip = state
        .current_clip()
        .clamped(target.viewport_width as i32, target.viewport_height as i32);
    if clip.is_empty() {
        pass.set_scissor_rect(0, 0, 1, 1);
    } else {
        pass.set_scissor_rect(clip.x as u32, clip.y as u32, clip.width as u32, clip.height as u32);
    }
    pass.set_pipeline(&ctx.pipelines.matte_composite);
    pass.set_bind_group(0, &bind_group, &[]);
    pass.draw(0..3, 0..1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matte_mode_codes_match_the_wgsl_switch() {
        assert_eq!(matte_mode_code(MatteMode::Alpha), 0);
        assert_eq!(matte_mode_code(MatteMode::AlphaInverted), 1);
        assert_eq!(matte_mode_code(MatteMode::Luma), 2);
        assert_eq!(matte_mode_code(MatteMode::LumaInverted), 3);
    }

    #[test]
    fn nesting_too_deep_names_the_offending_command_index() {
        let err = nesting_too_deep(7);
        assert!(matches!(err, RenderError::InvalidCommandStack(_)));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn find_group_end_skips_nested_groups() {
        let commands = vec![
            Command::BeginGroup("outer".into()),
            Command::BeginGroup("inner".into()),
            Command::EndGroup,
            Command::EndGroup,
        ];
        assert_eq!(find_group_end(&commands, 0), Some(3));
    }
}
