//! Frame renderer: owns the GPU-facing caches and pools, validates and
//! executes one command stream per `execute` call.
//!
//! Pooled offscreen textures (mask/matte content, source, consumer,
//! accumulators) are always `Bgra8Unorm`; the renderer's own pipelines are
//! compiled against that same format, so the final target view passed to
//! `execute` must also be `Bgra8Unorm` (render to an intermediate texture
//! first if the swapchain uses a different format).

mod executor;
mod mask_engine;
mod matte_engine;
#[cfg(feature = "perf-metrics")]
mod metrics;
mod pipelines;
mod readback;

use crate::command::Command;
use crate::error::{RenderIssue, RenderResult};
use crate::geom::Matrix2D;
use crate::gpu::{PathIndexBufferCache, TexturePool, VertexUploadPool, DEFAULT_RING_DEPTH};
use crate::path::PathRegistry;
use crate::path_cache::PathSamplingCache;
use crate::shape_cache::ShapeRasterCache;
use ahash::AHashMap;
use pipelines::Pipelines;

#[cfg(feature = "perf-metrics")]
pub use metrics::FrameMetrics;

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

#[derive(Debug, Clone)]
pub struct RendererOptions {
    pub clear_color: wgpu::Color,
    /// Whether an unknown asset key or a missing path resource is logged
    /// via `log::warn!` in addition to being recorded as a `RenderIssue`.
    pub enable_warnings_for_unsupported_commands: bool,
    /// Debug builds always assert on a non-empty validator result; in
    /// release builds, setting this collects a `±5` command diagnostic
    /// window into the issue instead of running blind.
    pub enable_diagnostics: bool,
    pub max_frames_in_flight: usize,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            clear_color: wgpu::Color::TRANSPARENT,
            enable_warnings_for_unsupported_commands: true,
            enable_diagnostics: true,
            max_frames_in_flight: DEFAULT_RING_DEPTH,
        }
    }
}

/// Read-only lookup of GPU textures by asset key, supplied by the host for
/// every `execute` call (images referenced by `Command::DrawImage`).
pub trait TextureProvider {
    fn get(&self, asset_key: &str) -> Option<&wgpu::TextureView>;

    /// The asset's own declared pixel dimensions, if the provider tracks
    /// them. `DrawImage` sizes its quad from this when the caller's
    /// per-call `asset_size_overrides` (spec.md §6) has no entry for the
    /// key; providers that don't track sizes can leave this at its default
    /// and the executor falls back to filling the current local unit
    /// square, matching its pre-size-tracking behavior.
    fn native_size(&self, _asset_key: &str) -> Option<(u32, u32)> {
        None
    }
}

pub trait MutableTextureProvider: TextureProvider {
    fn set(&mut self, asset_key: impl Into<String>, view: wgpu::TextureView);
    fn remove(&mut self, asset_key: &str) -> bool;
}

struct AssetEntry {
    view: wgpu::TextureView,
    native_size: Option<(u32, u32)>,
}

/// A simple `HashMap`-backed `TextureProvider`, sufficient for hosts that
/// don't need a custom asset-streaming strategy.
#[derive(Default)]
pub struct AssetTextureTable {
    textures: AHashMap<String, AssetEntry>,
}

impl AssetTextureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `view` under `asset_key` along with its native pixel
    /// dimensions, so `DrawImage` can size its quad from the asset's own
    /// size when the caller supplies no per-call override.
    pub fn set_sized(&mut self, asset_key: impl Into<String>, view: wgpu::TextureView, size: (u32, u32)) {
        self.textures.insert(
            asset_key.into(),
            AssetEntry {
                view,
                native_size: Some(size),
            },
        );
    }
}

impl TextureProvider for AssetTextureTable {
    fn get(&self, asset_key: &str) -> Option<&wgpu::TextureView> {
        self.textures.get(asset_key).map(|entry| &entry.view)
    }

    fn native_size(&self, asset_key: &str) -> Option<(u32, u32)> {
        self.textures.get(asset_key).and_then(|entry| entry.native_size)
    }
}

impl MutableTextureProvider for AssetTextureTable {
    fn set(&mut self, asset_key: impl Into<String>, view: wgpu::TextureView) {
        self.textures.insert(
            asset_key.into(),
            AssetEntry {
                view,
                native_size: None,
            },
        );
    }

    fn remove(&mut self, asset_key: &str) -> bool {
        self.textures.remove(asset_key).is_some()
    }
}

/// Maps viewport pixel coordinates (origin top-left, y-down) to NDC
/// (origin center, y-up), matching wgpu's clip space.
pub(crate) fn viewport_to_ndc_matrix(width: u32, height: u32) -> Matrix2D {
    let w = (width.max(1)) as f32;
    let h = (height.max(1)) as f32;
    Matrix2D::new(2.0 / w, 0.0, 0.0, -2.0 / h, -1.0, 1.0)
}

/// Everything `execute` needs to know about the surface it's drawing into:
/// the destination view, its pixel dimensions, and the animation's own
/// logical coordinate space.
pub struct RenderTarget<'a> {
    pub view: &'a wgpu::TextureView,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub animation_width: f32,
    pub animation_height: f32,
}

impl<'a> RenderTarget<'a> {
    pub fn new(
        view: &'a wgpu::TextureView,
        viewport_size: (u32, u32),
        animation_size: (f32, f32),
    ) -> Self {
        Self {
            view,
            viewport_width: viewport_size.0,
            viewport_height: viewport_size.1,
            animation_width: animation_size.0,
            animation_height: animation_size.1,
        }
    }

    /// Convenience constructor for the common case where the viewport is
    /// simply a device-pixel-scaled copy of the animation's own canvas.
    pub fn for_swapchain(
        view: &'a wgpu::TextureView,
        viewport_size: (u32, u32),
        drawable_scale: f32,
    ) -> Self {
        let animation_size = (
            viewport_size.0 as f32 / drawable_scale.max(1e-6),
            viewport_size.1 as f32 / drawable_scale.max(1e-6),
        );
        Self::new(view, viewport_size, animation_size)
    }

    pub fn anim_to_viewport(&self) -> Matrix2D {
        Matrix2D::new(
            self.viewport_width as f32 / self.animation_width.max(1e-6),
            0.0,
            0.0,
            self.viewport_height as f32 / self.animation_height.max(1e-6),
            0.0,
            0.0,
        )
    }

    pub fn viewport_to_ndc(&self) -> Matrix2D {
        viewport_to_ndc_matrix(self.viewport_width, self.viewport_height)
    }
}

/// Bundles every mutable subsystem the executor and the mask/matte engines
/// need, so those modules take one borrow instead of a dozen parameters.
pub(crate) struct RenderContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub pipelines: &'a Pipelines,
    pub path_registry: &'a PathRegistry,
    pub path_cache: &'a mut PathSamplingCache,
    pub shape_cache: &'a mut ShapeRasterCache,
    pub texture_pool: &'a mut TexturePool,
    pub vertex_pool: &'a mut VertexUploadPool,
    pub index_cache: &'a mut PathIndexBufferCache,
    pub issues: &'a mut Vec<RenderIssue>,
    pub mask_fallback_count: &'a mut u64,
    pub options: &'a RendererOptions,
    pub asset_size_overrides: Option<&'a AHashMap<String, (u32, u32)>>,
    #[cfg(feature = "perf-metrics")]
    pub metrics: &'a mut FrameMetrics,
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    options: RendererOptions,
    pipelines: Pipelines,
    path_registry: PathRegistry,
    path_cache: PathSamplingCache,
    shape_cache: ShapeRasterCache,
    texture_pool: TexturePool,
    vertex_pool: VertexUploadPool,
    index_cache: PathIndexBufferCache,
    issues: Vec<RenderIssue>,
    mask_fallback_count: u64,
    #[cfg(feature = "perf-metrics")]
    metrics: FrameMetrics,
}

impl Renderer {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, options: RendererOptions) -> Self {
        let pipelines = Pipelines::new(&device, COLOR_FORMAT);
        let vertex_pool = VertexUploadPool::new(&device, options.max_frames_in_flight, 4096);
        Self {
            device,
            queue,
            options,
            pipelines,
            path_registry: PathRegistry::new(),
            path_cache: PathSamplingCache::default(),
            shape_cache: ShapeRasterCache::default(),
            texture_pool: TexturePool::new(),
            vertex_pool,
            index_cache: PathIndexBufferCache::new(),
            issues: Vec::new(),
            mask_fallback_count: 0,
            #[cfg(feature = "perf-metrics")]
            metrics: FrameMetrics::default(),
        }
    }

    pub fn path_registry_mut(&mut self) -> &mut PathRegistry {
        &mut self.path_registry
    }

    pub fn path_registry(&self) -> &PathRegistry {
        &self.path_registry
    }

    /// The device backing this renderer, for hosts that need to build or
    /// upload textures to satisfy a `TextureProvider`.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Clears the per-frame path-sample memo, this frame's issue log, and
    /// rotates the vertex upload ring. Call once before `execute`.
    pub fn begin_frame(&mut self) {
        self.path_cache.begin_frame();
        self.issues.clear();
        self.vertex_pool.begin_frame();
        self.index_cache.sync_generation(self.path_registry.generation_id());
        #[cfg(feature = "perf-metrics")]
        {
            self.metrics = FrameMetrics::default();
        }
    }

    /// Equivalent to [`Self::execute`] with no per-call asset-size
    /// overrides; the common case for hosts whose `TextureProvider` already
    /// tracks native sizes (or whose images are always drawn 1:1 with the
    /// current local unit square).
    pub fn execute(
        &mut self,
        commands: &[Command],
        target: &RenderTarget,
        textures: &dyn TextureProvider,
        encoder: &mut wgpu::CommandEncoder,
    ) -> RenderResult<()> {
        self.execute_with_asset_sizes(commands, target, textures, None, encoder)
    }

    /// Runs one frame's command stream, overriding each `DrawImage`'s quad
    /// size with the corresponding entry of `asset_size_overrides` when
    /// present (spec.md §6 "optional asset-size overrides"), falling back
    /// to `textures.native_size` and finally to the full local unit square
    /// when neither is available.
    pub fn execute_with_asset_sizes(
        &mut self,
        commands: &[Command],
        target: &RenderTarget,
        textures: &dyn TextureProvider,
        asset_size_overrides: Option<&AHashMap<String, (u32, u32)>>,
        encoder: &mut wgpu::CommandEncoder,
    ) -> RenderResult<()> {
        #[cfg(feature = "perf-metrics")]
        let validation_timer = metrics::PhaseTimer::start();
        let errors = crate::validate::validate(commands);
        #[cfg(feature = "perf-metrics")]
        validation_timer.stop_into(&mut self.metrics.phase_timings.validation);
        if !errors.is_empty() {
            if cfg!(debug_assertions) {
                let first = &errors[0];
                let window = if self.options.enable_diagnostics {
                    crate::validate::diagnostic_window(commands, first.command_index, 5)
                } else {
                    Vec::new()
                };
                panic!(
                    "command stream failed structural validation at index {}: {} (context: {:?})",
                    first.command_index, first.message, window
                );
            }
            for error in &errors {
                self.issues.push(RenderIssue {
                    command_index: error.command_index,
                    kind: crate::error::RenderIssueKind::ValidationError(error.message.clone()),
                });
            }
        }

        let mut state = executor::ExecutionState::new(
            target.anim_to_viewport(),
            target.viewport_to_ndc(),
            target.viewport_width,
            target.viewport_height,
        );

        let mut ctx = RenderContext {
            device: &self.device,
            queue: &self.queue,
            pipelines: &self.pipelines,
            path_registry: &self.path_registry,
            path_cache: &mut self.path_cache,
            shape_cache: &mut self.shape_cache,
            texture_pool: &mut self.texture_pool,
            vertex_pool: &mut self.vertex_pool,
            index_cache: &mut self.index_cache,
            issues: &mut self.issues,
            mask_fallback_count: &mut self.mask_fallback_count,
            options: &self.options,
            asset_size_overrides,
            #[cfg(feature = "perf-metrics")]
            metrics: &mut self.metrics,
        };

        let result = executor::run(&mut ctx, &mut state, commands, textures, target, encoder);

        #[cfg(feature = "perf-metrics")]
        {
            let (memo_hits, lru_hits, misses) = self.path_cache.take_hit_counts();
            self.metrics.cache_hits.path_sample_memo_hits = memo_hits;
            self.metrics.cache_hits.path_sample_lru_hits = lru_hits;
            self.metrics.cache_hits.path_sample_misses = misses;
            let (shape_hits, shape_misses) = self.shape_cache.take_hit_counts();
            self.metrics.cache_hits.shape_cache_hits = shape_hits;
            self.metrics.cache_hits.shape_cache_misses = shape_misses;
        }

        result
    }

    pub fn issues(&self) -> &[RenderIssue] {
        &self.issues
    }

    pub fn take_issues(&mut self) -> Vec<RenderIssue> {
        std::mem::take(&mut self.issues)
    }

    pub fn mask_fallback_count(&self) -> u64 {
        self.mask_fallback_count
    }

    #[cfg(feature = "perf-metrics")]
    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_to_ndc_maps_corners() {
        let m = viewport_to_ndc_matrix(200, 100);
        let top_left = m.apply_point(crate::geom::Vec2::new(0.0, 0.0));
        let bottom_right = m.apply_point(crate::geom::Vec2::new(200.0, 100.0));
        assert!((top_left.x + 1.0).abs() < 1e-5);
        assert!((top_left.y - 1.0).abs() < 1e-5);
        assert!((bottom_right.x - 1.0).abs() < 1e-5);
        assert!((bottom_right.y + 1.0).abs() < 1e-5);
    }

}
