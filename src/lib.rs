//! # animcore
//!
//! A GPU-accelerated render-command engine for keyframed vector animation,
//! built on [`wgpu`](https://crates.io/crates/wgpu). A host compiles an
//! animation (shapes, images, masks, track mattes) into a flat [`Command`]
//! stream once per frame and hands it to a [`Renderer`], which validates its
//! structural nesting, walks it linearly, and segments out mask/matte scopes
//! to their own offscreen passes.
//!
//! ## Getting started
//!
//! ```toml
//! [dependencies]
//! animcore = "0.1"
//! ```
//!
//! A host owns the `wgpu::Device`/`Queue`, a `PathRegistry` describing the
//! animation's shapes, and a `TextureProvider` mapping asset keys to image
//! textures. Each frame:
//!
//! ```rust,no_run
//! use animcore::{AssetTextureTable, Command, RenderTarget, Renderer, RendererOptions};
//!
//! fn render_one_frame(
//!     device: wgpu::Device,
//!     queue: wgpu::Queue,
//!     view: &wgpu::TextureView,
//!     encoder: &mut wgpu::CommandEncoder,
//! ) {
//!     let mut renderer = Renderer::new(device, queue, RendererOptions::default());
//!     let textures = AssetTextureTable::new();
//!     let commands: Vec<Command> = Vec::new();
//!
//!     renderer.begin_frame();
//!     let target = RenderTarget::new(view, (1920, 1080), (1920.0, 1080.0));
//!     renderer.execute(&commands, &target, &textures, encoder).unwrap();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: the command IR executed each frame.
//! - [`validate`]: structural validator proving per-scope stack balance.
//! - [`renderer`]: the executor, mask group engine, and track-matte engine.
//! - [`path`] / [`path_cache`]: per-path keyframe storage and sampling cache.
//! - [`shape_cache`] / [`raster`] / [`triangulate`]: fill/stroke
//!   rasterization and its cache.
//! - [`gpu`]: the texture pool, vertex upload ring, and index buffer cache.
//! - [`geom`]: the affine matrix and rectangle types used throughout.
//! - [`color`]: a straight-alpha color newtype and premultiplication helpers.
//! - [`error`]: the error and non-fatal issue types `Renderer` produces.

pub use ahash;
pub use lyon;
pub use wgpu;

pub mod color;
pub mod command;
pub mod error;
pub mod geom;
pub mod gpu;
pub mod path;
pub mod path_cache;
pub mod raster;
mod renderer;
pub mod shape_cache;
pub mod triangulate;
pub mod validate;
pub mod vertex;

pub use color::Color;
pub use command::{Command, Frame, LineCap, LineJoin, MaskMode, MatteMode, PathId};
pub use error::{RenderError, RenderIssue, RenderIssueKind, RenderResult};
pub use path::{BezierPath, Easing, Keyframe, PathRegistry, PathResource};
pub use path_cache::PathSamplingCache;
pub use renderer::{
    AssetTextureTable, MutableTextureProvider, RenderTarget, Renderer, RendererOptions,
    TextureProvider, COLOR_FORMAT,
};
#[cfg(feature = "perf-metrics")]
pub use renderer::FrameMetrics;
pub use shape_cache::{CachedRaster, ShapeRasterCache};
pub use validate::{validate, ValidationError};
