//! The command IR: a closed, tagged-variant enumeration executed linearly
//! against a target for one frame.
//!
//! Fill and stroke colors are plain straight-alpha `[u8; 4]` rather than
//! `crate::color::Color` so the executor's cache-key hashing and
//! premultiplication can work on the raw bytes directly; build the array
//! from a `Color` with `color.to_array()` or `color.into()`.

use crate::geom::{Matrix2D, Rect};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathId(pub u64);

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskMode {
    Add,
    Subtract,
    Intersect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatteMode {
    Alpha,
    AlphaInverted,
    Luma,
    LumaInverted,
}

impl MatteMode {
    pub fn is_inverted(&self) -> bool {
        matches!(self, MatteMode::AlphaInverted | MatteMode::LumaInverted)
    }

    pub fn is_luma(&self) -> bool {
        matches!(self, MatteMode::Luma | MatteMode::LumaInverted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineCap {
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineJoin {
    Miter,
    Round,
    Bevel,
}

/// A frame value, in whatever units the path registry's keyframes use.
/// Stored as a fixed-point to keep it `Eq + Hash` for cache keys; see
/// `crate::geom::quantize` for the conversion.
pub type Frame = f32;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginGroup(String),
    EndGroup,

    PushTransform(Matrix2D),
    PopTransform,

    PushClipRect(Rect),
    PopClipRect,

    DrawImage {
        asset_key: String,
        opacity: f32,
    },

    DrawShape {
        path: PathId,
        fill_color: Option<[u8; 4]>,
        fill_opacity: f32,
        layer_opacity: f32,
        frame: Frame,
    },

    DrawStroke {
        path: PathId,
        stroke_color: [u8; 4],
        stroke_opacity: f32,
        stroke_width: f32,
        line_cap: LineCap,
        line_join: LineJoin,
        miter_limit: f32,
        layer_opacity: f32,
        frame: Frame,
    },

    BeginMask {
        mode: MaskMode,
        inverted: bool,
        path: PathId,
        opacity: f32,
        frame: Frame,
    },
    EndMask,

    BeginMatte(MatteMode),
    EndMatte,
}

impl Command {
    /// Name used in validator diagnostics; never a full `Debug` dump.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Command::BeginGroup(_) => "BeginGroup",
            Command::EndGroup => "EndGroup",
            Command::PushTransform(_) => "PushTransform",
            Command::PopTransform => "PopTransform",
            Command::PushClipRect(_) => "PushClipRect",
            Command::PopClipRect => "PopClipRect",
            Command::DrawImage { .. } => "DrawImage",
            Command::DrawShape { .. } => "DrawShape",
            Command::DrawStroke { .. } => "DrawStroke",
            Command::BeginMask { .. } => "BeginMask",
            Command::EndMask => "EndMask",
            Command::BeginMatte(_) => "BeginMatte",
            Command::EndMatte => "EndMatte",
        }
    }
}
