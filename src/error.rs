//! Error and non-fatal issue types produced by the renderer.

use crate::command::PathId;
use std::fmt;

/// A bubbled, fatal-to-the-caller failure.
///
/// Mirrors the error kinds a command stream can provoke: a missing asset, a
/// GPU resource that failed to allocate, or a runtime structural violation
/// the executor detects that the validator did not (or was elided for, in
/// release builds).
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no texture registered for asset key {0:?}")]
    MissingTextureForAsset(String),

    #[error("failed to create command buffer")]
    FailedToCreateCommandBuffer,

    #[error("failed to create pipeline: {0}")]
    FailedToCreatePipeline(String),

    #[error("invalid command stack: {0}")]
    InvalidCommandStack(String),

    #[error("command references unknown path {0:?}")]
    MissingPathResource(PathId),
}

/// A recoverable, per-frame problem. Recorded rather than bubbled; the host
/// decides whether to surface it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderIssue {
    pub command_index: usize,
    pub kind: RenderIssueKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderIssueKind {
    /// A transform whose inverse was required for scope balance had a
    /// determinant near zero; the dependent feature was skipped.
    InputClipNonInvertible,
    /// A mask group's bounding box degenerated to empty; the inner region
    /// was rendered unmasked instead.
    DegenerateMaskBbox,
    /// The structural validator found a problem; fatal in debug builds,
    /// recorded here and best-effort-continued in release.
    ValidationError(String),
    /// A primitive failed to rasterize or allocate a GPU resource and was
    /// skipped for this frame.
    SkippedPrimitive(String),
    /// A mask scope nested deeper than `MAX_SCOPE_DEPTH` levels; rendered
    /// unmasked instead of recursing further.
    MaxNestingDepthExceeded,
}

impl fmt::Display for RenderIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderIssueKind::InputClipNonInvertible => {
                write!(f, "clip transform was not invertible")
            }
            RenderIssueKind::DegenerateMaskBbox => write!(f, "mask bbox degenerated to empty"),
            RenderIssueKind::ValidationError(msg) => write!(f, "validation error: {msg}"),
            RenderIssueKind::SkippedPrimitive(msg) => write!(f, "primitive skipped: {msg}"),
            RenderIssueKind::MaxNestingDepthExceeded => {
                write!(f, "mask/matte scope nesting exceeded the maximum depth")
            }
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
