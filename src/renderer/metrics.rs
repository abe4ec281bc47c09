//! Debug-only per-frame metrics: command tallies, cache hit rates, and
//! phase timings. Gated end-to-end by the `perf-metrics` feature so every
//! counter operation vanishes at zero cost when the feature is off — there
//! is no runtime flag, only the `cfg`.
//!
//! Grounded on the teacher's own `renderer/metrics.rs`, which accumulates
//! an `Instant`-driven `RenderLoopMetricsTracker` across a running
//! presentation loop; here the accumulation boundary is
//! `Renderer::begin_frame` rather than a continuous loop, since this crate
//! renders one command stream per call instead of owning its own
//! presentation loop.

use crate::command::Command;
use std::time::{Duration, Instant};

/// How many times each command kind was dispatched this frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandTallies {
    pub begin_group: u64,
    pub push_transform: u64,
    pub push_clip_rect: u64,
    pub draw_image: u64,
    pub draw_shape: u64,
    pub draw_stroke: u64,
    pub begin_mask: u64,
    pub begin_matte: u64,
}

impl CommandTallies {
    pub fn record(&mut self, command: &Command) {
        match command {
            Command::BeginGroup(_) => self.begin_group += 1,
            Command::PushTransform(_) => self.push_transform += 1,
            Command::PushClipRect(_) => self.push_clip_rect += 1,
            Command::DrawImage { .. } => self.draw_image += 1,
            Command::DrawShape { .. } => self.draw_shape += 1,
            Command::DrawStroke { .. } => self.draw_stroke += 1,
            Command::BeginMask { .. } => self.begin_mask += 1,
            Command::BeginMatte(_) => self.begin_matte += 1,
            Command::EndGroup
            | Command::PopTransform
            | Command::PopClipRect
            | Command::EndMask
            | Command::EndMatte => {}
        }
    }

    pub fn total(&self) -> u64 {
        self.begin_group
            + self.push_transform
            + self.push_clip_rect
            + self.draw_image
            + self.draw_shape
            + self.draw_stroke
            + self.begin_mask
            + self.begin_matte
    }
}

/// Cache hit/miss counts pulled from the path-sample and shape-raster
/// caches at the end of a frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheHitRates {
    pub path_sample_memo_hits: u64,
    pub path_sample_lru_hits: u64,
    pub path_sample_misses: u64,
    pub shape_cache_hits: u64,
    pub shape_cache_misses: u64,
}

impl CacheHitRates {
    /// Fraction of path-sample lookups this frame that avoided calling the
    /// sampler producer, counting either level of the two-level cache as a
    /// hit.
    pub fn path_sample_hit_rate(&self) -> f64 {
        let hits = (self.path_sample_memo_hits + self.path_sample_lru_hits) as f64;
        let total = hits + self.path_sample_misses as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    pub fn shape_cache_hit_rate(&self) -> f64 {
        let total = (self.shape_cache_hits + self.shape_cache_misses) as f64;
        if total == 0.0 {
            0.0
        } else {
            self.shape_cache_hits as f64 / total
        }
    }
}

/// Wall-clock duration of each named phase of one `execute` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimings {
    pub validation: Duration,
    pub linear_segments: Duration,
    pub mask_scopes: Duration,
    pub matte_scopes: Duration,
}

impl PhaseTimings {
    pub fn total(&self) -> Duration {
        self.validation + self.linear_segments + self.mask_scopes + self.matte_scopes
    }
}

/// A running timer for one phase; `stop_into` consumes it and adds the
/// elapsed time to the target accumulator.
pub struct PhaseTimer {
    start: Instant,
}

impl PhaseTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn stop_into(self, accumulator: &mut Duration) {
        *accumulator += self.start.elapsed();
    }
}

/// Everything collected for one `Renderer::execute` call. Reset to
/// default at every `begin_frame`.
#[derive(Debug, Clone, Default)]
pub struct FrameMetrics {
    pub commands: CommandTallies,
    pub cache_hits: CacheHitRates,
    pub phase_timings: PhaseTimings,
    /// Delta of `Renderer::mask_fallback_count` for this frame, so a host
    /// doesn't have to diff the cumulative counter itself.
    pub mask_fallbacks_this_frame: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{MaskMode, PathId};
    use crate::geom::Matrix2D;

    #[test]
    fn tallies_count_each_kind_independently() {
        let mut tallies = CommandTallies::default();
        tallies.record(&Command::BeginGroup("root".into()));
        tallies.record(&Command::PushTransform(Matrix2D::IDENTITY));
        tallies.record(&Command::DrawImage {
            asset_key: "wallpaper".into(),
            opacity: 1.0,
        });
        tallies.record(&Command::BeginMask {
            mode: MaskMode::Add,
            inverted: false,
            path: PathId(0),
            opacity: 1.0,
            frame: 0.0,
        });
        assert_eq!(tallies.begin_group, 1);
        assert_eq!(tallies.push_transform, 1);
        assert_eq!(tallies.draw_image, 1);
        assert_eq!(tallies.begin_mask, 1);
        assert_eq!(tallies.total(), 4);
    }

    #[test]
    fn end_commands_are_not_tallied() {
        let mut tallies = CommandTallies::default();
        tallies.record(&Command::EndGroup);
        tallies.record(&Command::PopTransform);
        tallies.record(&Command::EndMask);
        assert_eq!(tallies.total(), 0);
    }

    #[test]
    fn hit_rate_is_zero_with_no_lookups() {
        let rates = CacheHitRates::default();
        assert_eq!(rates.path_sample_hit_rate(), 0.0);
        assert_eq!(rates.shape_cache_hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_reflects_recorded_hits_and_misses() {
        let rates = CacheHitRates {
            path_sample_memo_hits: 3,
            path_sample_lru_hits: 1,
            path_sample_misses: 1,
            shape_cache_hits: 4,
            shape_cache_misses: 4,
        };
        assert!((rates.path_sample_hit_rate() - 0.8).abs() < 1e-9);
        assert!((rates.shape_cache_hit_rate() - 0.5).abs() < 1e-9);
    }
}
