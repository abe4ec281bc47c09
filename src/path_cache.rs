//! Two-level path-sample cache: a per-frame memo cleared every
//! `begin_frame`, backed by a persistent bounded LRU.

use crate::command::PathId;
use crate::geom::quantize;
use crate::path::BezierPath;
use ahash::AHashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::rc::Rc;

pub const DEFAULT_LRU_CAPACITY: usize = 1024;
pub const DEFAULT_FRAME_QUANT_STEP: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SampleKey {
    generation_id: u64,
    path_id: PathId,
    quantized_frame: i64,
}

pub struct PathSamplingCache {
    memo: AHashMap<SampleKey, Option<Rc<BezierPath>>>,
    lru: LruCache<SampleKey, Rc<BezierPath>>,
    frame_quant_step: f32,
    #[cfg(feature = "perf-metrics")]
    memo_hits: u64,
    #[cfg(feature = "perf-metrics")]
    lru_hits: u64,
    #[cfg(feature = "perf-metrics")]
    misses: u64,
}

impl PathSamplingCache {
    pub fn new(capacity: usize, frame_quant_step: f32) -> Self {
        Self {
            memo: AHashMap::default(),
            lru: LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            ),
            frame_quant_step,
            #[cfg(feature = "perf-metrics")]
            memo_hits: 0,
            #[cfg(feature = "perf-metrics")]
            lru_hits: 0,
            #[cfg(feature = "perf-metrics")]
            misses: 0,
        }
    }

    /// Clears the per-frame memo. The LRU persists across frames.
    pub fn begin_frame(&mut self) {
        self.memo.clear();
    }

    /// Drains this frame's hit/miss counts for `FrameMetrics`, resetting
    /// them to zero.
    #[cfg(feature = "perf-metrics")]
    pub fn take_hit_counts(&mut self) -> (u64, u64, u64) {
        (
            std::mem::take(&mut self.memo_hits),
            std::mem::take(&mut self.lru_hits),
            std::mem::take(&mut self.misses),
        )
    }

    /// Looks up `(generation_id, path_id, frame)`, calling `producer` only
    /// on a miss. A `producer` that returns `None` is remembered for the
    /// rest of this frame (so repeated lookups of an empty path in one
    /// frame do not re-invoke it) but is never written into the LRU.
    pub fn sample(
        &mut self,
        generation_id: u64,
        path_id: PathId,
        frame: f32,
        producer: impl FnOnce() -> Option<BezierPath>,
    ) -> Option<Rc<BezierPath>> {
        let key = SampleKey {
            generation_id,
            path_id,
            quantized_frame: quantize(frame, self.frame_quant_step),
        };

        if let Some(memoized) = self.memo.get(&key) {
            #[cfg(feature = "perf-metrics")]
            {
                self.memo_hits += 1;
            }
            return memoized.clone();
        }

        if let Some(hit) = self.lru.get(&key) {
            #[cfg(feature = "perf-metrics")]
            {
                self.lru_hits += 1;
            }
            let value = hit.clone();
            self.memo.insert(key, Some(value.clone()));
            return Some(value);
        }

        #[cfg(feature = "perf-metrics")]
        {
            self.misses += 1;
        }
        match producer() {
            None => {
                self.memo.insert(key, None);
                None
            }
            Some(path) => {
                let rc = Rc::new(path);
                self.lru.put(key, rc.clone());
                self.memo.insert(key, Some(rc.clone()));
                Some(rc)
            }
        }
    }

    pub fn lru_len(&self) -> usize {
        self.lru.len()
    }
}

impl Default for PathSamplingCache {
    fn default() -> Self {
        Self::new(DEFAULT_LRU_CAPACITY, DEFAULT_FRAME_QUANT_STEP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Vec2;

    fn path_at(x: f32) -> BezierPath {
        BezierPath::from_positions(&[Vec2::new(x, 0.0)], true)
    }

    #[test]
    fn miss_then_hit_avoids_calling_producer_again() {
        let mut cache = PathSamplingCache::new(8, 1.0);
        let mut calls = 0;
        let first = cache.sample(1, PathId(0), 0.0, || {
            calls += 1;
            Some(path_at(1.0))
        });
        assert!(first.is_some());
        let second = cache.sample(1, PathId(0), 0.0, || {
            calls += 1;
            Some(path_at(99.0))
        });
        assert_eq!(calls, 1);
        assert_eq!(first, second);
    }

    #[test]
    fn different_generation_misses_even_with_same_path_and_frame() {
        let mut cache = PathSamplingCache::new(8, 1.0);
        cache.sample(1, PathId(0), 0.0, || Some(path_at(1.0)));
        let mut calls = 0;
        cache.sample(2, PathId(0), 0.0, || {
            calls += 1;
            Some(path_at(2.0))
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn begin_frame_clears_memo_but_not_lru() {
        let mut cache = PathSamplingCache::new(8, 1.0);
        cache.sample(1, PathId(0), 0.0, || Some(path_at(1.0)));
        assert_eq!(cache.lru_len(), 1);
        cache.begin_frame();
        assert!(cache.memo.is_empty());
        let mut calls = 0;
        // Still a hit because the LRU persisted, so the producer must not
        // run.
        cache.sample(1, PathId(0), 0.0, || {
            calls += 1;
            Some(path_at(42.0))
        });
        assert_eq!(calls, 0);
    }

    #[test]
    fn lru_evicts_least_recently_used_beyond_capacity() {
        let mut cache = PathSamplingCache::new(2, 1.0);
        cache.sample(1, PathId(0), 0.0, || Some(path_at(0.0)));
        cache.sample(1, PathId(1), 0.0, || Some(path_at(1.0)));
        cache.sample(1, PathId(2), 0.0, || Some(path_at(2.0)));
        assert_eq!(cache.lru_len(), 2);
    }

    #[test]
    fn nil_producer_result_is_not_cached_in_lru() {
        let mut cache = PathSamplingCache::new(8, 1.0);
        let result = cache.sample(1, PathId(0), 0.0, || None);
        assert!(result.is_none());
        assert_eq!(cache.lru_len(), 0);
    }
}
