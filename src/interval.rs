//! Arithmetic on 1-D and circular (mod-24h) intervals.
//!
//! Every LST computation elsewhere in the crate (visibility windows, mean
//! LST tie-breaks, `allocateJDs`) routes through here so wrap-at-24 logic
//! lives in exactly one place.

use serde::{Deserialize, Serialize};

/// A closed interval `[lo, hi]`. When `wrap` is `Some(24.0)` (LST) and
/// `lo > hi`, the interval is interpreted as `[lo, wrap] ∪ [0, hi]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn len(&self) -> f64 {
        (self.hi - self.lo).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.hi <= self.lo
    }

    fn wraps(&self, wrap_at: Option<f64>) -> bool {
        matches!(wrap_at, Some(_)) && self.lo > self.hi
    }

    /// Decompose a (possibly wrapping) interval into one or two ordinary,
    /// non-wrapping sub-intervals.
    fn unwrap_parts(&self, wrap_at: Option<f64>) -> Vec<Interval> {
        if self.wraps(wrap_at) {
            let w = wrap_at.unwrap();
            vec![Interval::new(self.lo, w), Interval::new(0.0, self.hi)]
        } else {
            vec![*self]
        }
    }
}

/// Intersection of two (possibly wrapping) intervals. Returns `None` if
/// disjoint or the intersection is degenerate-empty.
pub fn intersection(a: Interval, b: Interval, wrap_at: Option<f64>) -> Option<Interval> {
    let mut best: Option<Interval> = None;
    for pa in a.unwrap_parts(wrap_at) {
        for pb in b.unwrap_parts(wrap_at) {
            let lo = pa.lo.max(pb.lo);
            let hi = pa.hi.min(pb.hi);
            if hi >= lo {
                let cand = Interval::new(lo, hi);
                best = Some(match best {
                    Some(cur) if cur.len() >= cand.len() => cur,
                    _ => cand,
                });
            }
        }
    }
    best
}

/// Whether `point` lies within `interval`, respecting wrap.
pub fn contains(point: f64, interval: Interval, wrap_at: Option<f64>) -> bool {
    interval
        .unwrap_parts(wrap_at)
        .iter()
        .any(|p| point >= p.lo && point <= p.hi)
}

/// Subtract `cutout` from `base`, returning up to two remaining sub-intervals.
pub fn remove(base: Interval, cutout: Interval, wrap_at: Option<f64>) -> Vec<Interval> {
    let mut remaining = base.unwrap_parts(wrap_at);
    for cut_part in cutout.unwrap_parts(wrap_at) {
        let mut next = Vec::new();
        for r in remaining {
            if cut_part.hi <= r.lo || cut_part.lo >= r.hi {
                // no overlap
                next.push(r);
                continue;
            }
            if cut_part.lo > r.lo {
                next.push(Interval::new(r.lo, cut_part.lo.min(r.hi)));
            }
            if cut_part.hi < r.hi {
                next.push(Interval::new(cut_part.hi.max(r.lo), r.hi));
            }
        }
        remaining = next.into_iter().filter(|i| !i.is_empty()).collect();
    }
    remaining
}

/// Midpoint of `interval`, respecting wrap (e.g. mean of `[23, 1]` mod 24 is `0`).
pub fn mean(interval: Interval, wrap_at: Option<f64>) -> f64 {
    if interval.wraps(wrap_at) {
        let w = wrap_at.unwrap();
        let span = (w - interval.lo) + interval.hi;
        let mid = interval.lo + span / 2.0;
        if mid >= w {
            mid - w
        } else {
            mid
        }
    } else {
        (interval.lo + interval.hi) / 2.0
    }
}
