//! Trial and epoch statistics.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::ops::Range;

use crate::engine::{LayerId, NetworkEngine, UnitChannel};
use crate::error::EngineError;
use crate::memory::{MemoryScore, Rate, ScorerConfig};

/// Units whose error is within this tolerance do not count towards SSE.
pub const SSE_TOLERANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrialStats {
    pub sse: f64,
    /// SSE per unit.
    pub avg_sse: f64,
    /// SSE restricted to the scorer's pool B.
    pub sse_pool_b: f64,
    pub avg_sse_pool_b: f64,
    /// SSE restricted to the scorer's pool C.
    pub sse_pool_c: f64,
    pub avg_sse_pool_c: f64,
    pub cos_sim: f64,
    pub memory: Option<MemoryScore>,
}

impl TrialStats {
    /// Output-layer error of the minus phase against the target, over the
    /// whole layer and over the pool ranges of `pools`.
    pub fn from_output(
        engine: &dyn NetworkEngine,
        output: LayerId,
        pools: &ScorerConfig,
        memory: Option<MemoryScore>,
    ) -> Result<Self, EngineError> {
        let (mut act, mut targ) = (Vec::new(), Vec::new());
        engine.unit_values(output, UnitChannel::ActM, &mut act)?;
        engine.unit_values(output, UnitChannel::Targ, &mut targ)?;
        let (sse, avg_sse) = sse_over(&act, &targ, 0..act.len());
        let (sse_pool_b, avg_sse_pool_b) = sse_over(&act, &targ, pools.pool_b.clone());
        let (sse_pool_c, avg_sse_pool_c) = sse_over(&act, &targ, pools.pool_c.clone());
        Ok(Self {
            sse,
            avg_sse,
            sse_pool_b,
            avg_sse_pool_b,
            sse_pool_c,
            avg_sse_pool_c,
            cos_sim: cosine(&act, &targ),
            memory,
        })
    }

    pub fn is_error(&self) -> bool {
        self.sse > 0.0
    }
}

/// Sum of squared errors over units with `|targ - act| > tol`.
pub fn sse(act: &[f32], targ: &[f32], tol: f32) -> f64 {
    act.iter()
        .zip(targ)
        .map(|(&a, &t)| f64::from(t - a))
        .filter(|d| d.abs() > f64::from(tol))
        .fold(0.0, |acc, d| acc + d * d)
}

/// SSE and per-unit SSE over `units`, clipped to the layer.
fn sse_over(act: &[f32], targ: &[f32], units: Range<usize>) -> (f64, f64) {
    let n = act.len().min(targ.len());
    let units = units.start.min(n)..units.end.min(n);
    if units.is_empty() {
        return (0.0, 0.0);
    }
    let len = units.len();
    let sum = sse(&act[units.clone()], &targ[units], SSE_TOLERANCE);
    (sum, sum / len as f64)
}

/// Cosine similarity; zero when either vector is all zeros.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut aa, mut bb) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        aa += x * x;
        bb += y * y;
    }
    if aa == 0.0 || bb == 0.0 {
        0.0
    } else {
        dot / (aa.sqrt() * bb.sqrt())
    }
}

/// Aggregate of one closed epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EpochSummary {
    pub epoch: usize,
    pub trials: usize,
    pub sse: f64,
    pub avg_sse: f64,
    pub sse_pool_b: f64,
    pub avg_sse_pool_b: f64,
    pub sse_pool_c: f64,
    pub avg_sse_pool_c: f64,
    pub cos_sim: f64,
    pub pct_err: f64,
    pub pct_cor: f64,
    /// Fraction of scored trials with `correct` memory.
    pub mem: Rate,
}

/// Running accumulation over the trials of an epoch.
#[derive(Debug, Clone, Default)]
pub struct EpochStats {
    epoch: usize,
    trials: usize,
    sum_sse: f64,
    sum_avg_sse: f64,
    sum_sse_b: f64,
    sum_avg_sse_b: f64,
    sum_sse_c: f64,
    sum_avg_sse_c: f64,
    sum_cos: f64,
    errors: usize,
    mem_correct: usize,
    mem_scored: usize,
    /// First epoch that closed with no errors.
    pub first_zero: Option<usize>,
    pub history: Vec<EpochSummary>,
}

impl EpochStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    pub fn record_trial(&mut self, t: &TrialStats) {
        self.trials += 1;
        self.sum_sse += t.sse;
        self.sum_avg_sse += t.avg_sse;
        self.sum_sse_b += t.sse_pool_b;
        self.sum_avg_sse_b += t.avg_sse_pool_b;
        self.sum_sse_c += t.sse_pool_c;
        self.sum_avg_sse_c += t.avg_sse_pool_c;
        self.sum_cos += t.cos_sim;
        if t.is_error() {
            self.errors += 1;
        }
        if let Some(m) = t.memory {
            self.mem_scored += 1;
            if m.correct {
                self.mem_correct += 1;
            }
        }
    }

    /// Summary of the trials so far, without closing the epoch.
    pub fn summary(&self) -> EpochSummary {
        let n = self.trials.max(1) as f64;
        let pct_err = self.errors as f64 / n;
        EpochSummary {
            epoch: self.epoch,
            trials: self.trials,
            sse: self.sum_sse,
            avg_sse: self.sum_avg_sse / n,
            sse_pool_b: self.sum_sse_b,
            avg_sse_pool_b: self.sum_avg_sse_b / n,
            sse_pool_c: self.sum_sse_c,
            avg_sse_pool_c: self.sum_avg_sse_c / n,
            cos_sim: self.sum_cos / n,
            pct_err,
            pct_cor: 1.0 - pct_err,
            mem: Rate::of(self.mem_correct, self.mem_scored),
        }
    }

    /// Close the current epoch, reset the accumulators and return its summary.
    pub fn close_epoch(&mut self) -> EpochSummary {
        let s = self.summary();
        if self.first_zero.is_none() && self.trials > 0 && self.errors == 0 {
            self.first_zero = Some(self.epoch);
        }
        self.history.push(s);
        *self = Self {
            epoch: self.epoch + 1,
            first_zero: self.first_zero,
            history: std::mem::take(&mut self.history),
            ..Self::default()
        };
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_ignores_errors_within_tolerance() {
        let act = [0.9, 0.4, 0.0, 1.0];
        let targ = [1.0, 1.0, 0.0, 0.0];
        let expected = 0.6f32 * 0.6 + 1.0;
        assert!((sse(&act, &targ, 0.5) - f64::from(expected)).abs() < 1e-6);
    }

    #[test]
    fn sse_within_tolerance_is_positive_zero() {
        let s = sse(&[0.9, 0.1], &[1.0, 0.0], 0.5);
        assert_eq!(s, 0.0);
        assert!(s.is_sign_positive());
    }

    #[test]
    fn pool_sse_counts_only_its_range() {
        // pool size 4: B covers units 7..12, C covers 11..16
        let pools = ScorerConfig::for_pool_size(4);
        let targ = vec![0.0f32; 24];
        let mut act = targ.clone();
        act[8] = 1.0;

        let (b, avg_b) = sse_over(&act, &targ, pools.pool_b.clone());
        let (c, avg_c) = sse_over(&act, &targ, pools.pool_c.clone());
        let (all, _) = sse_over(&act, &targ, 0..24);
        assert_eq!(b, 1.0);
        assert!((avg_b - 1.0 / 5.0).abs() < 1e-12);
        assert_eq!((c, avg_c), (0.0, 0.0));
        assert_eq!(all, 1.0);

        assert_eq!(sse_over(&act, &targ, 30..40), (0.0, 0.0));
    }

    #[test]
    fn cosine_bounds() {
        assert!((cosine(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-12);
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    fn trial(sse: f64, mem: Option<bool>) -> TrialStats {
        TrialStats {
            sse,
            avg_sse: sse / 4.0,
            sse_pool_b: sse,
            avg_sse_pool_b: sse / 2.0,
            cos_sim: 0.5,
            memory: mem.map(|correct| MemoryScore {
                correct,
                miss_all: Rate::Value(0.0),
                miss_completion: Rate::NotApplicable,
                false_alarm: Rate::Value(0.0),
                miss_pool_b: Rate::NotApplicable,
                miss_pool_c: Rate::NotApplicable,
                false_alarm_pool_b: Rate::NotApplicable,
                false_alarm_pool_c: Rate::NotApplicable,
                governing_miss: Rate::Value(0.0),
            }),
            ..TrialStats::default()
        }
    }

    #[test]
    fn epoch_summary_and_first_zero() {
        let mut s = EpochStats::new();
        s.record_trial(&trial(1.0, Some(true)));
        s.record_trial(&trial(0.0, Some(false)));
        let e0 = s.close_epoch();
        assert_eq!(e0.epoch, 0);
        assert_eq!(e0.trials, 2);
        assert_eq!(e0.pct_err, 0.5);
        assert_eq!(e0.mem, Rate::Value(0.5));
        assert_eq!(e0.sse_pool_b, 1.0);
        assert_eq!(e0.avg_sse_pool_b, 0.25);
        assert_eq!(e0.sse_pool_c, 0.0);
        assert_eq!(s.first_zero, None);

        s.record_trial(&trial(0.0, None));
        let e1 = s.close_epoch();
        assert_eq!(e1.pct_cor, 1.0);
        assert_eq!(e1.mem, Rate::NotApplicable);
        assert_eq!(s.first_zero, Some(1));
        assert_eq!(s.history.len(), 2);
        assert_eq!(s.epoch(), 2);
        assert_eq!(s.trials(), 0);
    }

    #[test]
    fn empty_epoch_does_not_count_as_zero_error() {
        let mut s = EpochStats::new();
        s.close_epoch();
        assert_eq!(s.first_zero, None);
    }
}
