//! Memory-completion scoring.
//!
//! After the minus phase the recalled output is compared against the full
//! pattern held by the input echo region. Units are partitioned into
//! TargetOn / TargetOff, and TargetOn further into Cued (present in the
//! quarter-0 cue) and Completion (had to be recalled).

use std::fmt;
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::{NetworkEngine, UnitChannel};
use crate::error::{ConfigError, EngineError};
use crate::gating::{Circuit, Region};

/// A ratio over a unit partition. An empty partition has no rate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Rate {
    Value(f64),
    NotApplicable,
}

impl Rate {
    pub fn of(count: usize, total: usize) -> Self {
        if total == 0 {
            Rate::NotApplicable
        } else {
            Rate::Value(count as f64 / total as f64)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Rate::Value(v) => Some(v),
            Rate::NotApplicable => None,
        }
    }

    pub fn is_applicable(self) -> bool {
        matches!(self, Rate::Value(_))
    }

    /// Strictly below `threshold`; never true without a value.
    pub fn below(self, threshold: f64) -> bool {
        matches!(self, Rate::Value(v) if v < threshold)
    }

    /// `self`, or `other` when `self` has no value.
    pub fn or(self, other: Rate) -> Rate {
        match self {
            Rate::Value(_) => self,
            Rate::NotApplicable => other,
        }
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rate::Value(v) => write!(f, "{v:.3}"),
            Rate::NotApplicable => f.write_str("n/a"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScorerConfig {
    /// Both governing rates must be strictly below this for a correct recall.
    pub threshold: f64,
    /// Unit values at or above this count as on.
    pub on_threshold: f32,
    /// Clipped to the layer length.
    pub pool_b: Range<usize>,
    pub pool_c: Range<usize>,
    /// Region holding the full pattern (`Targ`) and the cue (`ActQ1`).
    pub echo: Region,
    /// Region whose minus-phase activation is the recall.
    pub recall: Region,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self::for_pool_size(49)
    }
}

impl ScorerConfig {
    /// Pools B and C of a layer with `n`-unit pools. Each range starts one unit
    /// early, so the two overlap by one unit.
    pub fn for_pool_size(n: usize) -> Self {
        Self {
            threshold: 0.34,
            on_threshold: 0.5,
            pool_b: (2 * n).saturating_sub(1)..3 * n,
            pool_c: (3 * n).saturating_sub(1)..4 * n,
            echo: Region::ECin,
            recall: Region::Output,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::Invalid("scorer threshold must be in (0, 1]"));
        }
        if !self.on_threshold.is_finite() {
            return Err(ConfigError::Invalid("on_threshold must be finite"));
        }
        if self.pool_b.start > self.pool_b.end || self.pool_c.start > self.pool_c.end {
            return Err(ConfigError::Invalid("pool ranges must not be reversed"));
        }
        Ok(())
    }
}

/// Result of scoring one trial.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MemoryScore {
    pub correct: bool,
    pub miss_all: Rate,
    pub miss_completion: Rate,
    pub false_alarm: Rate,
    pub miss_pool_b: Rate,
    pub miss_pool_c: Rate,
    pub false_alarm_pool_b: Rate,
    pub false_alarm_pool_c: Rate,
    /// The miss-rate `correct` was decided on.
    pub governing_miss: Rate,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    on: usize,
    miss: usize,
    off: usize,
    false_alarm: usize,
}

impl Tally {
    fn count(&mut self, target_on: bool, recalled_on: bool) {
        if target_on {
            self.on += 1;
            self.miss += usize::from(!recalled_on);
        } else {
            self.off += 1;
            self.false_alarm += usize::from(recalled_on);
        }
    }

    fn miss_rate(&self) -> Rate {
        Rate::of(self.miss, self.on)
    }

    fn false_alarm_rate(&self) -> Rate {
        Rate::of(self.false_alarm, self.off)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryScorer {
    cfg: ScorerConfig,
}

impl MemoryScorer {
    pub fn new(cfg: ScorerConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.cfg
    }

    /// Score a recall against a full pattern and the cue it was given.
    ///
    /// When training the overall miss-rate governs; when testing the
    /// completion miss-rate does, falling back to the overall rate when the cue
    /// already covered the whole pattern.
    pub fn score(
        &self,
        target: &[f32],
        cue: &[f32],
        recalled: &[f32],
        train: bool,
    ) -> Result<MemoryScore, EngineError> {
        for (name, v) in [("cue", cue), ("recalled", recalled)] {
            if v.len() != target.len() {
                return Err(EngineError::ShapeMismatch {
                    layer: name.to_string(),
                    expected: target.len(),
                    got: v.len(),
                });
            }
        }

        let on = self.cfg.on_threshold;
        let n = target.len();
        let clip = |r: &Range<usize>| r.start.min(n)..r.end.min(n);
        let (pool_b, pool_c) = (clip(&self.cfg.pool_b), clip(&self.cfg.pool_c));

        let mut all = Tally::default();
        let mut completion = Tally::default();
        let mut b = Tally::default();
        let mut c = Tally::default();

        for i in 0..n {
            let target_on = target[i] >= on;
            let recalled_on = recalled[i] >= on;
            all.count(target_on, recalled_on);
            if pool_b.contains(&i) {
                b.count(target_on, recalled_on);
            }
            if pool_c.contains(&i) {
                c.count(target_on, recalled_on);
            }
            if target_on && cue[i] < on {
                completion.on += 1;
                completion.miss += usize::from(!recalled_on);
            }
        }

        let miss_all = all.miss_rate();
        let miss_completion = completion.miss_rate();
        let false_alarm = all.false_alarm_rate();
        let governing_miss = if train {
            miss_all
        } else {
            miss_completion.or(miss_all)
        };

        if !governing_miss.is_applicable() || !false_alarm.is_applicable() {
            warn!(
                target_on = all.on,
                target_off = all.off,
                train,
                "degenerate memory partition; trial scored incorrect"
            );
        }

        let threshold = self.cfg.threshold;
        Ok(MemoryScore {
            correct: governing_miss.below(threshold) && false_alarm.below(threshold),
            miss_all,
            miss_completion,
            false_alarm,
            miss_pool_b: b.miss_rate(),
            miss_pool_c: c.miss_rate(),
            false_alarm_pool_b: b.false_alarm_rate(),
            false_alarm_pool_c: c.false_alarm_rate(),
            governing_miss,
        })
    }

    /// Score from the engine: echo `Targ` and `ActQ1`, recall `ActM`.
    pub fn score_engine(
        &self,
        engine: &dyn NetworkEngine,
        circuit: &Circuit,
        train: bool,
    ) -> Result<MemoryScore, EngineError> {
        let echo = circuit.layer(self.cfg.echo);
        let recall = circuit.layer(self.cfg.recall);
        let (mut target, mut cue, mut recalled) = (Vec::new(), Vec::new(), Vec::new());
        engine.unit_values(echo, UnitChannel::Targ, &mut target)?;
        engine.unit_values(echo, UnitChannel::ActQ1, &mut cue)?;
        engine.unit_values(recall, UnitChannel::ActM, &mut recalled)?;
        self.score(&target, &cue, &recalled, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> MemoryScorer {
        MemoryScorer::new(ScorerConfig::for_pool_size(4))
    }

    /// 24 units, every other unit on.
    fn pattern() -> Vec<f32> {
        (0..24).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect()
    }

    /// The first half of the pattern.
    fn half_cue(p: &[f32]) -> Vec<f32> {
        p.iter()
            .enumerate()
            .map(|(i, &v)| if i < p.len() / 2 { v } else { 0.0 })
            .collect()
    }

    #[test]
    fn rates_of_empty_partitions_are_not_applicable() {
        assert_eq!(Rate::of(0, 0), Rate::NotApplicable);
        assert_eq!(Rate::of(1, 4), Rate::Value(0.25));
        assert!(!Rate::NotApplicable.below(1.0));
        assert!(Rate::Value(0.33).below(0.34));
        assert!(!Rate::Value(0.34).below(0.34));
        assert_eq!(Rate::NotApplicable.to_string(), "n/a");
    }

    #[test]
    fn perfect_recall_is_correct_with_zero_rates() {
        let t = pattern();
        for train in [true, false] {
            let s = scorer().score(&t, &half_cue(&t), &t, train).unwrap();
            assert!(s.correct);
            for r in [
                s.miss_all,
                s.miss_completion,
                s.false_alarm,
                s.miss_pool_b,
                s.miss_pool_c,
                s.false_alarm_pool_b,
                s.false_alarm_pool_c,
            ] {
                assert_eq!(r, Rate::Value(0.0));
            }
        }
    }

    #[test]
    fn complement_recall_is_wrong_everywhere() {
        let t = pattern();
        let inv: Vec<f32> = t.iter().map(|v| 1.0 - v).collect();
        let s = scorer().score(&t, &half_cue(&t), &inv, false).unwrap();
        assert!(!s.correct);
        assert_eq!(s.miss_all, Rate::Value(1.0));
        assert_eq!(s.miss_completion, Rate::Value(1.0));
        assert_eq!(s.false_alarm, Rate::Value(1.0));
    }

    #[test]
    fn full_cue_has_no_completion_rate() {
        let t = pattern();
        let s = scorer().score(&t, &t, &t, false).unwrap();
        assert_eq!(s.miss_completion, Rate::NotApplicable);
        // testing falls back to the overall miss-rate
        assert_eq!(s.governing_miss, Rate::Value(0.0));
        assert!(s.correct);
    }

    #[test]
    fn training_governs_on_overall_misses() {
        let t = pattern();
        let cue = half_cue(&t);
        // recall only the cued half: completion fails, overall is 50%
        let s = scorer().score(&t, &cue, &cue, true).unwrap();
        assert_eq!(s.miss_all, Rate::Value(0.5));
        assert_eq!(s.miss_completion, Rate::Value(1.0));
        assert_eq!(s.governing_miss, s.miss_all);
        assert!(!s.correct);
    }

    #[test]
    fn blank_target_is_scored_incorrect() {
        let zeros = vec![0.0; 24];
        let s = scorer().score(&zeros, &zeros, &zeros, true).unwrap();
        assert_eq!(s.miss_all, Rate::NotApplicable);
        assert_eq!(s.false_alarm, Rate::Value(0.0));
        assert!(!s.correct);
    }

    #[test]
    fn false_alarms_alone_break_recall() {
        let t = pattern();
        let all_on = vec![1.0; 24];
        let s = scorer().score(&t, &half_cue(&t), &all_on, false).unwrap();
        assert_eq!(s.miss_all, Rate::Value(0.0));
        assert_eq!(s.false_alarm, Rate::Value(1.0));
        assert!(!s.correct);
    }

    #[test]
    fn pool_ranges_are_clipped_and_counted() {
        // pools of 4: B = 7..12, C = 11..16
        let cfg = ScorerConfig::for_pool_size(4);
        assert_eq!(cfg.pool_b, 7..12);
        assert_eq!(cfg.pool_c, 11..16);

        let t = pattern();
        let mut recalled = t.clone();
        recalled[8] = 0.0; // miss inside B only
        let s = scorer().score(&t, &half_cue(&t), &recalled, false).unwrap();
        // B covers 7..12: on units 8, 10 -> one of two missed
        assert_eq!(s.miss_pool_b, Rate::Value(0.5));
        assert_eq!(s.miss_pool_c, Rate::Value(0.0));

        // a short layer clips C away entirely
        let short: Vec<f32> = t[..10].to_vec();
        let s = scorer().score(&short, &short, &short, false).unwrap();
        assert_eq!(s.miss_pool_c, Rate::NotApplicable);
        assert_eq!(s.false_alarm_pool_c, Rate::NotApplicable);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let t = pattern();
        let err = scorer().score(&t, &t[..3], &t, true).unwrap_err();
        assert!(matches!(err, EngineError::ShapeMismatch { expected: 24, got: 3, .. }));
    }

    #[test]
    fn default_pools_match_49_unit_layout() {
        let cfg = ScorerConfig::default();
        assert_eq!(cfg.pool_b, 97..147);
        assert_eq!(cfg.pool_c, 146..196);
        assert_eq!(cfg.threshold, 0.34);
    }
}
