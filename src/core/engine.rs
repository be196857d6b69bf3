//! The capability surface the simulation core drives.
//!
//! The gating policy, the alpha-cycle scheduler and the memory scorer only ever
//! talk to a network through [`NetworkEngine`]. The crate ships one
//! implementation, [`crate::network::RateNetwork`]; any other engine can be
//! plugged in by implementing the trait.

use std::fmt;
use std::io::{self, Read, Write};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Dense handle of a layer inside one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(usize);

impl LayerId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Dense handle of a projection inside one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrjnId(usize);

impl PrjnId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Behavioural kind of a layer.
///
/// - `Input`: activation is clamped to the external input whenever one is applied.
/// - `Hidden`: activation is always computed from net input.
/// - `Target`: computed in the minus phase, clamped to `Targ` in the plus phase.
/// - `Compare`: always computed; `Targ` is only recorded for statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LayerKind {
    Input,
    Hidden,
    Target,
    Compare,
}

/// Per-unit value channels readable through [`NetworkEngine::unit_values`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnitChannel {
    /// Current activation.
    Act,
    /// Activation at the end of quarter 0.
    ActQ1,
    /// Minus-phase activation (end of quarter 2).
    ActM,
    /// Plus-phase activation (end of quarter 3).
    ActP,
    /// Target / pattern value.
    Targ,
    /// External clamp input.
    Ext,
}

/// Gating attributes of one projection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PrjnGate {
    pub off: bool,
    pub learn: bool,
    pub rel: f32,
    pub abs: f32,
}

impl Default for PrjnGate {
    fn default() -> Self {
        Self {
            off: false,
            learn: true,
            rel: 1.0,
            abs: 1.0,
        }
    }
}

/// Simulation clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Time {
    /// Cycle within the current alpha cycle.
    pub cycle: usize,
    /// Quarter within the current alpha cycle (0..4).
    pub quarter: usize,
    pub cycles_per_quarter: usize,
    /// Monotonic across trials.
    pub total_cycles: u64,
}

impl Time {
    pub const QUARTERS: usize = 4;

    pub fn new(cycles_per_quarter: usize) -> Self {
        Self {
            cycle: 0,
            quarter: 0,
            cycles_per_quarter,
            total_cycles: 0,
        }
    }

    pub fn alpha_cyc_start(&mut self) {
        self.cycle = 0;
        self.quarter = 0;
    }

    #[inline]
    pub fn cycle_inc(&mut self) {
        self.cycle += 1;
        self.total_cycles += 1;
    }

    #[inline]
    pub fn quarter_inc(&mut self) {
        self.quarter += 1;
    }

    /// The final quarter is the plus phase.
    #[inline]
    pub fn plus_phase(&self) -> bool {
        self.quarter == Self::QUARTERS - 1
    }

    pub fn cycles_per_alpha(&self) -> usize {
        Self::QUARTERS * self.cycles_per_quarter
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{} c{} (t={})", self.quarter, self.cycle, self.total_cycles)
    }
}

/// Everything the core needs from a network.
///
/// All handle-taking methods fail with [`EngineError::InvalidLayer`] /
/// [`EngineError::InvalidProjection`] on a handle this engine did not issue.
/// The trait is object safe; the scheduler works on `&mut dyn NetworkEngine`.
pub trait NetworkEngine {
    // --- structure ---

    fn layer_count(&self) -> usize;
    fn prjn_count(&self) -> usize;
    fn layer_id(&self, name: &str) -> Option<LayerId>;
    fn prjn_id(&self, send: &str, recv: &str) -> Option<PrjnId>;
    fn layer_name(&self, layer: LayerId) -> Result<&str, EngineError>;
    fn layer_len(&self, layer: LayerId) -> Result<usize, EngineError>;

    // --- layer gating ---

    fn layer_off(&self, layer: LayerId) -> Result<bool, EngineError>;
    fn set_layer_off(&mut self, layer: LayerId, off: bool) -> Result<(), EngineError>;
    fn layer_kind(&self, layer: LayerId) -> Result<LayerKind, EngineError>;
    fn set_layer_kind(&mut self, layer: LayerId, kind: LayerKind) -> Result<(), EngineError>;
    /// Kind the layer was built with.
    fn baseline_layer_kind(&self, layer: LayerId) -> Result<LayerKind, EngineError>;

    // --- projection gating ---

    fn prjn_gate(&self, prjn: PrjnId) -> Result<PrjnGate, EngineError>;
    fn set_prjn_gate(&mut self, prjn: PrjnId, gate: PrjnGate) -> Result<(), EngineError>;
    /// Gate the projection was built with.
    fn baseline_prjn_gate(&self, prjn: PrjnId) -> Result<PrjnGate, EngineError>;

    fn set_prjn_rel(&mut self, prjn: PrjnId, rel: f32) -> Result<(), EngineError> {
        let mut gate = self.prjn_gate(prjn)?;
        gate.rel = rel;
        self.set_prjn_gate(prjn, gate)
    }

    fn set_prjn_abs(&mut self, prjn: PrjnId, abs: f32) -> Result<(), EngineError> {
        let mut gate = self.prjn_gate(prjn)?;
        gate.abs = abs;
        self.set_prjn_gate(prjn, gate)
    }

    // --- external input ---

    /// Clear every layer's external input and target.
    fn init_ext(&mut self);
    /// Write a pattern into one layer. Input layers take it as clamp input;
    /// every layer records it as `Targ`.
    fn apply_ext(&mut self, layer: LayerId, values: &[f32]) -> Result<(), EngineError>;

    // --- dynamics ---

    /// Reset per-trial activation state and recompute strength scaling.
    fn alpha_cyc_init(&mut self);
    fn cycle(&mut self, time: &Time);
    fn quarter_final(&mut self, time: &Time);
    /// Recompute net-input scaling after a rel/abs change.
    fn rescale(&mut self);

    // --- learning ---

    /// Accumulate weight deltas on every plastic projection.
    fn dwt(&mut self);
    /// Apply and clear accumulated deltas.
    fn wt_from_dwt(&mut self);
    /// Largest accumulated |delta| on a projection.
    fn max_abs_dwt(&self, prjn: PrjnId) -> Result<f32, EngineError>;

    // --- reads ---

    fn unit_values(
        &self,
        layer: LayerId,
        channel: UnitChannel,
        out: &mut Vec<f32>,
    ) -> Result<(), EngineError>;

    /// Running average activation of each pool of a layer.
    fn pool_averages(&self, layer: LayerId, out: &mut Vec<f32>) -> Result<(), EngineError>;

    // --- persistence ---

    fn save_weights(&self, w: &mut dyn Write) -> io::Result<()>;
    fn load_weights(&mut self, r: &mut dyn Read) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_counts_quarters_and_cycles() {
        let mut t = Time::new(5);
        t.alpha_cyc_start();
        for _ in 0..Time::QUARTERS {
            for _ in 0..t.cycles_per_quarter {
                t.cycle_inc();
            }
            if t.quarter < 3 {
                assert!(!t.plus_phase());
            }
            t.quarter_inc();
        }
        assert_eq!(t.cycle, 20);
        assert_eq!(t.total_cycles, 20);
        assert_eq!(t.cycles_per_alpha(), 20);

        t.alpha_cyc_start();
        assert_eq!(t.cycle, 0);
        assert_eq!(t.total_cycles, 20);
    }

    #[test]
    fn default_gate_is_on_and_plastic() {
        let g = PrjnGate::default();
        assert!(!g.off);
        assert!(g.learn);
        assert_eq!(g.rel, 1.0);
        assert_eq!(g.abs, 1.0);
    }
}
