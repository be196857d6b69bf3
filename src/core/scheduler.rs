//! Alpha-cycle scheduler.
//!
//! One trial is a fixed state machine:
//!
//! ```text
//! Init -> Quarter(0) -> Quarter(1) -> Quarter(2) -> Quarter(3) -> Finalize
//!      -> DWt -> WtFromDWt -> Done        (training)
//!      -> Done                            (testing)
//! ```
//!
//! Each quarter cycles the engine `cycles_per_quarter` times, then fires the
//! quarter-boundary schedule entry (re-gating and clamps), then finalises the
//! quarter. Memory is scored once, right after quarter 2 is finalised.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::{NetworkEngine, Time, UnitChannel};
use crate::error::EngineError;
use crate::gating::{Circuit, ModeConfiguration, Region};
use crate::memory::{MemoryScore, MemoryScorer};

/// Quarter after which memory is scored (the end of the minus phase).
pub const SCORE_QUARTER: usize = 2;

/// Fast-spike view granularity, in cycles.
pub const FAST_SPIKE_CYCLES: usize = 10;

/// How often the view observer is notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ViewUpdate {
    /// Every cycle; the last cycle of a quarter is covered by the quarter update.
    Cycle,
    /// Every 10 cycles, and every quarter.
    FastSpike,
    Quarter,
    /// After quarters 2 and 3.
    Phase,
    /// Once, at the end of the alpha cycle.
    AlphaCycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ViewConfig {
    pub enabled: bool,
    pub train: ViewUpdate,
    pub test: ViewUpdate,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            train: ViewUpdate::AlphaCycle,
            test: ViewUpdate::Cycle,
        }
    }
}

impl ViewConfig {
    pub fn granularity(&self, train: bool) -> Option<ViewUpdate> {
        match (self.enabled, train) {
            (false, _) => None,
            (true, true) => Some(self.train),
            (true, false) => Some(self.test),
        }
    }
}

/// Read-only hook into a running alpha cycle.
///
/// Implementations must not block; they see the engine but cannot change it.
pub trait ViewObserver {
    fn update(&mut self, engine: &dyn NetworkEngine, time: &Time, train: bool);

    /// After every cycle of a testing trial.
    fn test_cycle(&mut self, _engine: &dyn NetworkEngine, _time: &Time) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoView;

impl ViewObserver for NoView {
    fn update(&mut self, _engine: &dyn NetworkEngine, _time: &Time, _train: bool) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Init,
    Quarter(usize),
    Finalize,
    DWt,
    WtFromDWt,
    Done,
}

/// A clamp read at a quarter boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ClampRecord {
    pub from: Region,
    pub to: Region,
    /// Source activation at the moment of clamping.
    pub values: Vec<f32>,
    /// False when testing: the source was read but not written back.
    pub written: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlphaCycleOutcome {
    pub cycles: usize,
    pub memory: Option<MemoryScore>,
    pub clamps: Vec<ClampRecord>,
    /// Phases in execution order.
    pub trace: Vec<CyclePhase>,
}

/// One alpha cycle over a configured engine.
pub struct AlphaCycle<'a> {
    engine: &'a mut dyn NetworkEngine,
    circuit: &'a Circuit,
    config: &'a ModeConfiguration,
    scorer: &'a MemoryScorer,
    time: &'a mut Time,
    view: &'a mut dyn ViewObserver,
    granularity: Option<ViewUpdate>,
    train: bool,
    phase: CyclePhase,
    outcome: AlphaCycleOutcome,
}

impl<'a> AlphaCycle<'a> {
    /// `train` is taken from the configuration.
    pub fn new(
        engine: &'a mut dyn NetworkEngine,
        circuit: &'a Circuit,
        config: &'a ModeConfiguration,
        scorer: &'a MemoryScorer,
        time: &'a mut Time,
        view: &'a mut dyn ViewObserver,
        granularity: Option<ViewUpdate>,
    ) -> Self {
        Self {
            engine,
            circuit,
            config,
            scorer,
            time,
            view,
            granularity,
            train: config.train,
            phase: CyclePhase::Init,
            outcome: AlphaCycleOutcome {
                cycles: 0,
                memory: None,
                clamps: Vec::new(),
                trace: Vec::with_capacity(8),
            },
        }
    }

    /// The phase the next [`step`](Self::step) executes.
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Execute the current phase and move to the next one.
    pub fn step(&mut self) -> Result<CyclePhase, EngineError> {
        let current = self.phase;
        if current == CyclePhase::Done {
            return Ok(current);
        }
        self.outcome.trace.push(current);
        self.phase = match current {
            CyclePhase::Init => {
                self.time.alpha_cyc_start();
                let config = self.config;
                if let Some(initial) = config.schedule.entry(0) {
                    initial.apply_strengths(self.engine, self.circuit)?;
                }
                self.engine.alpha_cyc_init();
                CyclePhase::Quarter(0)
            }
            CyclePhase::Quarter(q) => {
                self.run_quarter(q)?;
                if q + 1 < Time::QUARTERS {
                    CyclePhase::Quarter(q + 1)
                } else {
                    CyclePhase::Finalize
                }
            }
            CyclePhase::Finalize => {
                let config = self.config;
                for r in &config.schedule.finish {
                    r.apply(self.engine, self.circuit)?;
                }
                if self.granularity == Some(ViewUpdate::AlphaCycle) {
                    self.notify();
                }
                if self.train {
                    CyclePhase::DWt
                } else {
                    CyclePhase::Done
                }
            }
            CyclePhase::DWt => {
                self.engine.dwt();
                CyclePhase::WtFromDWt
            }
            CyclePhase::WtFromDWt => {
                self.engine.wt_from_dwt();
                CyclePhase::Done
            }
            CyclePhase::Done => CyclePhase::Done,
        };
        Ok(self.phase)
    }

    pub fn run(mut self) -> Result<AlphaCycleOutcome, EngineError> {
        while self.phase != CyclePhase::Done {
            self.step()?;
        }
        Ok(self.outcome)
    }

    fn run_quarter(&mut self, q: usize) -> Result<(), EngineError> {
        let n = self.time.cycles_per_quarter;
        for cyc in 0..n {
            self.engine.cycle(&*self.time);
            self.time.cycle_inc();
            self.outcome.cycles += 1;
            if !self.train {
                self.view.test_cycle(&*self.engine, &*self.time);
            }
            let due = match self.granularity {
                Some(ViewUpdate::Cycle) => cyc + 1 != n,
                Some(ViewUpdate::FastSpike) => (cyc + 1) % FAST_SPIKE_CYCLES == 0,
                _ => false,
            };
            if due {
                self.notify();
            }
        }

        self.boundary(q + 1)?;
        self.engine.quarter_final(&*self.time);
        if q == SCORE_QUARTER {
            let score = self.scorer.score_engine(&*self.engine, self.circuit, self.train)?;
            self.outcome.memory = Some(score);
        }

        let due = match self.granularity {
            Some(ViewUpdate::Cycle | ViewUpdate::FastSpike | ViewUpdate::Quarter) => true,
            Some(ViewUpdate::Phase) => q >= SCORE_QUARTER,
            _ => false,
        };
        if due {
            self.notify();
        }
        self.time.quarter_inc();
        Ok(())
    }

    /// Entry fired between quarter `next - 1`'s cycles and its finalisation.
    fn boundary(&mut self, next: usize) -> Result<(), EngineError> {
        let config = self.config;
        let Some(entry) = config.schedule.entry(next) else {
            return Ok(());
        };
        entry.apply_strengths(self.engine, self.circuit)?;
        for clamp in &entry.clamps {
            let mut values = Vec::new();
            self.engine
                .unit_values(self.circuit.layer(clamp.from), UnitChannel::Act, &mut values)?;
            if self.train {
                self.engine.apply_ext(self.circuit.layer(clamp.to), &values)?;
            }
            self.outcome.clamps.push(ClampRecord {
                from: clamp.from,
                to: clamp.to,
                values,
                written: self.train,
            });
        }
        Ok(())
    }

    fn notify(&mut self) {
        self.view.update(&*self.engine, &*self.time, self.train);
    }
}
