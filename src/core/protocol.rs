//! Multi-phase experiment protocols.
//!
//! A [`Protocol`] is a list of [`PhaseStep`]s run against one
//! [`SimulationContext`]. Stop requests are honoured only between trials, so
//! an alpha cycle in flight always completes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::NetworkEngine;
use crate::error::{ConfigError, Result};
use crate::gating::Mode;
use crate::patterns::PatternTable;
use crate::prng::Prng;
use crate::stats::EpochSummary;
use crate::trial::SimulationContext;

const MISSING_TABLE: &str = "protocol references a missing or empty pattern table";

/// Cooperative cancellation flag, shared across threads.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Where a weight snapshot lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WeightSlot {
    /// Named in-memory image, kept for the duration of a run.
    Memory(String),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PhaseStep {
    /// `epochs` passes over `patterns` in a fresh random order each epoch.
    TrainEpochs {
        mode: Mode,
        patterns: String,
        epochs: usize,
    },
    /// One testing trial per row of `patterns`, in table order.
    TestAll { mode: Mode, patterns: String },
    SaveWeights(WeightSlot),
    LoadWeights(WeightSlot),
    AllOn,
}

impl PhaseStep {
    pub fn label(&self) -> String {
        match self {
            PhaseStep::TrainEpochs {
                mode,
                patterns,
                epochs,
            } => format!("train {mode} on {patterns} x{epochs}"),
            PhaseStep::TestAll { mode, patterns } => format!("test {mode} on {patterns}"),
            PhaseStep::SaveWeights(slot) => format!("save weights {slot:?}"),
            PhaseStep::LoadWeights(slot) => format!("load weights {slot:?}"),
            PhaseStep::AllOn => "all on".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub label: String,
    /// Last closed epoch of a training phase, or the test pass.
    pub summary: Option<EpochSummary>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProtocolReport {
    pub phases: Vec<PhaseReport>,
    /// True when a stop request ended the run early.
    pub stopped: bool,
}

impl ProtocolReport {
    /// Summaries of every completed test phase, in order.
    pub fn tests(&self) -> impl Iterator<Item = (&str, &EpochSummary)> {
        self.phases
            .iter()
            .filter(|p| p.label.starts_with("test"))
            .filter_map(|p| p.summary.as_ref().map(|s| (p.label.as_str(), s)))
    }
}

/// Named pattern tables a protocol refers to.
pub type PatternLibrary = HashMap<String, PatternTable>;

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Protocol {
    pub name: String,
    pub steps: Vec<PhaseStep>,
}

impl Protocol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn train(mut self, mode: Mode, patterns: &str, epochs: usize) -> Self {
        self.steps.push(PhaseStep::TrainEpochs {
            mode,
            patterns: patterns.to_string(),
            epochs,
        });
        self
    }

    pub fn test(mut self, mode: Mode, patterns: &str) -> Self {
        self.steps.push(PhaseStep::TestAll {
            mode,
            patterns: patterns.to_string(),
        });
        self
    }

    pub fn save(mut self, slot: WeightSlot) -> Self {
        self.steps.push(PhaseStep::SaveWeights(slot));
        self
    }

    pub fn load(mut self, slot: WeightSlot) -> Self {
        self.steps.push(PhaseStep::LoadWeights(slot));
        self
    }

    pub fn all_on(mut self) -> Self {
        self.steps.push(PhaseStep::AllOn);
        self
    }

    /// Every referenced table exists and is non-empty.
    pub fn validate(&self, library: &PatternLibrary) -> std::result::Result<(), ConfigError> {
        for step in &self.steps {
            let name = match step {
                PhaseStep::TrainEpochs { patterns, .. } | PhaseStep::TestAll { patterns, .. } => {
                    patterns
                }
                _ => continue,
            };
            match library.get(name) {
                Some(t) if !t.is_empty() => {}
                _ => return Err(ConfigError::Invalid(MISSING_TABLE)),
            }
        }
        Ok(())
    }

    pub fn run<E: NetworkEngine>(
        &self,
        ctx: &mut SimulationContext<E>,
        library: &mut PatternLibrary,
        stop: &StopHandle,
    ) -> Result<ProtocolReport> {
        self.validate(library)?;
        let mut rng = Prng::new(ctx.config().seed).fork(0x9e37_79b9);
        let mut images: HashMap<String, Vec<u8>> = HashMap::new();
        let mut report = ProtocolReport::default();
        info!(protocol = %self.name, steps = self.steps.len(), "protocol start");

        for step in &self.steps {
            if stop.is_requested() {
                report.stopped = true;
                break;
            }
            let label = step.label();
            info!(phase = %label, "phase start");
            let summary = match step {
                PhaseStep::TrainEpochs { mode, patterns, epochs } => {
                    let table = table_mut(library, patterns)?;
                    run_epochs(ctx, table, *mode, *epochs, &mut rng, stop)?
                }
                PhaseStep::TestAll { mode, patterns } => {
                    let table = table_mut(library, patterns)?;
                    ctx.reset_counters(table.len());
                    let mut last = None;
                    for i in 0..table.len() {
                        if stop.is_requested() {
                            break;
                        }
                        table.select(i);
                        ctx.run_trial(*mode, false, &*table)?;
                        last = ctx.stats.history.last().copied();
                    }
                    last
                }
                PhaseStep::SaveWeights(WeightSlot::Memory(name)) => {
                    let mut buf = Vec::new();
                    ctx.save_weights_to(&mut buf)?;
                    info!(slot = %name, bytes = buf.len(), "weights saved");
                    images.insert(name.clone(), buf);
                    None
                }
                PhaseStep::SaveWeights(WeightSlot::File(path)) => {
                    ctx.save_weights_file(path)?;
                    None
                }
                PhaseStep::LoadWeights(WeightSlot::Memory(name)) => {
                    let buf = images
                        .get(name)
                        .ok_or(ConfigError::Invalid("no weights saved in that slot"))?;
                    ctx.load_weights_from(&mut buf.as_slice())?;
                    info!(slot = %name, "weights loaded");
                    None
                }
                PhaseStep::LoadWeights(WeightSlot::File(path)) => {
                    ctx.load_weights_file(path)?;
                    None
                }
                PhaseStep::AllOn => {
                    ctx.all_on()?;
                    None
                }
            };
            report.phases.push(PhaseReport {
                label: label.clone(),
                summary,
            });
            info!(phase = %label, "phase end");
        }

        if stop.is_requested() {
            report.stopped = true;
            info!(protocol = %self.name, "stop requested");
        }
        Ok(report)
    }
}

fn table_mut<'a>(library: &'a mut PatternLibrary, name: &str) -> Result<&'a mut PatternTable> {
    library
        .get_mut(name)
        .ok_or_else(|| ConfigError::Invalid(MISSING_TABLE).into())
}

fn run_epochs<E: NetworkEngine>(
    ctx: &mut SimulationContext<E>,
    table: &mut PatternTable,
    mode: Mode,
    epochs: usize,
    rng: &mut Prng,
    stop: &StopHandle,
) -> Result<Option<EpochSummary>> {
    ctx.reset_counters(table.len());
    'epochs: for _ in 0..epochs {
        for i in table.permuted_order(rng) {
            if stop.is_requested() {
                break 'epochs;
            }
            table.select(i);
            ctx.run_trial(mode, true, &*table)?;
        }
    }
    Ok(ctx.stats.history.last().copied())
}
