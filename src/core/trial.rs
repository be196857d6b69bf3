//! Trial driver.
//!
//! [`SimulationContext`] owns everything one simulation needs: the engine, the
//! resolved circuit, the clock, the live mode configuration and the running
//! statistics. There is no global state; contexts are independent.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::config::SimConfig;
use crate::engine::{NetworkEngine, Time};
use crate::error::{ConfigError, Result};
use crate::gating::{Circuit, Mode, ModeConfiguration, Region};
use crate::memory::{MemoryScore, MemoryScorer};
use crate::network::RateNetwork;
use crate::scheduler::{AlphaCycle, AlphaCycleOutcome, NoView, ViewObserver};
use crate::stats::{EpochStats, EpochSummary, TrialStats};

/// Source of external patterns for the current trial.
pub trait PatternProvider {
    /// Pattern for the named layer, or `None` to leave it without input.
    fn pattern(&self, layer: &str) -> Option<&[f32]>;
}

/// Trial / epoch / run position over a fixed set of trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrialCounter {
    pub run: usize,
    pub epoch: usize,
    pub trial: usize,
    pub trials_per_epoch: usize,
}

impl TrialCounter {
    pub fn new(trials_per_epoch: usize) -> Self {
        Self {
            trials_per_epoch,
            ..Self::default()
        }
    }

    /// Move to the next trial. Returns true when that wrapped into a new epoch.
    pub fn advance(&mut self) -> bool {
        self.trial += 1;
        if self.trial >= self.trials_per_epoch.max(1) {
            self.trial = 0;
            self.epoch += 1;
            true
        } else {
            false
        }
    }

    pub fn new_run(&mut self) {
        self.run += 1;
        self.epoch = 0;
        self.trial = 0;
    }
}

pub struct SimulationContext<E: NetworkEngine = RateNetwork> {
    config: SimConfig,
    engine: E,
    circuit: Circuit,
    scorer: MemoryScorer,
    time: Time,
    applied: Option<ModeConfiguration>,
    view: Box<dyn ViewObserver>,
    last: Option<AlphaCycleOutcome>,
    pub counter: TrialCounter,
    pub stats: EpochStats,
}

impl SimulationContext<RateNetwork> {
    /// Build the reference network described by `config`.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let engine = RateNetwork::hippocampal(&config.network, config.seed)?;
        Self::with_engine(config, engine)
    }
}

impl<E: NetworkEngine> SimulationContext<E> {
    /// Wrap an existing engine. Fails if it lacks a region or pathway.
    pub fn with_engine(config: SimConfig, engine: E) -> Result<Self> {
        config.validate()?;
        let circuit = Circuit::resolve(&engine)?;
        Ok(Self {
            scorer: MemoryScorer::new(config.scorer.clone()),
            time: Time::new(config.cycles_per_quarter),
            config,
            engine,
            circuit,
            applied: None,
            view: Box::new(NoView),
            last: None,
            counter: TrialCounter::default(),
            stats: EpochStats::new(),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    pub fn applied(&self) -> Option<&ModeConfiguration> {
        self.applied.as_ref()
    }

    /// Outcome of the last completed alpha cycle.
    pub fn last_outcome(&self) -> Option<&AlphaCycleOutcome> {
        self.last.as_ref()
    }

    pub fn set_view_observer(&mut self, view: Box<dyn ViewObserver>) {
        self.view = view;
    }

    /// Configure the engine for `mode`. Replaces any previous configuration.
    pub fn apply_mode(&mut self, mode: Mode, train: bool) -> Result<()> {
        let baseline = self.circuit.baseline();
        let cfg = ModeConfiguration::build(mode, train, baseline, &self.config.gating);
        cfg.schedule.validate()?;
        cfg.apply(&mut self.engine, &self.circuit)?;
        debug!(%mode, train, "mode applied");
        self.applied = Some(cfg);
        Ok(())
    }

    /// Clear all external input, then write the patterns the applied mode asks for.
    pub fn apply_inputs(&mut self, provider: &dyn PatternProvider) -> Result<()> {
        let cfg = self.applied.as_ref().ok_or(ConfigError::NoModeApplied)?;
        self.engine.init_ext();
        for &region in &cfg.inputs {
            if let Some(p) = provider.pattern(region.name()) {
                self.engine.apply_ext(self.circuit.layer(region), p)?;
            }
        }
        Ok(())
    }

    /// One alpha cycle under the applied mode, notifying the context's observer.
    pub fn run_alpha_cycle(&mut self, train: bool) -> Result<()> {
        self.run_cycle(train, None)
    }

    /// As [`run_alpha_cycle`](Self::run_alpha_cycle), but notifying `view` instead.
    pub fn run_alpha_cycle_observed(
        &mut self,
        train: bool,
        view: &mut dyn ViewObserver,
    ) -> Result<()> {
        self.run_cycle(train, Some(view))
    }

    fn run_cycle(&mut self, train: bool, view: Option<&mut dyn ViewObserver>) -> Result<()> {
        let cfg = self.applied.as_ref().ok_or(ConfigError::NoModeApplied)?;
        if cfg.train != train {
            return Err(ConfigError::TrainMismatch {
                mode: cfg.mode.name(),
                applied: cfg.train,
                requested: train,
            }
            .into());
        }
        let view: &mut dyn ViewObserver = match view {
            Some(v) => v,
            None => self.view.as_mut(),
        };
        let outcome = AlphaCycle::new(
            &mut self.engine,
            &self.circuit,
            cfg,
            &self.scorer,
            &mut self.time,
            view,
            self.config.view.granularity(train),
        )
        .run()?;
        debug!(
            mode = %cfg.mode,
            train,
            cycles = outcome.cycles,
            total_cycles = self.time.total_cycles,
            "alpha cycle done"
        );
        self.last = Some(outcome);
        Ok(())
    }

    /// Score the engine's current state.
    pub fn score_memory(&self, train: bool) -> Result<MemoryScore> {
        Ok(self.scorer.score_engine(&self.engine, &self.circuit, train)?)
    }

    /// Statistics of the last alpha cycle.
    pub fn trial_statistics(&self) -> Result<TrialStats> {
        let memory = self.last.as_ref().and_then(|o| o.memory);
        Ok(TrialStats::from_output(
            &self.engine,
            self.circuit.layer(Region::Output),
            self.scorer.config(),
            memory,
        )?)
    }

    /// Apply mode and inputs, run one alpha cycle, record and return its statistics.
    ///
    /// Advances the trial counter; an epoch rollover closes the epoch statistics.
    pub fn run_trial(
        &mut self,
        mode: Mode,
        train: bool,
        provider: &dyn PatternProvider,
    ) -> Result<TrialStats> {
        self.apply_mode(mode, train)?;
        self.apply_inputs(provider)?;
        self.run_alpha_cycle(train)?;
        let stats = self.trial_statistics()?;
        self.stats.record_trial(&stats);
        if self.counter.advance() {
            let summary = self.stats.close_epoch();
            log_epoch(mode, train, &summary);
        }
        Ok(stats)
    }

    /// Start counting a fresh set of trials.
    pub fn reset_counters(&mut self, trials_per_epoch: usize) {
        self.counter = TrialCounter::new(trials_per_epoch);
        self.stats = EpochStats::new();
    }

    /// Turn every region on. Any applied mode is dropped.
    pub fn all_on(&mut self) -> Result<()> {
        for r in Region::ALL {
            self.engine.set_layer_off(self.circuit.layer(r), false)?;
        }
        self.applied = None;
        Ok(())
    }

    pub fn save_weights_to(&self, w: &mut dyn Write) -> Result<()> {
        self.engine.save_weights(w)?;
        Ok(())
    }

    pub fn load_weights_from(&mut self, r: &mut dyn Read) -> Result<()> {
        self.engine.load_weights(r)?;
        Ok(())
    }

    pub fn save_weights_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut w = BufWriter::new(File::create(path)?);
        self.save_weights_to(&mut w)?;
        w.flush()?;
        info!(path = %path.display(), "weights saved");
        Ok(())
    }

    pub fn load_weights_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut r = BufReader::new(File::open(path)?);
        self.load_weights_from(&mut r)?;
        info!(path = %path.display(), "weights loaded");
        Ok(())
    }
}

fn log_epoch(mode: Mode, train: bool, s: &EpochSummary) {
    info!(
        %mode,
        train,
        epoch = s.epoch,
        trials = s.trials,
        sse = s.sse,
        sse_b = s.sse_pool_b,
        sse_c = s.sse_pool_c,
        pct_err = s.pct_err,
        cos = s.cos_sim,
        mem = %s.mem,
        "epoch"
    );
}
