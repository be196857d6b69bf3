//! # hipsleep
//!
//! Cortical–hippocampal alpha-cycle simulation core.
//!
//! Each trial is one alpha cycle of four quarters. A cognitive [`Mode`](gating::Mode)
//! (encoding, sleep, daydreaming, semantic pretraining, cortex-only training,
//! retrieval practice, pure retrieval) decides which regions are active, which
//! projections learn, and how projection strengths change at quarter
//! boundaries. After the minus phase the network's pattern completion is scored.
//!
//! ## Quick Start
//!
//! ```
//! use hipsleep::prelude::*;
//!
//! let cfg = SimConfig::compact().with_seed(7);
//! let mut ctx = SimulationContext::new(cfg).unwrap();
//!
//! let spec = PairedAssociates::for_pool_size(ctx.config().network.ec_pool_units);
//! let (mut train, _test) = spec.generate(&mut Prng::new(7));
//! train.select(0);
//!
//! let stats = ctx.run_trial(Mode::Encode, true, &train).unwrap();
//! assert!(stats.memory.is_some());
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): JSON configuration, pattern tables and protocols
//! - `parallel`: per-layer net input and activation updates via rayon
//!
//! ## Modules
//!
//! - [`engine`]: the network interface the core drives
//! - [`network`]: rate-coded reference engine
//! - [`gating`]: mode gating policy
//! - [`scheduler`]: alpha-cycle state machine
//! - [`memory`]: memory-completion scoring
//! - [`trial`]: trial driver
//! - [`protocol`]: multi-phase experiment runs
//! - [`observer`]: read-only observation adapters

#[path = "core/error.rs"]
pub mod error;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/engine.rs"]
pub mod engine;

#[path = "core/topology.rs"]
pub mod topology;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/storage.rs"]
pub mod storage;

#[path = "core/network.rs"]
pub mod network;

#[path = "core/gating.rs"]
pub mod gating;

#[path = "core/scheduler.rs"]
pub mod scheduler;

#[path = "core/memory.rs"]
pub mod memory;

#[path = "core/stats.rs"]
pub mod stats;

#[path = "core/trial.rs"]
pub mod trial;

#[path = "core/patterns.rs"]
pub mod patterns;

#[path = "core/protocol.rs"]
pub mod protocol;

pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use hipsleep::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{LearningRates, NetworkConfig, SimConfig};
    pub use crate::engine::{LayerId, LayerKind, NetworkEngine, PrjnGate, PrjnId, Time, UnitChannel};
    pub use crate::error::{ConfigError, EngineError, Result, SimError};
    pub use crate::gating::{Circuit, GatingParams, Mode, ModeConfiguration, Pathway, Region};
    pub use crate::memory::{MemoryScore, MemoryScorer, Rate, ScorerConfig};
    pub use crate::network::RateNetwork;
    pub use crate::observer::{CycleLog, NetworkAdapter, NetworkSnapshot};
    pub use crate::patterns::{PairedAssociates, PatternRow, PatternTable};
    pub use crate::prng::Prng;
    pub use crate::protocol::{
        PatternLibrary, PhaseStep, Protocol, ProtocolReport, StopHandle, WeightSlot,
    };
    pub use crate::scheduler::{ViewConfig, ViewObserver, ViewUpdate};
    pub use crate::stats::{EpochStats, EpochSummary, TrialStats};
    pub use crate::trial::{PatternProvider, SimulationContext, TrialCounter};
}
