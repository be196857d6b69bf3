// Simulation configuration.
//
// Plain structs with documented defaults. Under the `serde` feature every
// section (de)serializes from JSON; missing fields fall back to the defaults.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gating::GatingParams;
use crate::memory::ScorerConfig;
use crate::scheduler::ViewConfig;

/// Per-class learning rates of the hippocampal model.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LearningRates {
    pub default: f32,
    pub ec_ca1: f32,
    pub hippo_chl: f32,
    pub ppath: f32,
    pub ecin_to_dg: f32,
    pub ca3_to_ca1: f32,
    pub ca3_to_ca3: f32,
}

impl Default for LearningRates {
    fn default() -> Self {
        Self {
            default: 0.04,
            ec_ca1: 0.1,
            hippo_chl: 0.2,
            ppath: 0.15,
            ecin_to_dg: 0.4,
            ca3_to_ca1: 0.1,
            ca3_to_ca3: 0.1,
        }
    }
}

/// Layer sizes and reference-engine dynamics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NetworkConfig {
    /// Units per pool in Input, ECin, ECout and Output (6 pools each).
    pub ec_pool_units: usize,
    /// Units per CA1 pool (6 pools, one per EC pool).
    pub ca1_pool_units: usize,
    pub dg_units: usize,
    pub ca3_units: usize,
    pub cortex_units: usize,
    pub semantic_units: usize,
    pub letter_units: usize,

    /// Activation integration rate per cycle, in (0, 1].
    pub dt: f32,
    /// Gain of the x/(x+1) rate function.
    pub gain: f32,
    /// Weight of mean pool activation in feedback inhibition.
    pub fb_gain: f32,
    /// Fraction of activation cleared at the start of each alpha cycle.
    pub decay: f32,
    /// Rate of the running pool-average update at each quarter end.
    pub avg_dt: f32,

    pub rates: LearningRates,
}

impl Default for NetworkConfig {
    /// Reference shape: 49-unit EC pools (294 units per EC layer) and a
    /// scaled-down hippocampus.
    fn default() -> Self {
        Self {
            ec_pool_units: 49,
            ca1_pool_units: 20,
            dg_units: 400,
            ca3_units: 200,
            cortex_units: 100,
            semantic_units: 49,
            letter_units: 49,
            dt: 0.3,
            gain: 20.0,
            fb_gain: 0.5,
            decay: 1.0,
            avg_dt: 0.01,
            rates: LearningRates::default(),
        }
    }
}

impl NetworkConfig {
    /// Small network for tests and quick runs.
    pub fn compact() -> Self {
        Self {
            ec_pool_units: 8,
            ca1_pool_units: 6,
            dg_units: 40,
            ca3_units: 30,
            cortex_units: 25,
            semantic_units: 16,
            letter_units: 16,
            ..Default::default()
        }
    }

    /// Units per EC layer.
    pub fn ec_units(&self) -> usize {
        crate::topology::EC_POOLS * self.ec_pool_units
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            self.ec_pool_units,
            self.ca1_pool_units,
            self.dg_units,
            self.ca3_units,
            self.cortex_units,
            self.semantic_units,
            self.letter_units,
        ];
        if sizes.iter().any(|&s| s == 0) {
            return Err(ConfigError::Invalid("layer sizes must be > 0"));
        }
        if !(self.dt > 0.0 && self.dt <= 1.0) {
            return Err(ConfigError::Invalid("dt must be in (0, 1]"));
        }
        if !self.gain.is_finite() || self.gain <= 0.0 {
            return Err(ConfigError::Invalid("gain must be finite and > 0"));
        }
        if !self.fb_gain.is_finite() || self.fb_gain < 0.0 {
            return Err(ConfigError::Invalid("fb_gain must be finite and >= 0"));
        }
        if !(0.0..=1.0).contains(&self.decay) {
            return Err(ConfigError::Invalid("decay must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.avg_dt) {
            return Err(ConfigError::Invalid("avg_dt must be in [0, 1]"));
        }
        let r = &self.rates;
        let rates = [
            r.default,
            r.ec_ca1,
            r.hippo_chl,
            r.ppath,
            r.ecin_to_dg,
            r.ca3_to_ca1,
            r.ca3_to_ca3,
        ];
        if rates.iter().any(|x| !x.is_finite() || *x < 0.0 || *x > 1.0) {
            return Err(ConfigError::Invalid("learning rates must be in [0, 1]"));
        }
        Ok(())
    }
}

/// Top-level configuration of one simulation context.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimConfig {
    /// Seeds weight initialisation and random connectivity.
    pub seed: u64,
    pub cycles_per_quarter: usize,
    pub network: NetworkConfig,
    pub gating: GatingParams,
    pub scorer: ScorerConfig,
    pub view: ViewConfig,
}

impl Default for SimConfig {
    /// - seed 1
    /// - 25 cycles per quarter (100 per alpha cycle)
    /// - reference network shape, default gating and scoring parameters
    fn default() -> Self {
        Self {
            seed: 1,
            cycles_per_quarter: 25,
            network: NetworkConfig::default(),
            gating: GatingParams::default(),
            scorer: ScorerConfig::default(),
            view: ViewConfig::default(),
        }
    }
}

impl SimConfig {
    pub const MAX_CYCLES_PER_QUARTER: usize = 10_000;

    /// Compact network with short quarters; scorer pools sized to it.
    pub fn compact() -> Self {
        let network = NetworkConfig::compact();
        let pool = network.ec_pool_units;
        Self {
            cycles_per_quarter: 10,
            scorer: ScorerConfig::for_pool_size(pool),
            network,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cycles_per_quarter(mut self, cycles: usize) -> Self {
        self.cycles_per_quarter = cycles;
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_gating(mut self, gating: GatingParams) -> Self {
        self.gating = gating;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycles_per_quarter == 0 {
            return Err(ConfigError::Invalid("cycles_per_quarter must be > 0"));
        }
        if self.cycles_per_quarter > Self::MAX_CYCLES_PER_QUARTER {
            return Err(ConfigError::Invalid("cycles_per_quarter too large"));
        }
        self.network.validate()?;
        self.gating.validate()?;
        self.scorer.validate()?;
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn from_json_str(s: &str) -> crate::error::Result<Self> {
        let cfg: SimConfig = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[cfg(feature = "serde")]
    pub fn load_json(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    #[cfg(feature = "serde")]
    pub fn to_json_pretty(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SimConfig::default().validate().is_ok());
        assert!(SimConfig::compact().validate().is_ok());
        assert_eq!(SimConfig::default().cycles_per_quarter, 25);
    }

    #[test]
    fn zero_cycles_rejected() {
        let cfg = SimConfig::default().with_cycles_per_quarter(0);
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn bad_dynamics_rejected() {
        let cfg = SimConfig {
            network: NetworkConfig {
                dt: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = SimConfig {
            network: NetworkConfig {
                rates: LearningRates {
                    ppath: 2.0,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{ "seed": 42, "network": { "dg_units": 64 } }"#;
        let cfg = SimConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.network.dg_units, 64);
        assert_eq!(cfg.network.ca3_units, NetworkConfig::default().ca3_units);
        assert_eq!(cfg.cycles_per_quarter, 25);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_rejects_invalid_values() {
        let err = SimConfig::from_json_str(r#"{ "cycles_per_quarter": 0 }"#).unwrap_err();
        assert!(matches!(err, crate::error::SimError::Config(_)));
    }
}
