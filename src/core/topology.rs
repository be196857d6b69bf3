//! Declarative network topology: layers, projections and their connectivity.
//!
//! A [`Topology`] is pure data. Engines consume it at build time; the
//! reference engine expands every [`Connectivity`] into CSR connection lists.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::{LearningRates, NetworkConfig};
use crate::engine::{LayerKind, PrjnGate};
use crate::error::EngineError;
use crate::prng::Prng;

/// Number of pools in the entorhinal / input layers of the hippocampal model.
pub const EC_POOLS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Shape {
    pub pools: usize,
    pub pool_units: usize,
}

impl Shape {
    pub const fn flat(units: usize) -> Self {
        Self {
            pools: 1,
            pool_units: units,
        }
    }

    pub const fn pooled(pools: usize, pool_units: usize) -> Self {
        Self { pools, pool_units }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.pools * self.pool_units
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unit indices of one pool.
    #[inline]
    pub fn pool_range(&self, pool: usize) -> std::ops::Range<usize> {
        pool * self.pool_units..(pool + 1) * self.pool_units
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerSpec {
    pub name: String,
    pub kind: LayerKind,
    pub shape: Shape,
    /// Inhibition gain relative to the pool's mean net input.
    pub gi: f32,
    /// Expected average activation; seeds the running pool averages.
    pub act_avg: f32,
}

impl LayerSpec {
    pub fn new(name: impl Into<String>, kind: LayerKind, shape: Shape) -> Self {
        Self {
            name: name.into(),
            kind,
            shape,
            gi: 1.1,
            act_avg: 0.15,
        }
    }

    pub fn inhib(mut self, gi: f32, act_avg: f32) -> Self {
        self.gi = gi;
        self.act_avg = act_avg;
        self
    }
}

/// How sender units map onto receiver units.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Connectivity {
    /// Unit i to unit i; layers must have equal length.
    OneToOne,
    /// Pool i fully to pool i; layers must have equal pool counts.
    PoolToPool,
    /// Listed sender pools fully to listed receiver pools. An empty list means
    /// the whole layer.
    Pools { send: Vec<usize>, recv: Vec<usize> },
    Full,
    /// Each receiver draws `round(p * senders)` distinct senders (at least one).
    UniformRandom { p: f32 },
}

/// Learning-rule family, used for initial parameter assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PrjnClass {
    Default,
    EcCa1,
    HippoChl,
    PPath,
}

impl PrjnClass {
    pub fn lrate(self, rates: &LearningRates) -> f32 {
        match self {
            PrjnClass::Default => rates.default,
            PrjnClass::EcCa1 => rates.ec_ca1,
            PrjnClass::HippoChl => rates.hippo_chl,
            PrjnClass::PPath => rates.ppath,
        }
    }

    /// Share of the Hebbian term in the weight delta.
    pub fn hebb(self) -> f32 {
        match self {
            PrjnClass::Default | PrjnClass::EcCa1 => 0.0,
            PrjnClass::HippoChl => 0.05,
            PrjnClass::PPath => 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PrjnSpec {
    pub send: String,
    pub recv: String,
    pub connectivity: Connectivity,
    pub class: PrjnClass,
    /// Baseline gate; modes override it per trial.
    pub gate: PrjnGate,
    pub lrate: f32,
    pub hebb: f32,
    pub wt_mean: f32,
    pub wt_var: f32,
}

impl PrjnSpec {
    pub fn new(send: &str, recv: &str, connectivity: Connectivity) -> Self {
        Self {
            send: send.to_string(),
            recv: recv.to_string(),
            connectivity,
            class: PrjnClass::Default,
            gate: PrjnGate::default(),
            lrate: 0.04,
            hebb: 0.0,
            wt_mean: 0.5,
            wt_var: 0.25,
        }
    }

    pub fn class(mut self, class: PrjnClass, rates: &LearningRates) -> Self {
        self.class = class;
        self.lrate = class.lrate(rates);
        self.hebb = class.hebb();
        self
    }

    pub fn rel(mut self, rel: f32) -> Self {
        self.gate.rel = rel;
        self
    }

    pub fn abs(mut self, abs: f32) -> Self {
        self.gate.abs = abs;
        self
    }

    pub fn learn(mut self, learn: bool) -> Self {
        self.gate.learn = learn;
        self
    }

    pub fn lrate(mut self, lrate: f32) -> Self {
        self.lrate = lrate;
        self
    }

    pub fn hebb(mut self, hebb: f32) -> Self {
        self.hebb = hebb;
        self
    }

    pub fn wt(mut self, mean: f32, var: f32) -> Self {
        self.wt_mean = mean;
        self.wt_var = var;
        self
    }

    /// For each receiver unit, the sorted list of its sender units.
    pub fn expand(
        &self,
        send: &LayerSpec,
        recv: &LayerSpec,
        rng: &mut Prng,
    ) -> Result<Vec<Vec<usize>>, EngineError> {
        let n_send = send.shape.len();
        let n_recv = recv.shape.len();
        let mut out = vec![Vec::new(); n_recv];
        match &self.connectivity {
            Connectivity::OneToOne => {
                if n_send != n_recv {
                    return Err(self.shape_err(format!(
                        "one-to-one needs equal sizes ({n_send} vs {n_recv})"
                    )));
                }
                for (i, senders) in out.iter_mut().enumerate() {
                    senders.push(i);
                }
            }
            Connectivity::PoolToPool => {
                if send.shape.pools != recv.shape.pools {
                    return Err(self.shape_err(format!(
                        "pool-to-pool needs equal pool counts ({} vs {})",
                        send.shape.pools, recv.shape.pools
                    )));
                }
                for pool in 0..recv.shape.pools {
                    let senders: Vec<usize> = send.shape.pool_range(pool).collect();
                    for r in recv.shape.pool_range(pool) {
                        out[r] = senders.clone();
                    }
                }
            }
            Connectivity::Pools { send: sp, recv: rp } => {
                let senders = self.pool_units(&send.shape, sp)?;
                for r in self.pool_units(&recv.shape, rp)? {
                    out[r] = senders.clone();
                }
            }
            Connectivity::Full => {
                let senders: Vec<usize> = (0..n_send).collect();
                for s in out.iter_mut() {
                    *s = senders.clone();
                }
            }
            Connectivity::UniformRandom { p } => {
                if !(*p > 0.0 && *p <= 1.0) {
                    return Err(self.shape_err(format!(
                        "uniform-random probability {p} outside (0,1]"
                    )));
                }
                let k = ((*p * n_send as f32).round() as usize).clamp(1, n_send.max(1));
                for s in out.iter_mut() {
                    *s = rng.sample_indices(n_send, k);
                }
            }
        }
        Ok(out)
    }

    fn pool_units(&self, shape: &Shape, pools: &[usize]) -> Result<Vec<usize>, EngineError> {
        if pools.is_empty() {
            return Ok((0..shape.len()).collect());
        }
        let mut units = Vec::new();
        for &p in pools {
            if p >= shape.pools {
                return Err(self.shape_err(format!(
                    "pool {p} out of range ({} pools)",
                    shape.pools
                )));
            }
            units.extend(shape.pool_range(p));
        }
        units.sort_unstable();
        Ok(units)
    }

    fn shape_err(&self, msg: String) -> EngineError {
        EngineError::Topology(format!("{} -> {}: {msg}", self.send, self.recv))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Topology {
    pub layers: Vec<LayerSpec>,
    pub prjns: Vec<PrjnSpec>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, spec: LayerSpec) -> Self {
        self.layers.push(spec);
        self
    }

    pub fn connect(mut self, spec: PrjnSpec) -> Self {
        self.prjns.push(spec);
        self
    }

    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == name)
    }

    /// Names unique, endpoints present, no empty layers, no duplicate projection.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (i, l) in self.layers.iter().enumerate() {
            if l.shape.is_empty() {
                return Err(EngineError::Topology(format!("layer `{}` has no units", l.name)));
            }
            if self.layers[..i].iter().any(|o| o.name == l.name) {
                return Err(EngineError::Topology(format!("duplicate layer `{}`", l.name)));
            }
        }
        for (i, p) in self.prjns.iter().enumerate() {
            for end in [&p.send, &p.recv] {
                if self.layer_index(end).is_none() {
                    return Err(EngineError::Topology(format!(
                        "projection {} -> {} references unknown layer `{end}`",
                        p.send, p.recv
                    )));
                }
            }
            if self.prjns[..i].iter().any(|o| o.send == p.send && o.recv == p.recv) {
                return Err(EngineError::Topology(format!(
                    "duplicate projection {} -> {}",
                    p.send, p.recv
                )));
            }
        }
        Ok(())
    }

    /// The cortical-hippocampal model: an entorhinal loop (ECin, ECout) around
    /// the hippocampus (DG, CA3, CA1), plus cortical pathways (Cortex, Letter,
    /// Semantic) feeding a shared Output.
    pub fn hippocampal(cfg: &NetworkConfig) -> Self {
        use Connectivity::*;
        use LayerKind::*;

        let ec = Shape::pooled(EC_POOLS, cfg.ec_pool_units);
        let r = &cfg.rates;
        let bidir_pools = || Pools {
            send: vec![],
            recv: vec![2, 3],
        };
        let bidir_back = || Pools {
            send: vec![2, 3],
            recv: vec![],
        };

        Topology::new()
            .layer(LayerSpec::new("Input", Input, ec).inhib(1.0, 0.2))
            .layer(LayerSpec::new("Cortex", Hidden, Shape::flat(cfg.cortex_units)))
            .layer(LayerSpec::new("Semantic", Hidden, Shape::flat(cfg.semantic_units)))
            .layer(LayerSpec::new("Letter", Hidden, Shape::flat(cfg.letter_units)))
            .layer(LayerSpec::new("ECin", Hidden, ec).inhib(1.0, 0.2))
            .layer(LayerSpec::new("ECout", Target, ec).inhib(1.0, 0.2))
            .layer(
                LayerSpec::new("CA1", Hidden, Shape::pooled(EC_POOLS, cfg.ca1_pool_units))
                    .inhib(0.8, 0.1),
            )
            .layer(LayerSpec::new("DG", Hidden, Shape::flat(cfg.dg_units)).inhib(1.6, 0.01))
            .layer(LayerSpec::new("CA3", Hidden, Shape::flat(cfg.ca3_units)).inhib(1.4, 0.02))
            .layer(LayerSpec::new("Output", Target, ec).inhib(1.0, 0.2))
            // entorhinal loop
            .connect(PrjnSpec::new("Input", "ECin", OneToOne).learn(false).wt(0.8, 0.0))
            .connect(
                PrjnSpec::new("ECout", "ECin", OneToOne)
                    .learn(false)
                    .rel(0.5)
                    .wt(0.9, 0.0),
            )
            .connect(PrjnSpec::new("ECout", "Output", OneToOne).learn(false).rel(0.5))
            .connect(PrjnSpec::new("Output", "ECin", OneToOne).learn(false))
            // cortical pathways
            .connect(PrjnSpec::new(
                "Input",
                "Cortex",
                Pools {
                    send: vec![0, 4, 5],
                    recv: vec![],
                },
            ))
            .connect(PrjnSpec::new(
                "Input",
                "Letter",
                Pools {
                    send: vec![1],
                    recv: vec![],
                },
            ))
            .connect(PrjnSpec::new(
                "Input",
                "Semantic",
                Pools {
                    send: vec![2, 3],
                    recv: vec![],
                },
            ))
            .connect(PrjnSpec::new("Cortex", "Output", bidir_pools()))
            .connect(PrjnSpec::new("Output", "Cortex", bidir_back()))
            .connect(PrjnSpec::new("Letter", "Output", bidir_pools()))
            .connect(PrjnSpec::new("Output", "Letter", bidir_back()))
            .connect(PrjnSpec::new("Semantic", "ECin", bidir_pools()))
            .connect(PrjnSpec::new("ECin", "Semantic", bidir_back()))
            // hippocampus
            .connect(PrjnSpec::new("ECin", "CA1", PoolToPool).class(PrjnClass::EcCa1, r))
            .connect(
                PrjnSpec::new("CA1", "ECout", PoolToPool)
                    .class(PrjnClass::EcCa1, r)
                    .abs(4.0),
            )
            .connect(PrjnSpec::new("ECout", "CA1", PoolToPool).class(PrjnClass::EcCa1, r))
            .connect(
                PrjnSpec::new("ECin", "DG", UniformRandom { p: 0.25 })
                    .class(PrjnClass::HippoChl, r)
                    .lrate(r.ecin_to_dg)
                    .hebb(0.5),
            )
            .connect(
                PrjnSpec::new("ECin", "CA3", UniformRandom { p: 0.25 })
                    .class(PrjnClass::PPath, r),
            )
            .connect(
                PrjnSpec::new("CA3", "CA3", Full)
                    .class(PrjnClass::PPath, r)
                    .lrate(r.ca3_to_ca3)
                    .rel(0.1),
            )
            .connect(
                PrjnSpec::new("DG", "CA3", UniformRandom { p: 0.02 })
                    .learn(false)
                    .rel(4.0)
                    .wt(0.9, 0.01),
            )
            .connect(
                PrjnSpec::new("CA3", "CA1", Full)
                    .class(PrjnClass::HippoChl, r)
                    .lrate(r.ca3_to_ca1)
                    .hebb(0.01),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hippocampal_topology_is_valid() {
        let t = Topology::hippocampal(&NetworkConfig::compact());
        assert!(t.validate().is_ok());
        assert_eq!(t.layers.len(), 10);
        assert_eq!(t.prjns.len(), 21);
    }

    #[test]
    fn class_sets_learning_parameters() {
        let rates = LearningRates::default();
        let p = PrjnSpec::new("A", "B", Connectivity::Full).class(PrjnClass::PPath, &rates);
        assert_eq!(p.lrate, rates.ppath);
        assert_eq!(p.hebb, PrjnClass::PPath.hebb());
    }

    #[test]
    fn duplicate_layers_are_rejected() {
        let t = Topology::new()
            .layer(LayerSpec::new("A", LayerKind::Hidden, Shape::flat(3)))
            .layer(LayerSpec::new("A", LayerKind::Hidden, Shape::flat(3)));
        assert!(matches!(t.validate(), Err(EngineError::Topology(_))));
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let t = Topology::new()
            .layer(LayerSpec::new("A", LayerKind::Hidden, Shape::flat(3)))
            .connect(PrjnSpec::new("A", "B", Connectivity::Full));
        assert!(t.validate().is_err());
    }

    #[test]
    fn pool_to_pool_stays_within_pools() {
        let send = LayerSpec::new("S", LayerKind::Hidden, Shape::pooled(3, 4));
        let recv = LayerSpec::new("R", LayerKind::Hidden, Shape::pooled(3, 2));
        let p = PrjnSpec::new("S", "R", Connectivity::PoolToPool);
        let lists = p.expand(&send, &recv, &mut Prng::new(1)).unwrap();
        assert_eq!(lists.len(), 6);
        assert_eq!(lists[0], vec![0, 1, 2, 3]);
        assert_eq!(lists[5], vec![8, 9, 10, 11]);
    }

    #[test]
    fn uniform_random_draws_fixed_fan_in() {
        let send = LayerSpec::new("S", LayerKind::Hidden, Shape::flat(40));
        let recv = LayerSpec::new("R", LayerKind::Hidden, Shape::flat(10));
        let p = PrjnSpec::new("S", "R", Connectivity::UniformRandom { p: 0.25 });
        let lists = p.expand(&send, &recv, &mut Prng::new(9)).unwrap();
        assert!(lists.iter().all(|s| s.len() == 10));

        // tiny probability still yields one sender
        let p = PrjnSpec::new("S", "R", Connectivity::UniformRandom { p: 0.001 });
        let lists = p.expand(&send, &recv, &mut Prng::new(9)).unwrap();
        assert!(lists.iter().all(|s| s.len() == 1));
    }

    #[test]
    fn one_to_one_needs_equal_sizes() {
        let send = LayerSpec::new("S", LayerKind::Hidden, Shape::flat(4));
        let recv = LayerSpec::new("R", LayerKind::Hidden, Shape::flat(5));
        let p = PrjnSpec::new("S", "R", Connectivity::OneToOne);
        assert!(p.expand(&send, &recv, &mut Prng::new(1)).is_err());
    }
}
