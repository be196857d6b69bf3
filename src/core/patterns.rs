//! Pattern tables.
//!
//! A table is a list of named rows; each row maps layer names to flat
//! patterns. The selected row serves as the [`PatternProvider`] of a trial.

use hashbrown::HashMap;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::gating::Region;
use crate::prng::Prng;
use crate::topology::EC_POOLS;
use crate::trial::PatternProvider;

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PatternRow {
    pub name: String,
    pub columns: HashMap<String, Vec<f32>>,
}

impl PatternRow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: HashMap::new(),
        }
    }

    pub fn with(mut self, layer: impl Into<String>, values: Vec<f32>) -> Self {
        self.columns.insert(layer.into(), values);
        self
    }

    pub fn get(&self, layer: &str) -> Option<&[f32]> {
        self.columns.get(layer).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PatternTable {
    pub name: String,
    pub rows: Vec<PatternRow>,
    #[cfg_attr(feature = "serde", serde(skip))]
    current: usize,
}

impl PatternTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            current: 0,
        }
    }

    pub fn push(&mut self, row: PatternRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Make row `i` the current one. Out-of-range indices wrap.
    pub fn select(&mut self, i: usize) {
        self.current = if self.rows.is_empty() { 0 } else { i % self.rows.len() };
    }

    pub fn current(&self) -> Option<&PatternRow> {
        self.rows.get(self.current)
    }

    /// Row visiting order for one epoch: a fresh permutation.
    pub fn permuted_order(&self, rng: &mut Prng) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        rng.shuffle(&mut order);
        order
    }

    #[cfg(feature = "serde")]
    pub fn from_json_str(s: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

impl PatternProvider for PatternTable {
    fn pattern(&self, layer: &str) -> Option<&[f32]> {
        self.current()?.get(layer)
    }
}

/// Synthetic paired associates over the six-pool EC layout.
///
/// Every item is a sparse pattern with `active` units on in each pool. With
/// `related` set, the two semantic pools (2 and 3) are drawn from a small set
/// of shared prototypes, so items overlap there. Test rows keep only the
/// `cue_pools` of the input.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PairedAssociates {
    pub items: usize,
    pub pool_units: usize,
    pub active: usize,
    pub related: bool,
    pub prototypes: usize,
    pub cue_pools: Vec<usize>,
}

impl Default for PairedAssociates {
    fn default() -> Self {
        Self {
            items: 10,
            pool_units: 49,
            active: 10,
            related: false,
            prototypes: 2,
            cue_pools: vec![0, 1, 4, 5],
        }
    }
}

impl PairedAssociates {
    pub fn for_pool_size(pool_units: usize) -> Self {
        Self {
            pool_units,
            active: (pool_units / 5).max(1),
            ..Self::default()
        }
    }

    /// Training and testing tables. Every row carries the same full pattern
    /// for Input, ECin, ECout and Output; test inputs are cued.
    pub fn generate(&self, rng: &mut Prng) -> (PatternTable, PatternTable) {
        let n = self.pool_units;
        let semantic: Vec<Vec<Vec<usize>>> = (0..self.prototypes.max(1))
            .map(|_| (0..2).map(|_| rng.sample_indices(n, self.active)).collect())
            .collect();

        let mut train = PatternTable::new("train");
        let mut test = PatternTable::new("test");
        for item in 0..self.items {
            let mut full = vec![0.0f32; EC_POOLS * n];
            for pool in 0..EC_POOLS {
                let on = match pool {
                    2 | 3 if self.related => semantic[item % semantic.len()][pool - 2].clone(),
                    _ => rng.sample_indices(n, self.active),
                };
                for u in on {
                    full[pool * n + u] = 1.0;
                }
            }
            let mut cue = full.clone();
            for pool in (0..EC_POOLS).filter(|p| !self.cue_pools.contains(p)) {
                cue[pool * n..(pool + 1) * n].fill(0.0);
            }

            let name = format!("item{item}");
            train.push(Self::row(&name, full.clone(), full.clone()));
            test.push(Self::row(&name, cue, full));
        }
        (train, test)
    }

    fn row(name: &str, input: Vec<f32>, full: Vec<f32>) -> PatternRow {
        PatternRow::new(name)
            .with(Region::Input.name(), input)
            .with(Region::ECin.name(), full.clone())
            .with(Region::ECout.name(), full.clone())
            .with(Region::Output.name(), full)
    }
}
