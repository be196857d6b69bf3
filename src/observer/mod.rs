use crate::engine::{LayerId, LayerKind, NetworkEngine, Time, UnitChannel};
use crate::error::EngineError;
use crate::scheduler::ViewObserver;

/// A read-only snapshot of what the network is doing.
///
/// Design intent:
/// - Observers cannot mutate or steer the network.
/// - Snapshotting is on-demand and can allocate; the cycle loop stays unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSnapshot {
    pub time: Time,
    pub layers: Vec<LayerSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerSnapshot {
    pub name: String,
    pub kind: LayerKind,
    pub off: bool,
    pub mean_act: f32,
    pub max_act: f32,
    pub pool_avg: Vec<f32>,
}

pub struct NetworkAdapter<'a> {
    engine: &'a dyn NetworkEngine,
}

impl<'a> NetworkAdapter<'a> {
    pub fn new(engine: &'a dyn NetworkEngine) -> Self {
        Self { engine }
    }

    pub fn snapshot(&self, time: Time) -> Result<NetworkSnapshot, EngineError> {
        let mut act = Vec::new();
        let mut layers = Vec::with_capacity(self.engine.layer_count());
        for i in 0..self.engine.layer_count() {
            let id = LayerId::new(i);
            self.engine.unit_values(id, UnitChannel::Act, &mut act)?;
            let mut pool_avg = Vec::new();
            self.engine.pool_averages(id, &mut pool_avg)?;
            layers.push(LayerSnapshot {
                name: self.engine.layer_name(id)?.to_string(),
                kind: self.engine.layer_kind(id)?,
                off: self.engine.layer_off(id)?,
                mean_act: mean(&act),
                max_act: act.iter().copied().fold(0.0, f32::max),
                pool_avg,
            });
        }
        Ok(NetworkSnapshot { time, layers })
    }
}

fn mean(v: &[f32]) -> f32 {
    if v.is_empty() {
        0.0
    } else {
        v.iter().sum::<f32>() / v.len() as f32
    }
}

/// Activations of the watched layers at one testing cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRow {
    pub total_cycles: u64,
    pub quarter: usize,
    pub cycle: usize,
    /// One vector per watched layer, in watch order.
    pub acts: Vec<Vec<f32>>,
}

/// Per-cycle activation log of testing trials.
///
/// Rows accumulate across trials until [`clear`](Self::clear).
#[derive(Debug, Clone, Default)]
pub struct CycleLog {
    watch: Vec<LayerId>,
    rows: Vec<CycleRow>,
    /// Snapshots taken at the configured view granularity.
    pub snapshots: Vec<NetworkSnapshot>,
}

impl CycleLog {
    pub fn new(watch: Vec<LayerId>) -> Self {
        Self {
            watch,
            rows: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[CycleRow] {
        &self.rows
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.snapshots.clear();
    }
}

impl ViewObserver for CycleLog {
    fn update(&mut self, engine: &dyn NetworkEngine, time: &Time, _train: bool) {
        if let Ok(s) = NetworkAdapter::new(engine).snapshot(*time) {
            self.snapshots.push(s);
        }
    }

    fn test_cycle(&mut self, engine: &dyn NetworkEngine, time: &Time) {
        let acts = self
            .watch
            .iter()
            .map(|&id| {
                let mut v = Vec::new();
                // An invalid handle logs an empty vector.
                let _ = engine.unit_values(id, UnitChannel::Act, &mut v);
                v
            })
            .collect();
        self.rows.push(CycleRow {
            total_cycles: time.total_cycles,
            quarter: time.quarter,
            cycle: time.cycle,
            acts,
        });
    }
}
