//! Rate-coded reference engine.
//!
//! A small network: every unit carries a rate activation driven
//! by scaled net input minus pool inhibition through an `x / (x + 1)` rate
//! function. Learning is a contrastive (plus minus minus) delta with an
//! optional Hebbian share, accumulated then applied at trial end.
//!
//! Connections are stored per projection in receiver-major CSR form, like a
//! compressed sparse row matrix: the senders of receiver `r` are
//! `senders[offsets[r]..offsets[r + 1]]`.

use std::io::{self, Read, Write};

use hashbrown::HashMap;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::NetworkConfig;
use crate::engine::{LayerId, LayerKind, NetworkEngine, PrjnGate, PrjnId, Time, UnitChannel};
use crate::error::EngineError;
use crate::prng::Prng;
use crate::storage::{LayerRecord, PrjnRecord, WeightImage};
use crate::topology::{PrjnClass, Shape, Topology};

#[derive(Debug, Clone, Copy)]
struct Dynamics {
    dt: f32,
    gain: f32,
    fb_gain: f32,
}

#[derive(Debug, Clone)]
struct Layer {
    name: String,
    kind: LayerKind,
    baseline_kind: LayerKind,
    off: bool,
    shape: Shape,
    gi: f32,

    act: Vec<f32>,
    act_q1: Vec<f32>,
    act_m: Vec<f32>,
    act_p: Vec<f32>,
    targ: Vec<f32>,
    ext: Vec<f32>,
    has_ext: bool,

    /// Running average activation per pool (plus phase).
    pool_avg: Vec<f32>,
    recv_prjns: Vec<usize>,
}

impl Layer {
    fn len(&self) -> usize {
        self.act.len()
    }

    fn mean_pool_avg(&self) -> f32 {
        if self.pool_avg.is_empty() {
            return 0.0;
        }
        self.pool_avg.iter().sum::<f32>() / self.pool_avg.len() as f32
    }

    fn update(&mut self, netin: &[f32], plus: bool, d: Dynamics) {
        if self.off {
            return;
        }
        if self.has_ext {
            match self.kind {
                LayerKind::Input => {
                    self.act.copy_from_slice(&self.ext);
                    return;
                }
                LayerKind::Target if plus => {
                    self.act.copy_from_slice(&self.targ);
                    return;
                }
                _ => {}
            }
        }
        for pool in 0..self.shape.pools {
            let range = self.shape.pool_range(pool);
            let n = range.len() as f32;
            let ff = netin[range.clone()].iter().sum::<f32>() / n;
            let fb = self.act[range.clone()].iter().sum::<f32>() / n;
            let g_i = self.gi * ff + d.fb_gain * fb;
            for i in range {
                let x = (netin[i] - g_i).max(0.0) * d.gain;
                let target = x / (x + 1.0);
                self.act[i] += d.dt * (target - self.act[i]);
            }
        }
    }

    /// Forget everything a trial leaves behind.
    fn clear_activity(&mut self) {
        for v in [
            &mut self.act,
            &mut self.act_q1,
            &mut self.act_m,
            &mut self.act_p,
            &mut self.targ,
            &mut self.ext,
        ] {
            v.fill(0.0);
        }
        self.has_ext = false;
    }

    fn channel(&self, channel: UnitChannel) -> &[f32] {
        match channel {
            UnitChannel::Act => &self.act,
            UnitChannel::ActQ1 => &self.act_q1,
            UnitChannel::ActM => &self.act_m,
            UnitChannel::ActP => &self.act_p,
            UnitChannel::Targ => &self.targ,
            UnitChannel::Ext => &self.ext,
        }
    }
}

#[derive(Debug, Clone)]
struct Projection {
    send: usize,
    recv: usize,
    class: PrjnClass,
    gate: PrjnGate,
    baseline: PrjnGate,
    lrate: f32,
    hebb: f32,

    offsets: Vec<u32>,
    senders: Vec<u32>,
    weights: Vec<f32>,
    dwt: Vec<f32>,

    /// Net-input multiplier from abs, normalised rel and expected sender activity.
    scale: f32,
}

impl Projection {
    #[inline]
    fn span(&self, r: usize) -> std::ops::Range<usize> {
        self.offsets[r] as usize..self.offsets[r + 1] as usize
    }

    fn mean_fan_in(&self) -> f32 {
        let n_recv = self.offsets.len().saturating_sub(1);
        if n_recv == 0 {
            return 0.0;
        }
        self.senders.len() as f32 / n_recv as f32
    }

    fn accumulate_dwt(&mut self, send: &Layer, recv: &Layer) {
        // EC -> CA1 contrasts against the end of quarter 0 instead of the
        // minus phase.
        let (send_minus, recv_minus) = match self.class {
            PrjnClass::EcCa1 => (&send.act_q1, &recv.act_q1),
            _ => (&send.act_m, &recv.act_m),
        };
        let h = self.hebb;
        for r in 0..recv.len() {
            let y_p = recv.act_p[r];
            let y_m = recv_minus[r];
            for k in self.span(r) {
                let s = self.senders[k] as usize;
                let x_p = send.act_p[s];
                let x_m = send_minus[s];
                let err = x_p * y_p - x_m * y_m;
                let hebb = y_p * (x_p - self.weights[k]);
                let delta = self.lrate * ((1.0 - h) * err + h * hebb);
                self.dwt[k] += delta;
            }
        }
    }
}

fn layer_netin(li: usize, out: &mut [f32], layers: &[Layer], prjns: &[Projection]) {
    out.fill(0.0);
    let layer = &layers[li];
    if layer.off {
        return;
    }
    for &pi in &layer.recv_prjns {
        let p = &prjns[pi];
        if p.gate.off || p.scale == 0.0 {
            continue;
        }
        let send = &layers[p.send];
        if send.off {
            continue;
        }
        for (r, net) in out.iter_mut().enumerate() {
            let mut sum = 0.0f32;
            for k in p.span(r) {
                sum += p.weights[k] * send.act[p.senders[k] as usize];
            }
            *net += p.scale * sum;
        }
    }
}

/// The crate's reference [`NetworkEngine`].
#[derive(Debug, Clone)]
pub struct RateNetwork {
    layers: Vec<Layer>,
    prjns: Vec<Projection>,
    netin: Vec<Vec<f32>>,
    layer_index: HashMap<String, usize>,
    prjn_index: HashMap<(usize, usize), usize>,
    dynamics: Dynamics,
    decay: f32,
    avg_dt: f32,
}

impl RateNetwork {
    /// Build from a topology. Weights are drawn uniformly in
    /// `mean ± var` (clipped to [0, 1]) from streams forked off `seed`.
    pub fn build(topology: &Topology, cfg: &NetworkConfig, seed: u64) -> Result<Self, EngineError> {
        topology.validate()?;

        let mut layer_index = HashMap::with_capacity(topology.layers.len());
        let mut layers = Vec::with_capacity(topology.layers.len());
        for (i, spec) in topology.layers.iter().enumerate() {
            let n = spec.shape.len();
            layer_index.insert(spec.name.clone(), i);
            layers.push(Layer {
                name: spec.name.clone(),
                kind: spec.kind,
                baseline_kind: spec.kind,
                off: false,
                shape: spec.shape,
                gi: spec.gi,
                act: vec![0.0; n],
                act_q1: vec![0.0; n],
                act_m: vec![0.0; n],
                act_p: vec![0.0; n],
                targ: vec![0.0; n],
                ext: vec![0.0; n],
                has_ext: false,
                pool_avg: vec![spec.act_avg; spec.shape.pools],
                recv_prjns: Vec::new(),
            });
        }

        let mut rng = Prng::new(seed);
        let mut prjn_index = HashMap::with_capacity(topology.prjns.len());
        let mut prjns = Vec::with_capacity(topology.prjns.len());
        for (pi, spec) in topology.prjns.iter().enumerate() {
            let mut stream = rng.fork(pi as u64);
            // validate() guarantees both endpoints exist.
            let (si, ri) = match (layer_index.get(&spec.send), layer_index.get(&spec.recv)) {
                (Some(&s), Some(&r)) => (s, r),
                _ => return Err(EngineError::Topology(format!("{} -> {}", spec.send, spec.recv))),
            };
            let lists = spec.expand(&topology.layers[si], &topology.layers[ri], &mut stream)?;

            let mut offsets = Vec::with_capacity(lists.len() + 1);
            let mut senders = Vec::new();
            offsets.push(0u32);
            for list in &lists {
                senders.extend(list.iter().map(|&s| s as u32));
                offsets.push(senders.len() as u32);
            }
            let weights: Vec<f32> = (0..senders.len())
                .map(|_| {
                    let w = spec.wt_mean + stream.gen_range_f32(-spec.wt_var, spec.wt_var);
                    w.clamp(0.0, 1.0)
                })
                .collect();

            prjn_index.insert((si, ri), pi);
            layers[ri].recv_prjns.push(pi);
            prjns.push(Projection {
                send: si,
                recv: ri,
                class: spec.class,
                gate: spec.gate,
                baseline: spec.gate,
                lrate: spec.lrate,
                hebb: spec.hebb,
                dwt: vec![0.0; weights.len()],
                offsets,
                senders,
                weights,
                scale: 0.0,
            });
        }

        let netin = layers.iter().map(|l| vec![0.0; l.len()]).collect();
        let mut net = Self {
            layers,
            prjns,
            netin,
            layer_index,
            prjn_index,
            dynamics: Dynamics {
                dt: cfg.dt,
                gain: cfg.gain,
                fb_gain: cfg.fb_gain,
            },
            decay: cfg.decay,
            avg_dt: cfg.avg_dt,
        };
        net.rescale();
        Ok(net)
    }

    /// The hippocampal reference model.
    pub fn hippocampal(cfg: &NetworkConfig, seed: u64) -> Result<Self, EngineError> {
        Self::build(&Topology::hippocampal(cfg), cfg, seed)
    }

    fn layer(&self, id: LayerId) -> Result<&Layer, EngineError> {
        self.layers.get(id.index()).ok_or(EngineError::InvalidLayer(id.index()))
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer, EngineError> {
        self.layers
            .get_mut(id.index())
            .ok_or(EngineError::InvalidLayer(id.index()))
    }

    fn prjn(&self, id: PrjnId) -> Result<&Projection, EngineError> {
        self.prjns
            .get(id.index())
            .ok_or(EngineError::InvalidProjection(id.index()))
    }

    /// Total number of connections.
    pub fn synapse_count(&self) -> usize {
        self.prjns.iter().map(|p| p.weights.len()).sum()
    }

    /// Snapshot of all learned state.
    pub fn weight_image(&self) -> WeightImage {
        WeightImage {
            layers: self
                .layers
                .iter()
                .map(|l| LayerRecord {
                    name: l.name.clone(),
                    units: l.len(),
                    pool_avg: l.pool_avg.clone(),
                })
                .collect(),
            prjns: self
                .prjns
                .iter()
                .map(|p| PrjnRecord {
                    send: self.layers[p.send].name.clone(),
                    recv: self.layers[p.recv].name.clone(),
                    weights: p.weights.clone(),
                })
                .collect(),
        }
    }

    /// Restore learned state. The image must come from a network of the same
    /// topology; it is checked completely before anything is written.
    ///
    /// Activations and external input are cleared, so a restored network
    /// replays identically whatever it ran before.
    pub fn restore(&mut self, image: &WeightImage) -> io::Result<()> {
        let bad = |msg: String| io::Error::new(io::ErrorKind::InvalidData, msg);

        if image.layers.len() != self.layers.len() {
            return Err(bad(format!(
                "image has {} layers, network has {}",
                image.layers.len(),
                self.layers.len()
            )));
        }
        for (rec, l) in image.layers.iter().zip(&self.layers) {
            if rec.name != l.name
                || rec.units != l.len()
                || rec.pool_avg.len() != l.pool_avg.len()
            {
                return Err(bad(format!("layer `{}` does not match image", l.name)));
            }
        }
        if image.prjns.len() != self.prjns.len() {
            return Err(bad(format!(
                "image has {} projections, network has {}",
                image.prjns.len(),
                self.prjns.len()
            )));
        }
        for (rec, p) in image.prjns.iter().zip(&self.prjns) {
            let (send, recv) = (&self.layers[p.send].name, &self.layers[p.recv].name);
            if &rec.send != send || &rec.recv != recv || rec.weights.len() != p.weights.len() {
                return Err(bad(format!("projection {send} -> {recv} does not match image")));
            }
        }

        for (rec, l) in image.layers.iter().zip(self.layers.iter_mut()) {
            l.pool_avg.copy_from_slice(&rec.pool_avg);
            l.clear_activity();
        }
        for (rec, p) in image.prjns.iter().zip(self.prjns.iter_mut()) {
            p.weights.copy_from_slice(&rec.weights);
            p.dwt.fill(0.0);
        }
        self.rescale();
        Ok(())
    }

    fn compute_netins(&mut self) {
        let layers = &self.layers;
        let prjns = &self.prjns;
        #[cfg(feature = "parallel")]
        self.netin
            .par_iter_mut()
            .enumerate()
            .for_each(|(li, buf)| layer_netin(li, buf, layers, prjns));
        #[cfg(not(feature = "parallel"))]
        self.netin
            .iter_mut()
            .enumerate()
            .for_each(|(li, buf)| layer_netin(li, buf, layers, prjns));
    }

    fn update_acts(&mut self, plus: bool) {
        let d = self.dynamics;
        #[cfg(feature = "parallel")]
        self.layers
            .par_iter_mut()
            .zip(self.netin.par_iter())
            .for_each(|(l, net)| l.update(net, plus, d));
        #[cfg(not(feature = "parallel"))]
        self.layers
            .iter_mut()
            .zip(self.netin.iter())
            .for_each(|(l, net)| l.update(net, plus, d));
    }
}

impl NetworkEngine for RateNetwork {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn prjn_count(&self) -> usize {
        self.prjns.len()
    }

    fn layer_id(&self, name: &str) -> Option<LayerId> {
        self.layer_index.get(name).map(|&i| LayerId::new(i))
    }

    fn prjn_id(&self, send: &str, recv: &str) -> Option<PrjnId> {
        let s = *self.layer_index.get(send)?;
        let r = *self.layer_index.get(recv)?;
        self.prjn_index.get(&(s, r)).map(|&i| PrjnId::new(i))
    }

    fn layer_name(&self, layer: LayerId) -> Result<&str, EngineError> {
        Ok(&self.layer(layer)?.name)
    }

    fn layer_len(&self, layer: LayerId) -> Result<usize, EngineError> {
        Ok(self.layer(layer)?.len())
    }

    fn layer_off(&self, layer: LayerId) -> Result<bool, EngineError> {
        Ok(self.layer(layer)?.off)
    }

    fn set_layer_off(&mut self, layer: LayerId, off: bool) -> Result<(), EngineError> {
        self.layer_mut(layer)?.off = off;
        Ok(())
    }

    fn layer_kind(&self, layer: LayerId) -> Result<LayerKind, EngineError> {
        Ok(self.layer(layer)?.kind)
    }

    fn set_layer_kind(&mut self, layer: LayerId, kind: LayerKind) -> Result<(), EngineError> {
        self.layer_mut(layer)?.kind = kind;
        Ok(())
    }

    fn baseline_layer_kind(&self, layer: LayerId) -> Result<LayerKind, EngineError> {
        Ok(self.layer(layer)?.baseline_kind)
    }

    fn prjn_gate(&self, prjn: PrjnId) -> Result<PrjnGate, EngineError> {
        Ok(self.prjn(prjn)?.gate)
    }

    fn set_prjn_gate(&mut self, prjn: PrjnId, gate: PrjnGate) -> Result<(), EngineError> {
        self.prjns
            .get_mut(prjn.index())
            .ok_or(EngineError::InvalidProjection(prjn.index()))?
            .gate = gate;
        Ok(())
    }

    fn baseline_prjn_gate(&self, prjn: PrjnId) -> Result<PrjnGate, EngineError> {
        Ok(self.prjn(prjn)?.baseline)
    }

    fn init_ext(&mut self) {
        for l in &mut self.layers {
            l.ext.fill(0.0);
            l.targ.fill(0.0);
            l.has_ext = false;
        }
    }

    fn apply_ext(&mut self, layer: LayerId, values: &[f32]) -> Result<(), EngineError> {
        let l = self.layer_mut(layer)?;
        if values.len() != l.len() {
            return Err(EngineError::ShapeMismatch {
                layer: l.name.clone(),
                expected: l.len(),
                got: values.len(),
            });
        }
        l.ext.copy_from_slice(values);
        l.targ.copy_from_slice(values);
        l.has_ext = true;
        Ok(())
    }

    fn alpha_cyc_init(&mut self) {
        let keep = 1.0 - self.decay;
        for l in &mut self.layers {
            if l.off {
                l.act.fill(0.0);
            } else {
                l.act.iter_mut().for_each(|a| *a *= keep);
            }
        }
        self.rescale();
    }

    fn cycle(&mut self, time: &Time) {
        self.compute_netins();
        self.update_acts(time.plus_phase());
    }

    fn quarter_final(&mut self, time: &Time) {
        let avg_dt = self.avg_dt;
        for l in &mut self.layers {
            match time.quarter {
                0 => l.act_q1.copy_from_slice(&l.act),
                2 => l.act_m.copy_from_slice(&l.act),
                3 => {
                    l.act_p.copy_from_slice(&l.act);
                    if !l.off {
                        for pool in 0..l.shape.pools {
                            let range = l.shape.pool_range(pool);
                            let n = range.len() as f32;
                            let mean = l.act[range].iter().sum::<f32>() / n;
                            l.pool_avg[pool] += avg_dt * (mean - l.pool_avg[pool]);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn rescale(&mut self) {
        for ri in 0..self.layers.len() {
            let recv = &self.layers[ri];
            let live = |p: &Projection| !p.gate.off && !self.layers[p.send].off;
            let sum_rel: f32 = recv
                .recv_prjns
                .iter()
                .map(|&pi| &self.prjns[pi])
                .filter(|p| live(p))
                .map(|p| p.gate.rel)
                .sum();

            let scales: Vec<(usize, f32)> = recv
                .recv_prjns
                .iter()
                .map(|&pi| {
                    let p = &self.prjns[pi];
                    if !live(p) || sum_rel <= 0.0 {
                        return (pi, 0.0);
                    }
                    let expected = (p.mean_fan_in() * self.layers[p.send].mean_pool_avg()).max(1.0);
                    (pi, p.gate.abs * (p.gate.rel / sum_rel) / expected)
                })
                .collect();
            for (pi, s) in scales {
                self.prjns[pi].scale = s;
            }
        }
    }

    fn dwt(&mut self) {
        let layers = &self.layers;
        let plastic = |p: &Projection| {
            p.gate.learn && !p.gate.off && !layers[p.send].off && !layers[p.recv].off
        };
        #[cfg(feature = "parallel")]
        self.prjns
            .par_iter_mut()
            .filter(|p| plastic(p))
            .for_each(|p| {
                let (s, r) = (p.send, p.recv);
                p.accumulate_dwt(&layers[s], &layers[r]);
            });
        #[cfg(not(feature = "parallel"))]
        self.prjns
            .iter_mut()
            .filter(|p| plastic(p))
            .for_each(|p| {
                let (s, r) = (p.send, p.recv);
                p.accumulate_dwt(&layers[s], &layers[r]);
            });
    }

    fn wt_from_dwt(&mut self) {
        for p in &mut self.prjns {
            for (w, dw) in p.weights.iter_mut().zip(p.dwt.iter_mut()) {
                if *dw != 0.0 {
                    *w = (*w + *dw).clamp(0.0, 1.0);
                    *dw = 0.0;
                }
            }
        }
    }

    fn max_abs_dwt(&self, prjn: PrjnId) -> Result<f32, EngineError> {
        Ok(self.prjn(prjn)?.dwt.iter().fold(0.0f32, |m, d| m.max(d.abs())))
    }

    fn unit_values(
        &self,
        layer: LayerId,
        channel: UnitChannel,
        out: &mut Vec<f32>,
    ) -> Result<(), EngineError> {
        let l = self.layer(layer)?;
        out.clear();
        out.extend_from_slice(l.channel(channel));
        Ok(())
    }

    fn pool_averages(&self, layer: LayerId, out: &mut Vec<f32>) -> Result<(), EngineError> {
        let l = self.layer(layer)?;
        out.clear();
        out.extend_from_slice(&l.pool_avg);
        Ok(())
    }

    fn save_weights(&self, w: &mut dyn Write) -> io::Result<()> {
        self.weight_image().write_to(w)
    }

    fn load_weights(&mut self, r: &mut dyn Read) -> io::Result<()> {
        let image = WeightImage::read_from(r)?;
        self.restore(&image)
    }
}
