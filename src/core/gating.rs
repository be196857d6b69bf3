//! Mode gating policy.
//!
//! Every simulation mode is a [`ModeConfiguration`]: the baseline gate of every
//! region and pathway of the circuit, overridden by the mode, plus a
//! [`QuarterSchedule`] of strength changes and clamps at quarter boundaries.
//! Applying a configuration writes every attribute, so nothing set by a
//! previous mode survives and re-applying is idempotent.
//!
//! The schedule is plain data; the alpha-cycle scheduler interprets it.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::{LayerId, LayerKind, NetworkEngine, PrjnGate, PrjnId};
use crate::error::{ConfigError, EngineError};

/// Cognitive mode of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Mode {
    /// Hippocampal encoding; cortex disabled.
    Encode,
    /// Consolidation: every region on, cortex and hippocampus plastic.
    Sleep,
    /// Sleep gating without the DG -> CA3 recall suppression.
    Daydream,
    /// Semantic pathway only.
    SemanticPretrain,
    /// Cortex, letter and output; the entorhinal path disabled.
    CortexOnly,
    /// Whole network with CA1 driven by CA3 throughout; cortex plastic
    /// (retrieval practice when training).
    FullTest,
    /// Hippocampal recall path with CA1 driven by CA3 throughout.
    PureRetrieval,
}

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Encode,
        Mode::Sleep,
        Mode::Daydream,
        Mode::SemanticPretrain,
        Mode::CortexOnly,
        Mode::FullTest,
        Mode::PureRetrieval,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Mode::Encode => "Encode",
            Mode::Sleep => "Sleep",
            Mode::Daydream => "Daydream",
            Mode::SemanticPretrain => "SemanticPretrain",
            Mode::CortexOnly => "CortexOnly",
            Mode::FullTest => "FullTest",
            Mode::PureRetrieval => "PureRetrieval",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownMode(s.to_string()))
    }
}

/// Tunable constants of the gating policy.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GatingParams {
    /// Semantic -> ECin strength while awake, in percent.
    pub sem_wake: f32,
    /// Output -> ECin back-projection strength.
    pub out_ec_back: f32,
    /// DG -> CA3 relative strength during recall (testing, FullTest, PureRetrieval).
    pub recall_dg_rel: f32,
}

impl Default for GatingParams {
    fn default() -> Self {
        Self {
            sem_wake: 6.0,
            out_ec_back: 1.0,
            recall_dg_rel: 1.0,
        }
    }
}

impl GatingParams {
    /// Relative Semantic -> ECin strength while awake.
    pub fn sem_rel(&self) -> f32 {
        self.sem_wake / 100.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for v in [self.sem_wake, self.out_ec_back, self.recall_dg_rel] {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::Invalid("gating parameters must be finite and >= 0"));
            }
        }
        Ok(())
    }
}

/// Regions the policy gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Region {
    Input,
    ECin,
    ECout,
    CA1,
    CA3,
    DG,
    Cortex,
    Letter,
    Semantic,
    Output,
}

impl Region {
    pub const COUNT: usize = 10;
    pub const ALL: [Region; Self::COUNT] = [
        Region::Input,
        Region::ECin,
        Region::ECout,
        Region::CA1,
        Region::CA3,
        Region::DG,
        Region::Cortex,
        Region::Letter,
        Region::Semantic,
        Region::Output,
    ];

    /// Layer name in the engine.
    pub fn name(self) -> &'static str {
        match self {
            Region::Input => "Input",
            Region::ECin => "ECin",
            Region::ECout => "ECout",
            Region::CA1 => "CA1",
            Region::CA3 => "CA3",
            Region::DG => "DG",
            Region::Cortex => "Cortex",
            Region::Letter => "Letter",
            Region::Semantic => "Semantic",
            Region::Output => "Output",
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Projections the policy gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Pathway {
    InputToEcin,
    EcoutToEcin,
    EcoutToOutput,
    OutputToEcin,
    InputToCortex,
    InputToLetter,
    InputToSemantic,
    CortexToOutput,
    OutputToCortex,
    LetterToOutput,
    OutputToLetter,
    SemanticToEcin,
    EcinToSemantic,
    EcinToCa1,
    Ca1ToEcout,
    EcoutToCa1,
    EcinToDg,
    EcinToCa3,
    Ca3ToCa3,
    DgToCa3,
    Ca3ToCa1,
}

impl Pathway {
    pub const COUNT: usize = 21;
    pub const ALL: [Pathway; Self::COUNT] = [
        Pathway::InputToEcin,
        Pathway::EcoutToEcin,
        Pathway::EcoutToOutput,
        Pathway::OutputToEcin,
        Pathway::InputToCortex,
        Pathway::InputToLetter,
        Pathway::InputToSemantic,
        Pathway::CortexToOutput,
        Pathway::OutputToCortex,
        Pathway::LetterToOutput,
        Pathway::OutputToLetter,
        Pathway::SemanticToEcin,
        Pathway::EcinToSemantic,
        Pathway::EcinToCa1,
        Pathway::Ca1ToEcout,
        Pathway::EcoutToCa1,
        Pathway::EcinToDg,
        Pathway::EcinToCa3,
        Pathway::Ca3ToCa3,
        Pathway::DgToCa3,
        Pathway::Ca3ToCa1,
    ];

    /// The hippocampal projections plastic during encoding.
    pub const HIPPOCAMPAL: [Pathway; 7] = [
        Pathway::EcoutToCa1,
        Pathway::Ca3ToCa3,
        Pathway::Ca3ToCa1,
        Pathway::Ca1ToEcout,
        Pathway::EcinToCa3,
        Pathway::EcinToDg,
        Pathway::EcinToCa1,
    ];

    /// Cortex / letter to and from output.
    pub const CORTICAL: [Pathway; 4] = [
        Pathway::OutputToLetter,
        Pathway::OutputToCortex,
        Pathway::CortexToOutput,
        Pathway::LetterToOutput,
    ];

    pub const SEMANTIC: [Pathway; 3] = [
        Pathway::SemanticToEcin,
        Pathway::InputToSemantic,
        Pathway::EcinToSemantic,
    ];

    /// `(sender, receiver)`.
    pub fn endpoints(self) -> (Region, Region) {
        use Region::*;
        match self {
            Pathway::InputToEcin => (Input, ECin),
            Pathway::EcoutToEcin => (ECout, ECin),
            Pathway::EcoutToOutput => (ECout, Output),
            Pathway::OutputToEcin => (Output, ECin),
            Pathway::InputToCortex => (Input, Cortex),
            Pathway::InputToLetter => (Input, Letter),
            Pathway::InputToSemantic => (Input, Semantic),
            Pathway::CortexToOutput => (Cortex, Output),
            Pathway::OutputToCortex => (Output, Cortex),
            Pathway::LetterToOutput => (Letter, Output),
            Pathway::OutputToLetter => (Output, Letter),
            Pathway::SemanticToEcin => (Semantic, ECin),
            Pathway::EcinToSemantic => (ECin, Semantic),
            Pathway::EcinToCa1 => (ECin, CA1),
            Pathway::Ca1ToEcout => (CA1, ECout),
            Pathway::EcoutToCa1 => (ECout, CA1),
            Pathway::EcinToDg => (ECin, DG),
            Pathway::EcinToCa3 => (ECin, CA3),
            Pathway::Ca3ToCa3 => (CA3, CA3),
            Pathway::DgToCa3 => (DG, CA3),
            Pathway::Ca3ToCa1 => (CA3, CA1),
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Kinds and gates the engine was built with.
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    pub kinds: [LayerKind; Region::COUNT],
    pub gates: [PrjnGate; Pathway::COUNT],
}

impl Baseline {
    pub fn gate(&self, p: Pathway) -> PrjnGate {
        self.gates[p.index()]
    }

    pub fn kind(&self, r: Region) -> LayerKind {
        self.kinds[r.index()]
    }
}

/// Regions and pathways resolved to engine handles, once.
#[derive(Debug, Clone, PartialEq)]
pub struct Circuit {
    layers: [LayerId; Region::COUNT],
    prjns: [PrjnId; Pathway::COUNT],
    baseline: Baseline,
}

impl Circuit {
    /// Resolve every region and pathway by name and capture the engine's
    /// baseline gating.
    pub fn resolve(engine: &dyn NetworkEngine) -> Result<Self, ConfigError> {
        let mut layers = [LayerId::new(0); Region::COUNT];
        let mut kinds = [LayerKind::Hidden; Region::COUNT];
        for r in Region::ALL {
            let unknown = || ConfigError::UnknownLayer(r.name().to_string());
            let id = engine.layer_id(r.name()).ok_or_else(unknown)?;
            layers[r.index()] = id;
            kinds[r.index()] = engine.baseline_layer_kind(id).map_err(|_| unknown())?;
        }

        let mut prjns = [PrjnId::new(0); Pathway::COUNT];
        let mut gates = [PrjnGate::default(); Pathway::COUNT];
        for p in Pathway::ALL {
            let (send, recv) = p.endpoints();
            let unknown = || ConfigError::UnknownProjection {
                send: send.name().to_string(),
                recv: recv.name().to_string(),
            };
            let id = engine.prjn_id(send.name(), recv.name()).ok_or_else(unknown)?;
            prjns[p.index()] = id;
            gates[p.index()] = engine.baseline_prjn_gate(id).map_err(|_| unknown())?;
        }

        Ok(Self {
            layers,
            prjns,
            baseline: Baseline { kinds, gates },
        })
    }

    #[inline]
    pub fn layer(&self, r: Region) -> LayerId {
        self.layers[r.index()]
    }

    #[inline]
    pub fn prjn(&self, p: Pathway) -> PrjnId {
        self.prjns[p.index()]
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }
}

/// Which strength scalar a reassignment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Rel,
    Abs,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Level {
    Fixed(f32),
    /// The pathway's baseline value.
    Baseline,
}

/// One strength change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reassign {
    pub pathway: Pathway,
    pub scale: Scale,
    pub level: Level,
}

impl Reassign {
    pub const fn rel(pathway: Pathway, v: f32) -> Self {
        Self {
            pathway,
            scale: Scale::Rel,
            level: Level::Fixed(v),
        }
    }

    pub const fn abs(pathway: Pathway, v: f32) -> Self {
        Self {
            pathway,
            scale: Scale::Abs,
            level: Level::Fixed(v),
        }
    }

    pub const fn rel_baseline(pathway: Pathway) -> Self {
        Self {
            pathway,
            scale: Scale::Rel,
            level: Level::Baseline,
        }
    }

    pub fn value(&self, baseline: &Baseline) -> f32 {
        match self.level {
            Level::Fixed(v) => v,
            Level::Baseline => {
                let g = baseline.gate(self.pathway);
                match self.scale {
                    Scale::Rel => g.rel,
                    Scale::Abs => g.abs,
                }
            }
        }
    }

    pub fn apply(
        &self,
        engine: &mut dyn NetworkEngine,
        circuit: &Circuit,
    ) -> Result<(), EngineError> {
        let id = circuit.prjn(self.pathway);
        let v = self.value(circuit.baseline());
        match self.scale {
            Scale::Rel => engine.set_prjn_rel(id, v),
            Scale::Abs => engine.set_prjn_abs(id, v),
        }
    }
}

/// Copy `from`'s activation onto `to` as external input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clamp {
    pub from: Region,
    pub to: Region,
}

/// Actions at one point of the alpha cycle.
///
/// `quarter == 0` runs before any cycling; `quarter == 1` / `3` run at the
/// boundary after quarter 0 / 2 has cycled.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub quarter: usize,
    pub reassign: Vec<Reassign>,
    pub rescale: bool,
    pub clamps: Vec<Clamp>,
}

impl ScheduleEntry {
    fn new(quarter: usize, reassign: Vec<Reassign>, rescale: bool) -> Self {
        Self {
            quarter,
            reassign,
            rescale,
            clamps: Vec::new(),
        }
    }

    fn with_clamps(mut self, clamps: Vec<Clamp>) -> Self {
        self.clamps = clamps;
        self
    }

    pub fn apply_strengths(
        &self,
        engine: &mut dyn NetworkEngine,
        circuit: &Circuit,
    ) -> Result<(), EngineError> {
        for r in &self.reassign {
            r.apply(engine, circuit)?;
        }
        if self.rescale {
            engine.rescale();
        }
        Ok(())
    }
}

/// Per-quarter strength schedule of one trial.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuarterSchedule {
    pub entries: Vec<ScheduleEntry>,
    /// Restores at the end of the trial.
    pub finish: Vec<Reassign>,
}

impl QuarterSchedule {
    /// Quarter indices at which entries may occur.
    pub const ENTRY_QUARTERS: [usize; 3] = [0, 1, 3];

    /// No strength changes at all.
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.entries.is_empty() && self.finish.is_empty()
    }

    pub fn entry(&self, quarter: usize) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| e.quarter == quarter)
    }

    /// Entries only at quarters 0, 1 and 3, at most one each, and clamps
    /// never before cycling starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, e) in self.entries.iter().enumerate() {
            if !Self::ENTRY_QUARTERS.contains(&e.quarter) {
                return Err(ConfigError::Invalid("schedule entries only at quarters 0, 1 and 3"));
            }
            if e.quarter == 0 && !e.clamps.is_empty() {
                return Err(ConfigError::Invalid("clamps only fire at quarter boundaries"));
            }
            if self.entries[..i].iter().any(|o| o.quarter == e.quarter) {
                return Err(ConfigError::Invalid("duplicate schedule entry"));
            }
        }
        Ok(())
    }

    /// Encode / Sleep / Daydream: CA1 listens to ECin in quarter 0 and in the
    /// plus phase, to CA3 in between.
    fn theta_flip(train: bool, params: &GatingParams, gate_dg: bool, rescale_first: bool) -> Self {
        use Pathway::*;
        let mut initial = vec![Reassign::abs(EcinToCa1, 1.0), Reassign::abs(Ca3ToCa1, 0.0)];
        let mut recall = vec![Reassign::abs(EcinToCa1, 0.0), Reassign::abs(Ca3ToCa1, 1.0)];
        let mut finish = Vec::new();
        if gate_dg {
            initial.push(Reassign::rel(DgToCa3, 0.0));
            recall.push(if train {
                Reassign::rel_baseline(DgToCa3)
            } else {
                Reassign::rel(DgToCa3, params.recall_dg_rel)
            });
            finish = vec![Reassign::rel_baseline(DgToCa3), Reassign::abs(Ca3ToCa1, 1.0)];
        }
        let plus = vec![Reassign::abs(EcinToCa1, 1.0), Reassign::abs(Ca3ToCa1, 0.0)];
        Self {
            entries: vec![
                ScheduleEntry::new(0, initial, rescale_first),
                ScheduleEntry::new(1, recall, true),
                ScheduleEntry::new(3, plus, true),
            ],
            finish,
        }
    }

    /// FullTest / PureRetrieval: CA1 driven by CA3 for the whole cycle.
    fn ca3_driven(params: &GatingParams) -> Self {
        use Pathway::*;
        Self {
            entries: vec![ScheduleEntry::new(
                0,
                vec![
                    Reassign::abs(EcinToCa1, 0.0),
                    Reassign::abs(Ca3ToCa1, 1.0),
                    Reassign::rel(DgToCa3, params.recall_dg_rel),
                ],
                false,
            )],
            finish: Vec::new(),
        }
    }

    fn clamp_at_plus(mut self, clamps: Vec<Clamp>) -> Self {
        if clamps.is_empty() {
            return self;
        }
        match self.entries.iter_mut().find(|e| e.quarter == 3) {
            Some(e) => e.clamps = clamps,
            None => self
                .entries
                .push(ScheduleEntry::new(3, Vec::new(), false).with_clamps(clamps)),
        }
        self
    }
}

/// Off flag and kind of one region for a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerGate {
    pub off: bool,
    pub kind: LayerKind,
}

/// Complete gating of the circuit for one (mode, train) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeConfiguration {
    pub mode: Mode,
    pub train: bool,
    layers: [LayerGate; Region::COUNT],
    pathways: [PrjnGate; Pathway::COUNT],
    pub schedule: QuarterSchedule,
    /// Regions whose patterns are requested from the pattern provider.
    pub inputs: Vec<Region>,
}

impl ModeConfiguration {
    pub fn build(mode: Mode, train: bool, baseline: &Baseline, params: &GatingParams) -> Self {
        let mut cfg = Self {
            mode,
            train,
            layers: baseline.kinds.map(|kind| LayerGate { off: false, kind }),
            pathways: baseline.gates.map(|g| PrjnGate { off: false, ..g }),
            schedule: QuarterSchedule::flat(),
            inputs: vec![Region::Input, Region::ECout, Region::ECin],
        };
        match mode {
            Mode::Encode => cfg.encode(params),
            Mode::Sleep => cfg.sleep(params, false),
            Mode::Daydream => cfg.sleep(params, true),
            Mode::SemanticPretrain => cfg.semantic_pretrain(params),
            Mode::CortexOnly => cfg.cortex_only(),
            Mode::FullTest => cfg.full_test(params),
            Mode::PureRetrieval => cfg.pure_retrieval(params),
        }
        cfg
    }

    pub fn layer(&self, r: Region) -> LayerGate {
        self.layers[r.index()]
    }

    pub fn pathway(&self, p: Pathway) -> PrjnGate {
        self.pathways[p.index()]
    }

    /// Write every region and pathway attribute, then the quarter-0 strengths.
    pub fn apply(
        &self,
        engine: &mut dyn NetworkEngine,
        circuit: &Circuit,
    ) -> Result<(), EngineError> {
        for r in Region::ALL {
            let id = circuit.layer(r);
            let g = self.layers[r.index()];
            engine.set_layer_off(id, g.off)?;
            engine.set_layer_kind(id, g.kind)?;
        }
        for p in Pathway::ALL {
            engine.set_prjn_gate(circuit.prjn(p), self.pathways[p.index()])?;
        }
        if let Some(initial) = self.schedule.entry(0) {
            initial.apply_strengths(engine, circuit)?;
        }
        Ok(())
    }

    // --- builders ---

    fn off(&mut self, regions: &[Region]) {
        for r in regions {
            self.layers[r.index()].off = true;
        }
    }

    fn kind(&mut self, r: Region, kind: LayerKind) {
        self.layers[r.index()].kind = kind;
    }

    fn cut(&mut self, paths: &[Pathway]) {
        for p in paths {
            self.pathways[p.index()].off = true;
        }
    }

    fn learn(&mut self, paths: &[Pathway], learn: bool) {
        for p in paths {
            self.pathways[p.index()].learn = learn;
        }
    }

    fn rel(&mut self, p: Pathway, rel: f32) {
        self.pathways[p.index()].rel = rel;
    }

    fn abs(&mut self, p: Pathway, abs: f32) {
        self.pathways[p.index()].abs = abs;
    }

    /// DG / CA fields hidden; ECin completes from the full pattern only when
    /// testing.
    fn hippocampal_kinds(&mut self) {
        use Region::*;
        for r in [DG, CA1, CA3] {
            self.kind(r, LayerKind::Hidden);
        }
        if self.train {
            self.kind(ECin, LayerKind::Hidden);
            self.kind(ECout, LayerKind::Target);
        } else {
            self.kind(ECout, LayerKind::Compare);
            self.kind(ECin, LayerKind::Target);
        }
    }

    fn encode(&mut self, params: &GatingParams) {
        self.hippocampal_awake(params);
        self.learn(&Pathway::CORTICAL, false);
        self.learn(&Pathway::HIPPOCAMPAL, true);
        let clamps = vec![Clamp {
            from: Region::ECin,
            to: Region::ECout,
        }];
        self.schedule =
            QuarterSchedule::theta_flip(self.train, params, true, false).clamp_at_plus(clamps);
    }

    /// Shared by Encode and PureRetrieval: cortex out, EC loop awake.
    fn hippocampal_awake(&mut self, params: &GatingParams) {
        use Pathway::*;
        self.off(&[Region::Cortex, Region::Letter]);
        self.learn(&Pathway::SEMANTIC, false);
        self.rel(SemanticToEcin, params.sem_rel());
        self.rel(EcoutToEcin, 0.5);
        self.abs(OutputToEcin, 0.0);
        self.rel(OutputToEcin, params.out_ec_back);
        self.cut(&[LetterToOutput, CortexToOutput, OutputToCortex, InputToCortex]);
        self.hippocampal_kinds();
    }

    fn sleep(&mut self, params: &GatingParams, daydream: bool) {
        use Pathway::*;
        if daydream {
            self.rel(SemanticToEcin, params.sem_rel());
            self.rel(OutputToEcin, params.out_ec_back);
        } else {
            self.rel(SemanticToEcin, 2.0);
            self.rel(OutputToEcin, 1.0);
        }
        self.abs(OutputToEcin, 1.0);
        self.rel(InputToEcin, 2.0);
        self.rel(EcoutToEcin, 0.1);
        self.learn(&Pathway::CORTICAL, true);
        self.learn(&Pathway::HIPPOCAMPAL, true);
        if self.train {
            self.cut(&[EcoutToOutput]);
        }
        self.hippocampal_kinds();

        let clamps = vec![
            Clamp {
                from: Region::ECout,
                to: Region::Output,
            },
            Clamp {
                from: Region::ECin,
                to: Region::ECout,
            },
        ];
        self.schedule = QuarterSchedule::theta_flip(self.train, params, !daydream, !daydream)
            .clamp_at_plus(clamps);
    }

    fn semantic_pretrain(&mut self, params: &GatingParams) {
        use Pathway::*;
        self.learn(&Pathway::ALL, false);
        self.learn(&Pathway::SEMANTIC, true);
        self.rel(SemanticToEcin, params.out_ec_back);
        self.off(&[
            Region::Cortex,
            Region::Letter,
            Region::CA1,
            Region::CA3,
            Region::DG,
            Region::ECout,
        ]);
        self.cut(&[InputToEcin]);
        let kind = if self.train {
            LayerKind::Target
        } else {
            LayerKind::Compare
        };
        self.kind(Region::ECin, kind);
        self.inputs = vec![Region::Input, Region::ECin];
    }

    fn cortex_only(&mut self) {
        use Pathway::*;
        self.learn(&Pathway::SEMANTIC, false);
        self.rel(SemanticToEcin, 0.01);
        self.learn(&Pathway::CORTICAL, true);
        self.learn(&Pathway::HIPPOCAMPAL, false);
        self.off(&[Region::CA1, Region::CA3, Region::DG, Region::ECout]);
        self.cut(&[InputToEcin, EcoutToEcin]);
        self.inputs = vec![Region::Input, Region::Output, Region::ECin];
    }

    fn full_test(&mut self, params: &GatingParams) {
        use Pathway::*;
        self.abs(OutputToEcin, 1.0);
        self.rel(OutputToEcin, params.out_ec_back);
        self.learn(&Pathway::SEMANTIC, false);
        self.rel(SemanticToEcin, params.sem_rel());
        self.rel(InputToEcin, 1.0);
        self.rel(EcoutToEcin, 0.5);
        self.learn(&Pathway::CORTICAL, true);
        self.learn(&Pathway::HIPPOCAMPAL, false);
        if self.train {
            self.cut(&[EcoutToOutput]);
        }
        for r in [Region::DG, Region::CA1, Region::CA3] {
            self.kind(r, LayerKind::Hidden);
        }
        self.kind(Region::ECout, LayerKind::Compare);
        let ecin = if self.train {
            LayerKind::Compare
        } else {
            LayerKind::Target
        };
        self.kind(Region::ECin, ecin);

        let clamps = vec![Clamp {
            from: Region::ECout,
            to: Region::Output,
        }];
        self.schedule = QuarterSchedule::ca3_driven(params).clamp_at_plus(clamps);
    }

    fn pure_retrieval(&mut self, params: &GatingParams) {
        self.hippocampal_awake(params);
        self.learn(&Pathway::CORTICAL, false);
        self.learn(&Pathway::HIPPOCAMPAL, true);
        let clamps = vec![Clamp {
            from: Region::ECin,
            to: Region::ECout,
        }];
        self.schedule = QuarterSchedule::ca3_driven(params).clamp_at_plus(clamps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::network::RateNetwork;
    use crate::topology::Topology;

    fn engine() -> RateNetwork {
        RateNetwork::hippocampal(&NetworkConfig::compact(), 3).unwrap()
    }

    fn build(mode: Mode, train: bool) -> (RateNetwork, Circuit, ModeConfiguration) {
        let net = engine();
        let circuit = Circuit::resolve(&net).unwrap();
        let params = GatingParams::default();
        let cfg = ModeConfiguration::build(mode, train, circuit.baseline(), &params);
        (net, circuit, cfg)
    }

    /// Every gating attribute the policy controls, read back from the engine.
    fn engine_state(net: &RateNetwork, circuit: &Circuit) -> Vec<String> {
        let mut out = Vec::new();
        for r in Region::ALL {
            let id = circuit.layer(r);
            out.push(format!(
                "{}:{}:{:?}",
                r.name(),
                net.layer_off(id).unwrap(),
                net.layer_kind(id).unwrap()
            ));
        }
        for p in Pathway::ALL {
            out.push(format!("{p:?}:{:?}", net.prjn_gate(circuit.prjn(p)).unwrap()));
        }
        out
    }

    #[test]
    fn modes_parse_by_name() {
        for m in Mode::ALL {
            assert_eq!(m.name().parse::<Mode>().unwrap(), m);
        }
        assert_eq!("sleep".parse::<Mode>().unwrap(), Mode::Sleep);
        assert!(matches!("Nap".parse::<Mode>(), Err(ConfigError::UnknownMode(_))));
    }

    #[test]
    fn every_schedule_is_well_formed() {
        for m in Mode::ALL {
            for train in [true, false] {
                let (_, _, cfg) = build(m, train);
                cfg.schedule.validate().unwrap();
                for e in &cfg.schedule.entries {
                    if !e.clamps.is_empty() {
                        assert_eq!(e.quarter, 3, "{m} clamps outside the plus boundary");
                    }
                }
            }
        }
    }

    #[test]
    fn circuit_reports_missing_layer() {
        let t = Topology::new().layer(crate::topology::LayerSpec::new(
            "Input",
            LayerKind::Input,
            crate::topology::Shape::flat(4),
        ));
        let net = RateNetwork::build(&t, &NetworkConfig::compact(), 1).unwrap();
        assert_eq!(
            Circuit::resolve(&net).unwrap_err(),
            ConfigError::UnknownLayer("ECin".to_string())
        );
    }

    #[test]
    fn circuit_reports_missing_projection() {
        let cfg = NetworkConfig::compact();
        let mut t = Topology::hippocampal(&cfg);
        t.prjns.retain(|p| !(p.send == "DG" && p.recv == "CA3"));
        let net = RateNetwork::build(&t, &cfg, 1).unwrap();
        assert_eq!(
            Circuit::resolve(&net).unwrap_err(),
            ConfigError::UnknownProjection {
                send: "DG".into(),
                recv: "CA3".into()
            }
        );
    }

    #[test]
    fn encode_disables_cortex_and_trains_hippocampus() {
        let (_, _, cfg) = build(Mode::Encode, true);
        assert!(cfg.layer(Region::Cortex).off);
        assert!(cfg.layer(Region::Letter).off);
        for r in [Region::CA1, Region::CA3, Region::DG, Region::ECout] {
            assert!(!cfg.layer(r).off);
        }
        for p in Pathway::HIPPOCAMPAL {
            assert!(cfg.pathway(p).learn, "{p:?}");
        }
        for p in Pathway::CORTICAL.iter().chain(&Pathway::SEMANTIC) {
            assert!(!cfg.pathway(*p).learn, "{p:?}");
        }
        assert!(cfg.pathway(Pathway::InputToCortex).off);
        assert_eq!(cfg.pathway(Pathway::OutputToEcin).abs, 0.0);
        assert_eq!(cfg.pathway(Pathway::EcoutToEcin).rel, 0.5);
        assert!((cfg.pathway(Pathway::SemanticToEcin).rel - 0.06).abs() < 1e-6);
        assert_eq!(cfg.layer(Region::ECin).kind, LayerKind::Hidden);
        assert_eq!(cfg.layer(Region::ECout).kind, LayerKind::Target);
    }

    #[test]
    fn encode_testing_swaps_ec_kinds() {
        let (_, _, cfg) = build(Mode::Encode, false);
        assert_eq!(cfg.layer(Region::ECin).kind, LayerKind::Target);
        assert_eq!(cfg.layer(Region::ECout).kind, LayerKind::Compare);
    }

    #[test]
    fn encode_schedule_flips_ca1_drive() {
        let (_, _, train) = build(Mode::Encode, true);
        let s = &train.schedule;
        let q0 = s.entry(0).unwrap();
        assert!(q0.reassign.contains(&Reassign::abs(Pathway::EcinToCa1, 1.0)));
        assert!(q0.reassign.contains(&Reassign::abs(Pathway::Ca3ToCa1, 0.0)));
        assert!(q0.reassign.contains(&Reassign::rel(Pathway::DgToCa3, 0.0)));

        let q1 = s.entry(1).unwrap();
        assert!(q1.rescale);
        assert!(q1.reassign.contains(&Reassign::abs(Pathway::Ca3ToCa1, 1.0)));
        assert!(q1.reassign.contains(&Reassign::rel_baseline(Pathway::DgToCa3)));

        let q3 = s.entry(3).unwrap();
        assert!(q3.reassign.contains(&Reassign::abs(Pathway::EcinToCa1, 1.0)));
        assert_eq!(
            q3.clamps,
            vec![Clamp {
                from: Region::ECin,
                to: Region::ECout
            }]
        );
        assert!(s.entry(2).is_none());
        assert_eq!(s.finish.len(), 2);

        let (_, _, test) = build(Mode::Encode, false);
        let q1 = test.schedule.entry(1).unwrap();
        assert!(q1.reassign.contains(&Reassign::rel(Pathway::DgToCa3, 1.0)));
    }

    #[test]
    fn sleep_opens_everything_and_clamps_twice() {
        let (_, _, cfg) = build(Mode::Sleep, true);
        for r in Region::ALL {
            assert!(!cfg.layer(r).off, "{r:?}");
        }
        assert!(cfg.pathway(Pathway::EcoutToOutput).off);
        assert!(cfg.pathway(Pathway::CortexToOutput).learn);
        assert!(cfg.pathway(Pathway::EcinToCa3).learn);
        assert_eq!(cfg.pathway(Pathway::SemanticToEcin).rel, 2.0);
        let q3 = cfg.schedule.entry(3).unwrap();
        assert_eq!(q3.clamps.len(), 2);
        assert_eq!(q3.clamps[0].to, Region::Output);
        assert_eq!(q3.clamps[1].to, Region::ECout);

        let (_, _, test) = build(Mode::Sleep, false);
        assert!(!test.pathway(Pathway::EcoutToOutput).off);
    }

    #[test]
    fn daydream_never_touches_dg() {
        let (_, _, cfg) = build(Mode::Daydream, true);
        let touches_dg = cfg
            .schedule
            .entries
            .iter()
            .flat_map(|e| &e.reassign)
            .chain(&cfg.schedule.finish)
            .any(|r| r.pathway == Pathway::DgToCa3);
        assert!(!touches_dg);
        assert!(cfg.schedule.finish.is_empty());
        assert!((cfg.pathway(Pathway::SemanticToEcin).rel - 0.06).abs() < 1e-6);
    }

    #[test]
    fn flat_modes_have_no_schedule() {
        for m in [Mode::SemanticPretrain, Mode::CortexOnly] {
            for train in [true, false] {
                let (_, _, cfg) = build(m, train);
                assert!(cfg.schedule.is_flat(), "{m}");
            }
        }
    }

    #[test]
    fn semantic_pretrain_trains_semantic_only() {
        let (_, _, cfg) = build(Mode::SemanticPretrain, true);
        for p in Pathway::ALL {
            assert_eq!(cfg.pathway(p).learn, Pathway::SEMANTIC.contains(&p), "{p:?}");
        }
        assert!(cfg.layer(Region::ECout).off);
        assert!(cfg.pathway(Pathway::InputToEcin).off);
        assert_eq!(cfg.layer(Region::ECin).kind, LayerKind::Target);
        assert_eq!(cfg.inputs, vec![Region::Input, Region::ECin]);
    }

    #[test]
    fn recall_modes_drive_ca1_from_ca3() {
        for m in [Mode::FullTest, Mode::PureRetrieval] {
            let (_, _, cfg) = build(m, true);
            let q0 = cfg.schedule.entry(0).unwrap();
            assert!(q0.reassign.contains(&Reassign::abs(Pathway::Ca3ToCa1, 1.0)));
            assert!(q0.reassign.contains(&Reassign::abs(Pathway::EcinToCa1, 0.0)));
            assert!(cfg.schedule.entry(1).is_none());
            assert_eq!(cfg.schedule.entry(3).unwrap().clamps.len(), 1);
        }
        let (_, _, ft) = build(Mode::FullTest, true);
        assert!(ft.pathway(Pathway::CortexToOutput).learn);
        assert!(!ft.pathway(Pathway::EcinToCa1).learn);
        let (_, _, pr) = build(Mode::PureRetrieval, true);
        assert!(!pr.pathway(Pathway::CortexToOutput).learn);
        assert!(pr.pathway(Pathway::EcinToCa1).learn);
    }

    #[test]
    fn apply_writes_configuration_to_engine() {
        let (mut net, circuit, cfg) = build(Mode::Encode, true);
        cfg.apply(&mut net, &circuit).unwrap();
        assert!(net.layer_off(circuit.layer(Region::Cortex)).unwrap());
        let g = net.prjn_gate(circuit.prjn(Pathway::Ca3ToCa1)).unwrap();
        assert_eq!(g.abs, 0.0);
        let g = net.prjn_gate(circuit.prjn(Pathway::DgToCa3)).unwrap();
        assert_eq!(g.rel, 0.0);
    }

    #[test]
    fn previous_mode_leaves_no_residue() {
        let params = GatingParams::default();
        let mut fresh = engine();
        let circuit = Circuit::resolve(&fresh).unwrap();
        let encode = ModeConfiguration::build(Mode::Encode, true, circuit.baseline(), &params);
        encode.apply(&mut fresh, &circuit).unwrap();

        let mut reused = engine();
        for m in [Mode::CortexOnly, Mode::Sleep, Mode::SemanticPretrain] {
            ModeConfiguration::build(m, true, circuit.baseline(), &params)
                .apply(&mut reused, &circuit)
                .unwrap();
        }
        ModeConfiguration::build(Mode::CortexOnly, true, circuit.baseline(), &params)
            .apply(&mut reused, &circuit)
            .unwrap();
        encode.apply(&mut reused, &circuit).unwrap();

        assert_eq!(engine_state(&fresh, &circuit), engine_state(&reused, &circuit));
    }

    #[test]
    fn apply_is_idempotent() {
        let (mut net, circuit, cfg) = build(Mode::Sleep, false);
        cfg.apply(&mut net, &circuit).unwrap();
        let once = engine_state(&net, &circuit);
        cfg.apply(&mut net, &circuit).unwrap();
        assert_eq!(once, engine_state(&net, &circuit));
    }
}
