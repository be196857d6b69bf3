use hipsleep::prelude::*;

fn context(cpq: usize) -> SimulationContext {
    SimulationContext::new(SimConfig::compact().with_cycles_per_quarter(cpq)).unwrap()
}

fn tables(ctx: &SimulationContext, seed: u64) -> (PatternTable, PatternTable) {
    let spec = PairedAssociates {
        items: 4,
        ..PairedAssociates::for_pool_size(ctx.config().network.ec_pool_units)
    };
    spec.generate(&mut Prng::new(seed))
}

type GateState = (Vec<(bool, LayerKind)>, Vec<PrjnGate>);

fn gate_state(ctx: &SimulationContext) -> GateState {
    let e = ctx.engine();
    let layers = (0..e.layer_count())
        .map(|i| {
            let id = LayerId::new(i);
            (e.layer_off(id).unwrap(), e.layer_kind(id).unwrap())
        })
        .collect();
    let prjns = (0..e.prjn_count())
        .map(|i| e.prjn_gate(PrjnId::new(i)).unwrap())
        .collect();
    (layers, prjns)
}

#[test]
fn every_mode_runs_exactly_four_quarters() {
    let mut ctx = context(7);
    let (mut train, _) = tables(&ctx, 1);
    train.select(0);
    for mode in Mode::ALL {
        for is_train in [true, false] {
            let before = ctx.time().total_cycles;
            ctx.apply_mode(mode, is_train).unwrap();
            ctx.apply_inputs(&train).unwrap();
            ctx.run_alpha_cycle(is_train).unwrap();
            assert_eq!(ctx.time().total_cycles - before, 28, "{mode} train={is_train}");
            assert_eq!(ctx.last_outcome().unwrap().cycles, 28);
        }
    }
}

#[test]
fn same_seed_and_sequence_give_identical_statistics() {
    let run = || {
        let mut ctx = context(5);
        let (mut train, mut test) = tables(&ctx, 9);
        let mut out = Vec::new();
        for (i, mode) in [Mode::SemanticPretrain, Mode::Encode, Mode::Sleep, Mode::FullTest]
            .into_iter()
            .enumerate()
        {
            train.select(i);
            out.push(ctx.run_trial(mode, true, &train).unwrap());
            test.select(i);
            out.push(ctx.run_trial(mode, false, &test).unwrap());
        }
        let mut bytes = Vec::new();
        ctx.save_weights_to(&mut bytes).unwrap();
        (out, bytes)
    };
    let (a, wa) = run();
    let (b, wb) = run();
    assert_eq!(a, b);
    assert_eq!(wa, wb);
}

#[test]
fn scorer_extremes() {
    let scorer = MemoryScorer::new(ScorerConfig::for_pool_size(4));
    let target: Vec<f32> = (0..24).map(|i| if i % 3 == 0 { 1.0 } else { 0.0 }).collect();
    let complement: Vec<f32> = target.iter().map(|v| 1.0 - v).collect();
    let cue: Vec<f32> = target
        .iter()
        .enumerate()
        .map(|(i, &v)| if i < 12 { v } else { 0.0 })
        .collect();

    let perfect = scorer.score(&target, &cue, &target, false).unwrap();
    assert!(perfect.correct);
    assert_eq!(perfect.miss_all, Rate::Value(0.0));
    assert_eq!(perfect.miss_completion, Rate::Value(0.0));
    assert_eq!(perfect.false_alarm, Rate::Value(0.0));

    let wrong = scorer.score(&target, &cue, &complement, false).unwrap();
    assert!(!wrong.correct);
    assert_eq!(wrong.miss_all, Rate::Value(1.0));
    assert_eq!(wrong.false_alarm, Rate::Value(1.0));

    let full_cue = scorer.score(&target, &target, &target, false).unwrap();
    assert_eq!(full_cue.miss_completion, Rate::NotApplicable);
}

#[test]
fn cortex_only_then_encode_has_no_residue() {
    let mut fresh = context(3);
    fresh.apply_mode(Mode::Encode, true).unwrap();

    let mut reused = context(3);
    reused.apply_mode(Mode::CortexOnly, true).unwrap();
    reused.apply_mode(Mode::Encode, true).unwrap();

    assert_eq!(gate_state(&fresh), gate_state(&reused));
}

#[test]
fn training_encode_clamps_ecout_to_ecin() {
    let mut ctx = context(10);
    let (mut train, _) = tables(&ctx, 3);
    train.select(1);
    ctx.run_trial(Mode::Encode, true, &train).unwrap();

    let clamp = &ctx.last_outcome().unwrap().clamps[0];
    assert_eq!((clamp.from, clamp.to), (Region::ECin, Region::ECout));
    assert!(clamp.written);

    let mut ecout = Vec::new();
    ctx.engine()
        .unit_values(ctx.circuit().layer(Region::ECout), UnitChannel::Act, &mut ecout)
        .unwrap();
    assert_eq!(ecout.len(), clamp.values.len());
    for (a, b) in ecout.iter().zip(&clamp.values) {
        assert!((a - b).abs() <= 1e-6, "{a} vs {b}");
    }
}

#[test]
fn testing_leaves_weights_and_deltas_untouched() {
    let mut ctx = context(5);
    let (mut train, mut test) = tables(&ctx, 4);
    train.select(0);
    ctx.run_trial(Mode::Encode, true, &train).unwrap();

    for mode in Mode::ALL {
        let before = ctx.engine().weight_image().prjns;
        test.select(0);
        ctx.run_trial(mode, false, &test).unwrap();
        for p in 0..ctx.engine().prjn_count() {
            assert_eq!(ctx.engine().max_abs_dwt(PrjnId::new(p)).unwrap(), 0.0, "{mode}");
        }
        assert_eq!(before, ctx.engine().weight_image().prjns, "{mode}");
    }
}

#[test]
fn training_changes_plastic_weights() {
    let mut ctx = context(10);
    let (mut train, _) = tables(&ctx, 4);
    train.select(0);
    let before = ctx.engine().weight_image().prjns;
    ctx.run_trial(Mode::Encode, true, &train).unwrap();
    assert_ne!(before, ctx.engine().weight_image().prjns);
}

#[test]
fn reloaded_weights_reproduce_statistics() {
    let mut ctx = context(5);
    let (mut train, mut test) = tables(&ctx, 6);
    train.select(2);
    test.select(2);
    ctx.run_trial(Mode::Encode, true, &train).unwrap();

    let mut saved = Vec::new();
    ctx.save_weights_to(&mut saved).unwrap();
    let first = [
        ctx.run_trial(Mode::Sleep, true, &train).unwrap(),
        ctx.run_trial(Mode::FullTest, false, &test).unwrap(),
    ];

    ctx.load_weights_from(&mut saved.as_slice()).unwrap();
    let second = [
        ctx.run_trial(Mode::Sleep, true, &train).unwrap(),
        ctx.run_trial(Mode::FullTest, false, &test).unwrap(),
    ];
    assert_eq!(first, second);
}

fn sleep_then_test(
    ctx: &mut SimulationContext,
    saved: &[u8],
    train: &PatternTable,
    test: &PatternTable,
) -> [TrialStats; 2] {
    ctx.load_weights_from(&mut &saved[..]).unwrap();
    [
        ctx.run_trial(Mode::Sleep, true, train).unwrap(),
        ctx.run_trial(Mode::FullTest, false, test).unwrap(),
    ]
}

#[test]
fn reload_replays_identically_when_activity_carries_over() {
    let mut cfg = SimConfig::compact().with_cycles_per_quarter(5);
    cfg.network.decay = 0.5;
    let mut ctx = SimulationContext::new(cfg).unwrap();
    let (mut train, mut test) = tables(&ctx, 6);
    train.select(1);
    test.select(1);
    ctx.run_trial(Mode::Encode, true, &train).unwrap();

    let mut saved = Vec::new();
    ctx.save_weights_to(&mut saved).unwrap();
    let first = sleep_then_test(&mut ctx, &saved, &train, &test);
    let second = sleep_then_test(&mut ctx, &saved, &train, &test);
    assert_eq!(first, second);
}

#[test]
fn encode_training_recalls_cued_items() {
    let mut ctx = context(10);
    let (mut train, mut test) = tables(&ctx, 4);
    let items = train.len();
    ctx.reset_counters(items);

    for _ in 0..20 {
        for i in 0..items {
            train.select(i);
            ctx.run_trial(Mode::Encode, true, &train).unwrap();
        }
    }
    let last = ctx.stats.history.last().unwrap();
    assert_eq!(last.mem, Rate::Value(1.0), "training never converged");

    let threshold = ctx.config().scorer.threshold;
    let mut recalled = 0;
    for i in 0..items {
        test.select(i);
        let m = ctx.run_trial(Mode::Encode, false, &test).unwrap().memory.unwrap();
        if m.correct && m.miss_completion.below(threshold) {
            recalled += 1;
        }
    }
    assert!(recalled >= 1, "no cued item was completed");
}

#[test]
fn weights_survive_a_file() {
    let path = std::env::temp_dir().join(format!("hipsleep-{}.wts", std::process::id()));
    let mut a = context(3);
    let (mut train, _) = tables(&a, 8);
    train.select(0);
    a.run_trial(Mode::Encode, true, &train).unwrap();
    a.save_weights_file(&path).unwrap();

    let mut b = context(3);
    b.load_weights_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(a.engine().weight_image(), b.engine().weight_image());
}

struct StopAfterFirstTrial(StopHandle);

impl ViewObserver for StopAfterFirstTrial {
    fn update(&mut self, _engine: &dyn NetworkEngine, _time: &Time, _train: bool) {
        self.0.request();
    }
}

#[test]
fn stop_request_takes_effect_at_the_next_trial() {
    let mut ctx = context(4);
    let (train, test) = tables(&ctx, 2);
    let mut lib = PatternLibrary::new();
    lib.insert("train".into(), train);
    lib.insert("test".into(), test);

    let stop = StopHandle::new();
    // default training view fires once, at the end of the alpha cycle
    ctx.set_view_observer(Box::new(StopAfterFirstTrial(stop.clone())));
    let report = Protocol::new("stop")
        .train(Mode::Encode, "train", 3)
        .test(Mode::Encode, "test")
        .run(&mut ctx, &mut lib, &stop)
        .unwrap();

    assert!(report.stopped);
    assert_eq!(report.phases.len(), 1);
    assert_eq!(ctx.time().total_cycles, 16);
    assert_eq!(ctx.counter.trial, 1);
}

#[cfg(feature = "serde")]
#[test]
fn json_config_drives_the_context() {
    let json = r#"{
        "seed": 5,
        "cycles_per_quarter": 2,
        "network": {
            "ec_pool_units": 8,
            "ca1_pool_units": 6,
            "dg_units": 40,
            "ca3_units": 30,
            "cortex_units": 25,
            "semantic_units": 16,
            "letter_units": 16
        },
        "scorer": {
            "pool_b": { "start": 15, "end": 24 },
            "pool_c": { "start": 23, "end": 32 }
        }
    }"#;
    let cfg = SimConfig::from_json_str(json).unwrap();
    let mut ctx = SimulationContext::new(cfg).unwrap();
    ctx.apply_mode(Mode::Daydream, true).unwrap();
    ctx.run_alpha_cycle(true).unwrap();
    assert_eq!(ctx.time().total_cycles, 8);
}
