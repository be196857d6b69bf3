use hipsleep::prelude::*;
use hipsleep::storage::WeightImage;

#[derive(Debug, Clone)]
struct AssayReport {
    seed: u64,
    cycles_per_quarter: usize,

    /// Cycles per alpha cycle observed for every mode (train, test).
    cycles_per_mode: Vec<(Mode, usize, usize)>,

    deterministic: bool,
    reload_identical: bool,

    /// Largest |ECout - clamped ECin| after a training Encode trial.
    encode_clamp_error: f32,
    /// Largest accumulated weight delta after a testing trial.
    test_dwt_max: f32,

    weight_image_bytes: usize,
    synapses: usize,
}

pub fn run(cfg: SimConfig) -> Result<()> {
    let seed = cfg.seed;
    let cycles_per_quarter = cfg.cycles_per_quarter;
    let spec = PairedAssociates::for_pool_size(cfg.network.ec_pool_units);
    let (mut train, _) = spec.generate(&mut Prng::new(seed));
    train.select(0);

    // === Cycle counts ===
    let mut ctx = SimulationContext::new(cfg.clone())?;
    let mut cycles_per_mode = Vec::with_capacity(Mode::ALL.len());
    for mode in Mode::ALL {
        let mut counts = [0usize; 2];
        for (slot, is_train) in [true, false].into_iter().enumerate() {
            let before = ctx.time().total_cycles;
            ctx.apply_mode(mode, is_train)?;
            ctx.apply_inputs(&train)?;
            ctx.run_alpha_cycle(is_train)?;
            counts[slot] = (ctx.time().total_cycles - before) as usize;
        }
        cycles_per_mode.push((mode, counts[0], counts[1]));
    }

    // === Clamp and test-phase learning ===
    ctx.apply_mode(Mode::Encode, true)?;
    ctx.apply_inputs(&train)?;
    ctx.run_alpha_cycle(true)?;
    let encode_clamp_error = ctx
        .last_outcome()
        .and_then(|o| o.clamps.first())
        .map(|clamp| {
            let mut ecout = Vec::new();
            let id = ctx.circuit().layer(Region::ECout);
            match ctx.engine().unit_values(id, UnitChannel::Act, &mut ecout) {
                Ok(()) => ecout
                    .iter()
                    .zip(&clamp.values)
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0f32, f32::max),
                Err(_) => f32::INFINITY,
            }
        })
        .unwrap_or(f32::INFINITY);

    ctx.apply_mode(Mode::Sleep, false)?;
    ctx.apply_inputs(&train)?;
    ctx.run_alpha_cycle(false)?;
    let mut test_dwt_max = 0.0f32;
    for p in 0..ctx.engine().prjn_count() {
        test_dwt_max = test_dwt_max.max(ctx.engine().max_abs_dwt(PrjnId::new(p))?);
    }

    // === Determinism and reload ===
    let sequence = [Mode::SemanticPretrain, Mode::Encode, Mode::Sleep, Mode::FullTest];
    let a = trace(&cfg, &train, &sequence)?;
    let b = trace(&cfg, &train, &sequence)?;
    let deterministic = a == b;

    let mut ctx = SimulationContext::new(cfg.clone())?;
    let mut saved = Vec::new();
    ctx.run_trial(Mode::Encode, true, &train)?;
    ctx.save_weights_to(&mut saved)?;
    let first = ctx.run_trial(Mode::Sleep, true, &train)?;
    ctx.load_weights_from(&mut saved.as_slice())?;
    let second = ctx.run_trial(Mode::Sleep, true, &train)?;
    let reload_identical = first == second;

    let report = AssayReport {
        seed,
        cycles_per_quarter,
        cycles_per_mode,
        deterministic,
        reload_identical,
        encode_clamp_error,
        test_dwt_max,
        weight_image_bytes: WeightImage::from_bytes(&saved)?.size_bytes()?,
        synapses: ctx.engine().synapse_count(),
    };
    print_report(&report);
    Ok(())
}

fn trace(cfg: &SimConfig, table: &PatternTable, modes: &[Mode]) -> Result<Vec<TrialStats>> {
    let mut ctx = SimulationContext::new(cfg.clone())?;
    modes
        .iter()
        .map(|&m| ctx.run_trial(m, true, table))
        .collect()
}

fn print_report(r: &AssayReport) {
    println!("hipsleep assays");
    println!("seed={}", r.seed);
    println!("cycles_per_quarter={}", r.cycles_per_quarter);
    for (mode, train, test) in &r.cycles_per_mode {
        println!("cycles[{mode}]=train:{train} test:{test}");
    }
    println!("deterministic={}", r.deterministic);
    println!("reload_identical={}", r.reload_identical);
    println!("encode_clamp_error={:.2e}", r.encode_clamp_error);
    println!("test_dwt_max={:.2e}", r.test_dwt_max);
    println!("weight_image_bytes={}", r.weight_image_bytes);
    println!("synapses={}", r.synapses);
}
