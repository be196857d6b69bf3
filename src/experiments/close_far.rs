use hipsleep::prelude::*;
use tracing::info;

/// Close / far paired-associate run: semantic pretraining, hippocampal
/// encoding, retrieval practice and sleep, with a weight snapshot so the
/// post-sleep test can be compared against the pre-sleep network.
pub fn protocol(sem_epochs: usize, encode_epochs: usize) -> Protocol {
    Protocol::new("close-far")
        .train(Mode::SemanticPretrain, "semantic", sem_epochs)
        .train(Mode::Encode, "train", encode_epochs)
        .test(Mode::Encode, "test")
        .test(Mode::FullTest, "test")
        .all_on()
        .save(WeightSlot::Memory("encoded".into()))
        .train(Mode::FullTest, "train", encode_epochs * 2)
        .test(Mode::FullTest, "test")
        .train(Mode::Sleep, "train", 1)
        .train(Mode::Daydream, "train", 1)
        .test(Mode::FullTest, "test")
        .all_on()
        .load(WeightSlot::Memory("encoded".into()))
        .test(Mode::FullTest, "test")
}

pub fn run(cfg: SimConfig, related: bool, stop: &StopHandle) -> Result<ProtocolReport> {
    let spec = PairedAssociates {
        related,
        ..PairedAssociates::for_pool_size(cfg.network.ec_pool_units)
    };
    let mut rng = Prng::new(cfg.seed);
    let (train, test) = spec.generate(&mut rng);
    let mut library = PatternLibrary::new();
    library.insert("semantic".into(), train.clone());
    library.insert("train".into(), train);
    library.insert("test".into(), test);

    let mut ctx = SimulationContext::new(cfg)?;
    info!(
        synapses = ctx.engine().synapse_count(),
        items = spec.items,
        related,
        "network built"
    );
    let report = protocol(3, 15).run(&mut ctx, &mut library, stop)?;
    for (label, s) in report.tests() {
        println!(
            "{label:<28} sse={:8.3} sse_b={:7.3} sse_c={:7.3} err={:.2} cos={:.3} mem={}",
            s.sse, s.sse_pool_b, s.sse_pool_c, s.pct_err, s.cos_sim, s.mem
        );
    }
    Ok(report)
}
