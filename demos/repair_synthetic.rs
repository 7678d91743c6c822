//! Repair a synthetic two-mouse recording and print what happened.
//!
//!   RUST_LOG=posefill=debug cargo run --example repair_synthetic

use nalgebra::Vector2;
use posefill::{
    batch::{BatchSummary, RepairJob},
    BodyPartIndex, RepairConfig, RepairSession, SkeletonPreset, Track, TrackKey, TrackSet,
    TrackSetRepair,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing_subscriber::EnvFilter;

const LAYOUT: [(&str, f64, f64); 8] = [
    ("Nose", 30.0, 0.0),
    ("Left_ear", 20.0, 6.0),
    ("Right_ear", 20.0, -6.0),
    ("Center", 0.0, 0.0),
    ("Left_fhip", 4.0, 10.0),
    ("Right_fhip", 4.0, -10.0),
    ("Tail_base", -26.0, 0.0),
    ("Tail_tip", -56.0, 0.0),
];

fn mouse(id: &str, n_frames: usize, rng: &mut StdRng) -> Track {
    let noise = Normal::new(0.0, 0.4).unwrap();
    let phase = rng.random_range(0.0..std::f64::consts::TAU);
    let index = BodyPartIndex::from_labels(LAYOUT.iter().map(|(n, _, _)| format!("{id}_{n}")));
    let mut track = Track::from_fn(index, n_frames, |f, bp, axis| {
        let angle = f as f64 * std::f64::consts::TAU / 250.0 + phase;
        let (_, dx, dy) = LAYOUT[bp];
        match axis {
            posefill::Axis::X => 400.0 + 80.0 * angle.sin() + dx + noise.sample(&mut *rng),
            posefill::Axis::Y => 300.0 + 80.0 * angle.cos() + dy + noise.sample(&mut *rng),
        }
    });
    for _ in 0..12 {
        let bp = rng.random_range(0..LAYOUT.len());
        let len = rng.random_range(1..=25);
        let start = rng.random_range(1..n_frames - len - 1);
        for f in start..start + len {
            track.set_point(f, bp, Vector2::new(f64::NAN, f64::NAN));
        }
    }
    track
}

fn main() -> Result<(), posefill::RepairError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut rng = StdRng::seed_from_u64(2024);
    let mut set = TrackSet::default();
    for id in ["B", "W"] {
        let track = mouse(id, 1_500, &mut rng);
        let skeleton = SkeletonPreset::Deepof8.for_individual(id, &[]);
        set.insert(
            TrackKey::new("synthetic", id),
            RepairJob::from_track(track, skeleton),
        );
    }
    println!(
        "{} tracks, {} frames, {} missing entries",
        set.number_of_tracks(),
        set.total_frames(),
        set.total_missing()
    );

    let config = RepairConfig::builder()
        .full_imputation(true)
        .lin_interp_limit(3)
        .build()?;
    println!("{config:#}");

    let mut session = RepairSession::new(config);
    let results = set.repair_all(&mut session);
    println!("{:#}", BatchSummary::from_results(&results));

    for id in ["B", "W"] {
        if let Some(graph) = session.cache().get(&format!("synthetic/{id}")) {
            println!("{graph}");
        }
    }
    Ok(())
}
