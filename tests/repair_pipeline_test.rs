mod common;

use common::{as_table, distance, mouse_track, punch_axis, punch_hole};
use posefill::{
    batch::{BatchSummary, RepairJob},
    repair,
    skeleton::constraints::ConstraintGraph,
    Axis, PresenceMask, RepairConfig, RepairError, RepairSession, SkeletonPreset, Track,
    TrackKey, TrackSet, TrackSetRepair,
};

fn full() -> RepairConfig {
    RepairConfig::builder().full_imputation(true).build().unwrap()
}

fn bits(track: &Track) -> Vec<u64> {
    track.values().iter().map(|v| v.to_bits()).collect()
}

fn assert_observed_kept(original: &Track, presence: &PresenceMask, out: &Track) {
    let mask = presence.as_matrix();
    for (idx, (a, b)) in original.values().iter().zip(out.values().iter()).enumerate() {
        if mask[idx] {
            assert_eq!(a.to_bits(), b.to_bits(), "observed entry {idx} changed");
        }
    }
}

#[test]
fn observed_entries_are_bit_identical() {
    let mut track = mouse_track(300, "", 0.5, 7);
    punch_hole(&mut track, "Nose", 40..52);
    punch_hole(&mut track, "Tail_tip", 100..160);
    punch_hole(&mut track, "Left_fhip", 200..202);
    let presence = PresenceMask::from_track(&track);

    let out = repair(
        &track,
        &presence,
        &SkeletonPreset::Deepof14.skeleton(),
        None,
        &full(),
    )
    .unwrap();

    assert!(!out.has_missing());
    assert_observed_kept(&track, &presence, &out);
}

#[test]
fn single_axis_gaps_keep_the_observed_axis() {
    let mut track = mouse_track(300, "", 0.5, 17);
    punch_axis(&mut track, "Nose", Axis::Y, 50..70);
    punch_axis(&mut track, "Left_bhip", Axis::X, 120..150);
    punch_hole(&mut track, "Tail_1", 200..230);
    let presence = PresenceMask::from_track(&track);

    let out = repair(
        &track,
        &presence,
        &SkeletonPreset::Deepof14.skeleton(),
        None,
        &full(),
    )
    .unwrap();

    assert!(!out.has_missing());
    assert_observed_kept(&track, &presence, &out);
}

#[test]
fn complete_track_is_left_alone() {
    let track = mouse_track(120, "", 0.5, 3);
    let presence = PresenceMask::from_track(&track);
    let out = repair(
        &track,
        &presence,
        &SkeletonPreset::Deepof14.skeleton(),
        None,
        &full(),
    )
    .unwrap();
    assert_eq!(bits(&out), bits(&track));
}

#[test]
fn five_frame_gap_respects_skeleton() {
    let mut track = mouse_track(300, "", 0.3, 11);
    punch_hole(&mut track, "Left_ear", 100..105);
    let presence = PresenceMask::from_track(&track);
    let skeleton = SkeletonPreset::Deepof14.skeleton();
    let graph = ConstraintGraph::build(&track, &presence, &skeleton, 100).unwrap();

    let out = repair(&track, &presence, &skeleton, None, &full()).unwrap();

    let names = track.body_parts();
    let ear = names.get("Left_ear").unwrap();
    let edges = graph
        .constraints()
        .iter()
        .filter(|c| c.part_a == ear || c.part_b == ear)
        .collect::<Vec<_>>();
    assert!(!edges.is_empty());

    for frame in 100..105 {
        for c in &edges {
            let neighbour = names.name(if c.part_a == ear { c.part_b } else { c.part_a });
            let expected = c.expected_distance;
            let got = distance(&out, frame, "Left_ear", neighbour);
            assert!(
                (got - expected).abs() <= 0.1 * expected,
                "frame {frame}: Left_ear-{neighbour} = {got:.3}, expected {expected:.3}"
            );
        }
    }
}

#[test]
fn interpolation_only_closes_short_gaps() {
    let mut track = mouse_track(80, "", 0.0, 1);
    punch_hole(&mut track, "Nose", 20..23);
    punch_hole(&mut track, "Tail_tip", 40..44);
    let presence = PresenceMask::from_track(&track);

    let out = repair(
        &track,
        &presence,
        &SkeletonPreset::Deepof14.skeleton(),
        None,
        &RepairConfig::default(),
    )
    .unwrap();

    let nose = out.body_parts().get("Nose").unwrap();
    let tip = out.body_parts().get("Tail_tip").unwrap();
    assert!((20..23).all(|f| out.point(f, nose).iter().all(|v| v.is_finite())));
    assert!((40..44).all(|f| out.point(f, tip).iter().all(|v| v.is_nan())));
}

#[test]
fn no_complete_frame_is_insufficient_data() {
    let mut track = mouse_track(60, "", 0.2, 5);
    let names: Vec<String> = track.body_parts().names().to_vec();
    for frame in 0..60 {
        punch_hole(&mut track, &names[frame % names.len()], frame..frame + 1);
    }
    punch_hole(&mut track, "Center", 20..30);
    let before = bits(&track);
    let presence = PresenceMask::from_track(&track);

    let res = repair(
        &track,
        &presence,
        &SkeletonPreset::Deepof14.skeleton(),
        None,
        &full(),
    );
    assert!(matches!(res, Err(RepairError::InsufficientData(_))));
    assert_eq!(bits(&track), before);
}

#[test]
fn mismatched_prefix_is_a_configuration_error() {
    let mut track = mouse_track(60, "", 0.2, 9);
    punch_hole(&mut track, "Nose", 10..20);
    let presence = PresenceMask::from_track(&track);
    let skeleton = SkeletonPreset::Deepof14.for_individual("B", &[]);

    let res = repair(&track, &presence, &skeleton, None, &full());
    assert!(matches!(res, Err(RepairError::Configuration(_))));
}

#[test]
fn table_round_trip_keeps_layout() {
    let mut track = mouse_track(100, "B", 0.3, 13);
    punch_hole(&mut track, "B_Tail_base", 30..40);
    let table = as_table(&track);

    let mut session = RepairSession::new(full());
    let skeleton = SkeletonPreset::Deepof14.for_individual("B", &[]);
    let repaired = session.repair_table("B", &table, None, &skeleton).unwrap();

    assert_eq!(repaired.columns(), table.columns());
    assert_eq!(repaired.values().shape(), table.values().shape());
    assert_eq!(repaired.values().column(0), table.values().column(0));
    assert!(repaired.values().iter().all(|v| v.is_finite()));
    assert_eq!(session.cache().len(), 1);
}

#[test]
fn batch_repairs_every_individual() {
    let mut set = TrackSet::default();
    for (seed, id) in [(21, "B"), (22, "W")] {
        let mut track = mouse_track(150, id, 0.3, seed);
        punch_hole(&mut track, &common::label(id, "Spine_2"), 60..70);
        let skeleton = SkeletonPreset::Deepof11.for_individual(id, &[]);
        set.insert(
            TrackKey::new("open_field", id),
            RepairJob::from_track(track, skeleton),
        );
    }

    let mut session = RepairSession::new(full());
    let results = set.repair_all(&mut session);
    let summary = BatchSummary::from_results(&results);

    assert_eq!(summary.repaired, 2);
    assert_eq!(summary.failed + summary.insufficient_data, 0);
    assert_eq!(summary.still_missing, 0);
    assert_eq!(session.cache().len(), 2);
}
