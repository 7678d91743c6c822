#![allow(dead_code)]

use std::f64::consts::TAU;
use std::ops::Range;

use nalgebra::{DMatrix, Vector2};
use posefill::track::{
    table::{ColumnLabel, PositionTable},
    Axis, BodyPartIndex, Track,
};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Rest layout of a top-view mouse (pixels, body frame centred on `Center`).
pub const MOUSE_LAYOUT: [(&str, f64, f64); 14] = [
    ("Nose", 30.0, 0.0),
    ("Left_ear", 20.0, 6.0),
    ("Right_ear", 20.0, -6.0),
    ("Spine_1", 12.0, 0.0),
    ("Center", 0.0, 0.0),
    ("Left_fhip", 4.0, 10.0),
    ("Right_fhip", 4.0, -10.0),
    ("Spine_2", -12.0, 0.0),
    ("Left_bhip", -16.0, 10.0),
    ("Right_bhip", -16.0, -10.0),
    ("Tail_base", -26.0, 0.0),
    ("Tail_1", -36.0, 0.0),
    ("Tail_2", -46.0, 0.0),
    ("Tail_tip", -56.0, 0.0),
];

pub fn label(id: &str, body_part: &str) -> String {
    if id.is_empty() {
        body_part.to_string()
    } else {
        format!("{id}_{body_part}")
    }
}

/// Position of the body centre at `frame`: a slow loop of radius 50 px, period 200 frames.
pub fn centre(frame: usize, phase: f64) -> Vector2<f64> {
    let angle = frame as f64 * TAU / 200.0 + phase;
    Vector2::new(320.0 + 50.0 * angle.sin(), 240.0 + 50.0 * angle.cos())
}

/// A rigidly translating deepof_14 mouse with Gaussian jitter on every coordinate.
pub fn mouse_track(n_frames: usize, id: &str, noise_std: f64, seed: u64) -> Track {
    let index = BodyPartIndex::from_labels(MOUSE_LAYOUT.iter().map(|(name, _, _)| label(id, name)));
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, noise_std).unwrap();
    let phase = seed as f64 * 0.1;
    Track::from_fn(index, n_frames, |frame, bp, axis| {
        let c = centre(frame, phase);
        let (_, dx, dy) = MOUSE_LAYOUT[bp];
        let jitter = if noise_std > 0.0 {
            noise.sample(&mut rng)
        } else {
            0.0
        };
        match axis {
            Axis::X => c.x + dx + jitter,
            Axis::Y => c.y + dy + jitter,
        }
    })
}

/// Drop both coordinates of `body_part` on `frames`.
pub fn punch_hole(track: &mut Track, body_part: &str, frames: Range<usize>) {
    let bp = track.body_parts().get(body_part).unwrap();
    for f in frames {
        track.set_point(f, bp, Vector2::new(f64::NAN, f64::NAN));
    }
}

/// Drop one coordinate of `body_part` on `frames`, keeping the other.
pub fn punch_axis(track: &mut Track, body_part: &str, axis: Axis, frames: Range<usize>) {
    let bp = track.body_parts().get(body_part).unwrap();
    for f in frames {
        track.set(f, bp, axis, f64::NAN);
    }
}

pub fn distance(track: &Track, frame: usize, a: &str, b: &str) -> f64 {
    let ia = track.body_parts().get(a).unwrap();
    let ib = track.body_parts().get(b).unwrap();
    (track.point(frame, ia) - track.point(frame, ib)).norm()
}

/// Table view of a track, with a leading `Row` bookkeeping column.
pub fn as_table(track: &Track) -> PositionTable {
    let mut columns = vec![ColumnLabel::new("Row", Axis::X)];
    for name in track.body_parts().names() {
        columns.push(ColumnLabel::new(name.clone(), Axis::X));
        columns.push(ColumnLabel::new(name.clone(), Axis::Y));
    }
    let values = DMatrix::from_fn(track.n_frames(), columns.len(), |r, c| {
        if c == 0 {
            r as f64
        } else {
            track.values()[(r, c - 1)]
        }
    });
    PositionTable::new(columns, values).unwrap()
}
