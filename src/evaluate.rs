use itertools::Itertools;
use serde_derive::{Deserialize, Serialize};

use crate::trajectory::Trajectory;

/// Segment lengths (meters) used for the windowed relative pose error, as in
/// the KITTI odometry benchmark.
pub const SEGMENT_LENGTHS_M: [f64; 8] = [
    100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 800.0,
];

/// Stride, in frames, between consecutive RPE window starts.
const SEGMENT_STEP_FRAMES: usize = 10;

/// Error of one fixed-path-length evaluation window. Translation error is a
/// fraction of the segment length, rotation error is radians per meter.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SegmentError {
    pub t_err: f64,
    pub r_err: f64,
}

/// Per-sequence error metrics against ground truth. Immutable once built.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SequenceErrors {
    /// Mean segment translation error, in percent.
    pub mean_rpe: f64,
    pub mean_ape: f64,
    pub max_ape: f64,
    pub mean_local_err: f64,
    pub max_local_err: f64,
    /// Index of the first frame pair attaining `max_local_err`; `None` when
    /// the trajectory has fewer than two frames.
    pub index_max_local_err: Option<usize>,
    pub average_elapsed_ms: f64,
    pub mean_num_attempts: f64,
    /// How many pose pairs were compared; the common prefix length when the
    /// report is not `valid`.
    pub num_poses: usize,
    pub segments: Vec<SegmentError>,
    /// False when the estimate and ground truth had different lengths and the
    /// metrics were computed on the common prefix.
    pub valid: bool,
}

impl SequenceErrors {
    /// Attaches the sequence timing statistics, which come from the run loop
    /// rather than from the trajectories.
    pub fn with_timing(mut self, average_elapsed_ms: f64, mean_num_attempts: f64) -> Self {
        self.average_elapsed_ms = average_elapsed_ms;
        self.mean_num_attempts = mean_num_attempts;
        self
    }
}

/// Cumulative arc length traveled up to each frame.
fn trajectory_distances(trajectory: &Trajectory) -> Vec<f64> {
    let mut distances = Vec::with_capacity(trajectory.len());
    if trajectory.is_empty() {
        return distances;
    }

    distances.push(0.0);
    for (prev, curr) in trajectory.iter().tuple_windows() {
        let step = (curr.translation() - prev.translation()).norm();
        let total = distances.last().copied().unwrap_or(0.0) + step;
        distances.push(total);
    }
    distances
}

/// Finds the frame whose traveled distance from `first` most closely matches
/// `target`. `None` when the remaining arc is shorter than `target`.
fn closest_frame_at_distance(distances: &[f64], first: usize, target: f64) -> Option<usize> {
    let start = distances[first];
    let end = *distances.last()?;
    if end - start < target {
        return None;
    }

    let mut best = first;
    let mut best_gap = f64::INFINITY;
    for (index, &distance) in distances.iter().enumerate().skip(first + 1) {
        let gap = ((distance - start) - target).abs();
        if gap < best_gap {
            best = index;
            best_gap = gap;
        }
        // Distances are monotonic; once past the target the gap only grows.
        if distance - start > target {
            break;
        }
    }

    (best != first).then(|| best)
}

/// Scores an estimated trajectory against ground truth.
///
/// A length mismatch never faults: the metrics are computed on the common
/// prefix and the report is flagged invalid.
pub fn evaluate(ground_truth: &Trajectory, estimate: &Trajectory) -> SequenceErrors {
    let valid = ground_truth.len() == estimate.len();
    if !valid {
        log::warn!(
            "Trajectory length mismatch: ground truth {} poses, estimate {} poses; \
             evaluating on the common prefix",
            ground_truth.len(),
            estimate.len()
        );
    }
    let common = ground_truth.len().min(estimate.len());
    let gt = ground_truth.slice(0, common);
    let est = estimate.slice(0, common);

    // Windowed RPE over fixed path lengths.
    let distances = trajectory_distances(&gt);
    let mut segments = Vec::new();
    for first in (0..common).step_by(SEGMENT_STEP_FRAMES) {
        for &length in SEGMENT_LENGTHS_M.iter() {
            let last = match closest_frame_at_distance(&distances, first, length) {
                Some(last) => last,
                None => continue,
            };
            if let (Some(delta_gt), Some(delta_est)) =
                (gt.relative(first, last), est.relative(first, last))
            {
                let error = &delta_est.inverse() * &delta_gt;
                segments.push(SegmentError {
                    t_err: error.translation().norm() / length,
                    r_err: error.angle() / length,
                });
            }
        }
    }
    let mean_rpe = if segments.is_empty() {
        0.0
    } else {
        100.0 * segments.iter().map(|segment| segment.t_err).sum::<f64>() / segments.len() as f64
    };

    // APE after anchoring both trajectories at the first common frame.
    let gt_anchored = gt.first_frame_at_origin();
    let est_anchored = est.first_frame_at_origin();
    let mut mean_ape = 0.0;
    let mut max_ape = 0.0f64;
    for (gt_pose, est_pose) in gt_anchored.iter().zip(est_anchored.iter()) {
        let ape = (gt_pose.translation() - est_pose.translation()).norm();
        mean_ape += ape;
        max_ape = max_ape.max(ape);
    }
    if common > 0 {
        mean_ape /= common as f64;
    }

    // Frame-to-frame drift; argmax keeps the first occurrence.
    let mut mean_local_err = 0.0;
    let mut max_local_err = 0.0f64;
    let mut index_max_local_err = None;
    for (index, ((gt_prev, gt_curr), (est_prev, est_curr))) in gt
        .iter()
        .tuple_windows()
        .zip(est.iter().tuple_windows())
        .enumerate()
    {
        let gt_step = &gt_prev.inverse() * gt_curr;
        let est_step = &est_prev.inverse() * est_curr;
        let drift = (gt_step.translation() - est_step.translation()).norm();

        mean_local_err += drift;
        if index_max_local_err.is_none() || drift > max_local_err {
            max_local_err = drift;
            index_max_local_err = Some(index);
        }
    }
    let num_pairs = common.saturating_sub(1);
    if num_pairs > 0 {
        mean_local_err /= num_pairs as f64;
    }

    SequenceErrors {
        mean_rpe,
        mean_ape,
        max_ape,
        mean_local_err,
        max_local_err,
        index_max_local_err,
        average_elapsed_ms: 0.0,
        mean_num_attempts: 0.0,
        num_poses: common,
        segments,
        valid,
    }
}
