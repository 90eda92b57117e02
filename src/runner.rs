use std::thread;
use std::time::{Duration, Instant};

use crate::{
    dataset::FrameSource,
    error::BenchError,
    registration::RegistrationEngine,
    trajectory::{PoseInterval, Trajectory},
    viz::{VizSink, POINT_CLOUD_SLOTS},
};

/// Delay between polls of the advisory pause flag.
const PAUSE_POLL: Duration = Duration::from_millis(10);

/// How a sequence run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Frame source exhausted or frame limit reached.
    Completed,
    /// Registration failed; the trajectory up to `frame_index` is preserved
    /// for partial evaluation.
    Failed {
        frame_index: usize,
        message: String,
    },
}

/// Result of driving one sequence end to end.
#[derive(Clone, Debug)]
pub struct SequenceRun {
    /// One mid pose per successfully registered frame.
    pub trajectory: Trajectory,
    /// The full begin/end pose intervals, index-aligned with `trajectory`.
    pub intervals: Vec<PoseInterval>,
    pub frames_processed: usize,
    /// Mean `number_of_attempts` per processed frame; 0.0 when no frame was
    /// processed.
    pub avg_attempts: f64,
    /// Registration-only wall time, excluding frame decoding.
    pub registration_elapsed_ms: f64,
    pub outcome: SequenceOutcome,
}

/// Drives one sequence: pulls frames, invokes registration, times the calls
/// and mirrors progress to the visualization sink.
///
/// A registration failure ends the sequence but is not an error of the run
/// loop itself; escalation under `suspend_on_failure` is the caller's
/// decision.
pub fn run_sequence(
    sequence_name: &str,
    source: &mut dyn FrameSource,
    engine: &mut dyn RegistrationEngine,
    viz: Option<&dyn VizSink>,
    max_frames: Option<usize>,
) -> Result<SequenceRun, BenchError> {
    let mut trajectory = Trajectory::default();
    let mut intervals = Vec::new();
    let mut attempts_sum = 0.0;
    let mut registration_elapsed_ms = 0.0;
    let mut frame_id = 0usize;
    let mut outcome = SequenceOutcome::Completed;

    while source.has_next() && max_frames.map_or(true, |limit| frame_id < limit) {
        let frame_start = Instant::now();
        let frame = source.next_frame()?;
        let frame_read = Instant::now();

        let summary = engine.register_frame(&frame);
        let frame_registered = Instant::now();

        let registration_ms = (frame_registered - frame_read).as_secs_f64() * 1000.0;
        registration_elapsed_ms += registration_ms;
        attempts_sum += f64::from(summary.number_of_attempts);
        log::debug!(
            "Sequence {sequence_name} frame {frame_id}: {} points, total {:.2} ms, registration {:.2} ms",
            frame.num_points(),
            (frame_registered - frame_start).as_secs_f64() * 1000.0,
            registration_ms
        );

        if !summary.success {
            log::error!(
                "Error while registering sequence {sequence_name} at frame index {frame_id}: {}",
                summary.error_message
            );
            outcome = SequenceOutcome::Failed {
                frame_index: frame_id,
                message: summary.error_message,
            };
            break;
        }

        trajectory.push(summary.frame.mid_pose());
        intervals.push(summary.frame);

        if let Some(viz) = viz {
            viz.upload_trajectory(&trajectory);
            viz.upload_point_cloud(frame_id % POINT_CLOUD_SLOTS, &summary.corrected_points);
            // Advisory gate: the frame above is already committed, pausing
            // only delays the side effects of the next one.
            while viz.is_paused() {
                thread::sleep(PAUSE_POLL);
            }
        }

        frame_id += 1;
    }

    let avg_attempts = if frame_id > 0 {
        attempts_sum / frame_id as f64
    } else {
        0.0
    };

    Ok(SequenceRun {
        trajectory,
        intervals,
        frames_processed: frame_id,
        avg_attempts,
        registration_elapsed_ms,
        outcome,
    })
}
