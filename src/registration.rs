use ndarray::Array2;

use crate::trajectory::PoseInterval;

/// One sensor sweep: an N×3 point block bounded by the acquisition times of
/// its first and last point. Produced by a [`crate::dataset::FrameSource`] and
/// consumed exactly once by a registration engine.
#[derive(Clone, Debug)]
pub struct Frame {
    pub points: Array2<f32>,
    pub begin_timestamp: f64,
    pub end_timestamp: f64,
}

impl Frame {
    pub fn new(points: Array2<f32>, begin_timestamp: f64, end_timestamp: f64) -> Self {
        Self {
            points,
            begin_timestamp,
            end_timestamp,
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.nrows()
    }
}

/// Outcome of registering one frame. Created per call and consumed
/// immediately by the sequence loop; never retained by the engine.
#[derive(Clone, Debug)]
pub struct RegistrationSummary {
    pub success: bool,
    pub error_message: String,
    /// How many attempts the engine needed; at least 1 when `success`.
    /// Retries are internal to the engine and surface only through this
    /// counter.
    pub number_of_attempts: u32,
    /// Estimated motion over the frame, as absolute begin/end poses.
    pub frame: PoseInterval,
    /// Motion-corrected points in the world frame, for visualization.
    pub corrected_points: Array2<f32>,
}

impl RegistrationSummary {
    pub fn failure<T: ToString>(message: T) -> Self {
        Self {
            success: false,
            error_message: message.to_string(),
            number_of_attempts: 1,
            frame: PoseInterval::default(),
            corrected_points: Array2::zeros((0, 3)),
        }
    }
}

/// The odometry algorithm under benchmark. Black box: the latency of
/// `register_frame` is the timed quantity.
pub trait RegistrationEngine {
    fn register_frame(&mut self, frame: &Frame) -> RegistrationSummary;
}
