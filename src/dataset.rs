use crate::{error::BenchError, registration::Frame, trajectory::Trajectory};

/// Identifies one benchmark trial within a dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceInfo {
    pub id: usize,
    pub name: String,
}

/// Iterator-style access to the frames of one sequence.
pub trait FrameSource {
    fn has_next(&self) -> bool;
    fn next_frame(&mut self) -> Result<Frame, BenchError>;
    /// Skips directly to the given frame index.
    fn set_init_frame(&mut self, index: usize);
}

/// A dataset of recorded sequences, optionally paired with ground-truth
/// trajectories. Decoding of the on-disk formats lives behind this trait.
pub trait SequenceDataset {
    fn sequences(&self) -> Vec<SequenceInfo>;
    fn frame_source(&self, sequence: &SequenceInfo) -> Result<Box<dyn FrameSource>, BenchError>;
    fn has_ground_truth(&self, sequence: &SequenceInfo) -> bool;
    /// One absolute pose per frame. Only called when
    /// [`SequenceDataset::has_ground_truth`] is true.
    fn load_ground_truth(&self, sequence: &SequenceInfo) -> Result<Trajectory, BenchError>;
}

/// In-memory frame source over a fixed list of frames. Each frame is handed
/// out once.
pub struct VecFrameSource {
    frames: Vec<Option<Frame>>,
    next: usize,
}

impl VecFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into_iter().map(Some).collect(),
            next: 0,
        }
    }
}

impl FrameSource for VecFrameSource {
    fn has_next(&self) -> bool {
        self.next < self.frames.len()
    }

    fn next_frame(&mut self) -> Result<Frame, BenchError> {
        let slot = self
            .frames
            .get_mut(self.next)
            .ok_or_else(|| BenchError::invalid_parameter("Frame source is exhausted"))?;
        self.next += 1;
        slot.take()
            .ok_or_else(|| BenchError::invalid_parameter("Frame was already consumed"))
    }

    fn set_init_frame(&mut self, index: usize) {
        self.next = index.min(self.frames.len());
    }
}
