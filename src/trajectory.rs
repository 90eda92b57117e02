use std::ops::Index;

use crate::transform::Transform;

/// Continuous motion over a single frame: the sensor pose at the first and
/// last point timestamps of the sweep.
#[derive(Clone, Debug, Default)]
pub struct PoseInterval {
    pub begin_pose: Transform,
    pub end_pose: Transform,
}

impl PoseInterval {
    pub fn new(begin_pose: Transform, end_pose: Transform) -> Self {
        Self {
            begin_pose,
            end_pose,
        }
    }

    /// Interval with no motion, begin and end at the same pose.
    pub fn rigid(pose: Transform) -> Self {
        Self {
            begin_pose: pose.clone(),
            end_pose: pose,
        }
    }

    /// Pose at the middle of the sweep. This is the per-frame pose used for
    /// trajectories and visualization.
    pub fn mid_pose(&self) -> Transform {
        self.begin_pose.interpolate(&self.end_pose, 0.5)
    }
}

/// Ordered sequence of poses, one per frame, indexed by processing order.
#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    pub poses: Vec<Transform>,
}

impl Trajectory {
    /// Adds a new pose to the trajectory.
    pub fn push(&mut self, pose: Transform) {
        self.poses.push(pose);
    }

    /// Returns the number of poses in the trajectory.
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// Returns true if the trajectory is empty.
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transform> + '_ {
        self.poses.iter()
    }

    /// Motion from the pose at `from_index` to the pose at `to_index`,
    /// i.e. `poses[from]⁻¹ * poses[to]`. `None` if either index is out of
    /// range.
    pub fn relative(&self, from_index: usize, to_index: usize) -> Option<Transform> {
        let from = self.poses.get(from_index)?;
        let to = self.poses.get(to_index)?;
        Some(&from.inverse() * to)
    }

    /// Creates a new trajectory with the poses transformed in such a way that
    /// the first pose is at origin.
    pub fn first_frame_at_origin(&self) -> Self {
        if self.poses.is_empty() {
            return self.clone();
        }

        let first_inv = self.poses[0].inverse();
        Self {
            poses: self
                .poses
                .iter()
                .map(|pose| &first_inv * pose)
                .collect::<Vec<Transform>>(),
        }
    }

    /// Creates a new trajectory with the given range.
    ///
    /// # Arguments
    ///
    /// * `start` - Inclusive start index of the range.
    /// * `end` - Exclusive end index of the range.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self {
            poses: self.poses[start..end].to_vec(),
        }
    }

    /// Gets the last pose. `None` if the trajectory is empty.
    pub fn last(&self) -> Option<&Transform> {
        self.poses.last()
    }
}

impl FromIterator<Transform> for Trajectory {
    /// Creates a new trajectory from a `Transform` iterator.
    /// Use with the `collect::<Trajectory>` method.
    fn from_iter<T: IntoIterator<Item = Transform>>(iter: T) -> Self {
        Self {
            poses: iter.into_iter().collect(),
        }
    }
}

impl Index<usize> for Trajectory {
    type Output = Transform;

    /// Returns the pose at the given index.
    fn index(&self, index: usize) -> &Self::Output {
        &self.poses[index]
    }
}
