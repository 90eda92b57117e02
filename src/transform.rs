use nalgebra::{Isometry3, Matrix4, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};
use ndarray::{Array2, Axis};

use std::ops;

/// Rigid 3D transform (rotation + translation). Poses and pose deltas are all
/// instances of this type; no other pose representation is used.
#[derive(Clone, Debug)]
pub struct Transform(Isometry3<f64>);

impl Transform {
    /// Identity transform.
    pub fn eye() -> Self {
        Self(Isometry3::identity())
    }

    pub fn new(translation: &Vector3<f64>, rotation: &UnitQuaternion<f64>) -> Self {
        Self(Isometry3::from_parts(
            Translation3::from(*translation),
            *rotation,
        ))
    }

    pub fn from_matrix4(matrix: &Matrix4<f64>) -> Self {
        let translation = Translation3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(
            &matrix.fixed_slice::<3, 3>(0, 0).into_owned(),
        ));
        Self(Isometry3::from_parts(translation, rotation))
    }

    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.0.translation.vector
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.0.rotation
    }

    /// Rotation angle in radians.
    pub fn angle(&self) -> f64 {
        self.0.rotation.angle()
    }

    /// Interpolates between `self` (t = 0) and `other` (t = 1): linear on the
    /// translation, spherical-linear on the rotation.
    pub fn interpolate(&self, other: &Transform, t: f64) -> Transform {
        let translation = self
            .0
            .translation
            .vector
            .lerp(&other.0.translation.vector, t);
        let rotation = self
            .0
            .rotation
            .try_slerp(&other.0.rotation, t, 1e-9)
            .unwrap_or(other.0.rotation);
        Transform::new(&translation, &rotation)
    }

    /// Applies the transform to an N×3 point block in place.
    pub fn transform(&self, mut points: Array2<f32>) -> Array2<f32> {
        for mut point in points.axis_iter_mut(Axis(0)) {
            // Points, not vectors: rotation and translation both apply.
            let v = self.0
                * Point3::new(
                    f64::from(point[0]),
                    f64::from(point[1]),
                    f64::from(point[2]),
                );
            point[0] = v[0] as f32;
            point[1] = v[1] as f32;
            point[2] = v[2] as f32;
        }

        points
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::eye()
    }
}

impl ops::Mul<&Transform> for &Transform {
    type Output = Transform;

    fn mul(self, rhs: &Transform) -> Self::Output {
        Transform(self.0 * rhs.0)
    }
}

impl From<Transform> for Matrix4<f64> {
    fn from(transform: Transform) -> Self {
        transform.0.into()
    }
}

#[cfg(test)]
mod tests {
    use super::Transform;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};
    use ndarray::array;

    #[test]
    fn test_mul_op() {
        let eye = Transform::eye();
        let step = Transform::new(
            &Vector3::new(1.0, 0.0, 0.0),
            &UnitQuaternion::from_scaled_axis(Vector3::zeros()),
        );

        let composed = &eye * &step;
        assert_relative_eq!(composed.translation(), step.translation());

        let twice = &step * &step;
        assert_relative_eq!(twice.translation(), Vector3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_inverse_cancels() {
        let transform = Transform::new(
            &Vector3::new(0.5, -2.0, 3.0),
            &UnitQuaternion::from_scaled_axis(Vector3::y() * 0.75),
        );

        let identity = &transform.inverse() * &transform;
        assert_relative_eq!(identity.translation().norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(identity.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_angle() {
        let transform = Transform::new(
            &Vector3::zeros(),
            &UnitQuaternion::from_scaled_axis(Vector3::z() * 0.25),
        );
        assert_relative_eq!(transform.angle(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_points() {
        let transform = Transform::new(
            &Vector3::new(0.0, 0.0, 3.0),
            &UnitQuaternion::from_scaled_axis(Vector3::y() * std::f64::consts::PI),
        );
        let points = transform.transform(array![[1.0f32, 2.0, 3.0], [1.0, 2.0, 3.0]]);
        let expected = array![[-1.0f32, 2.0, 0.0], [-1.0, 2.0, 0.0]];

        for (value, expected) in points.iter().zip(expected.iter()) {
            assert!((value - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_transform_points_pure_translation() {
        let transform = Transform::new(
            &Vector3::new(0.0, 0.0, 3.0),
            &UnitQuaternion::from_scaled_axis(Vector3::zeros()),
        );
        let points = transform.transform(array![[1.0f32, 2.0, 3.0]]);

        assert!((points[[0, 0]] - 1.0).abs() < 1e-6);
        assert!((points[[0, 1]] - 2.0).abs() < 1e-6);
        assert!((points[[0, 2]] - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_interpolate_midpoint() {
        let begin = Transform::eye();
        let end = Transform::new(
            &Vector3::new(2.0, 0.0, 0.0),
            &UnitQuaternion::from_scaled_axis(Vector3::z() * 0.5),
        );

        let mid = begin.interpolate(&end, 0.5);
        assert_relative_eq!(mid.translation(), Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(mid.angle(), 0.25, epsilon = 1e-9);
    }
}
