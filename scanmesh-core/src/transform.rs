//! Rigid 3D transformations produced by registration

use crate::point::{Point3f, Vector3f};
use nalgebra::{Isometry3, Matrix4, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// A rigid transformation (rotation followed by translation) that re-expresses
/// points in another frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub isometry: Isometry3<f32>,
}

impl Transform3D {
    /// Create an identity transformation
    pub fn identity() -> Self {
        Self {
            isometry: Isometry3::identity(),
        }
    }

    /// Create a translation transformation
    pub fn translation(translation: Vector3f) -> Self {
        Self {
            isometry: Isometry3::from_parts(Translation3::from(translation), UnitQuaternion::identity()),
        }
    }

    /// Create a rotation transformation from a quaternion
    pub fn rotation(rotation: UnitQuaternion<f32>) -> Self {
        Self {
            isometry: Isometry3::from_parts(Translation3::identity(), rotation),
        }
    }

    /// Create a transformation from translation and rotation
    pub fn from_translation_rotation(
        translation: Vector3f,
        rotation: UnitQuaternion<f32>,
    ) -> Self {
        Self {
            isometry: Isometry3::from_parts(Translation3::from(translation), rotation),
        }
    }

    /// Rotation part
    pub fn rotation_part(&self) -> UnitQuaternion<f32> {
        self.isometry.rotation
    }

    /// Translation part
    pub fn translation_part(&self) -> Vector3f {
        self.isometry.translation.vector
    }

    /// Rotation angle in radians
    pub fn rotation_angle(&self) -> f32 {
        self.isometry.rotation.angle()
    }

    /// Apply the transformation to a point
    pub fn transform_point(&self, point: &Point3f) -> Point3f {
        self.isometry.transform_point(point)
    }

    /// Apply the rotation to a vector
    pub fn transform_vector(&self, vector: &Vector3f) -> Vector3f {
        self.isometry.transform_vector(vector)
    }

    /// Compose this transformation with another (`other` is applied first)
    pub fn compose(self, other: Self) -> Self {
        Self {
            isometry: self.isometry * other.isometry,
        }
    }

    /// Get the inverse transformation
    pub fn inverse(self) -> Self {
        Self {
            isometry: self.isometry.inverse(),
        }
    }

    /// Homogeneous 4×4 matrix
    pub fn to_matrix(&self) -> Matrix4<f32> {
        self.isometry.to_homogeneous()
    }

    /// Check if this is approximately the identity transformation
    pub fn is_identity(&self, epsilon: f32) -> bool {
        self.rotation_angle().abs() < epsilon && self.translation_part().norm() < epsilon
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Transform3D {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(rhs)
    }
}

impl From<Isometry3<f32>> for Transform3D {
    fn from(isometry: Isometry3<f32>) -> Self {
        Self { isometry }
    }
}
