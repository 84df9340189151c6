//! Transform component for scene entities.
//!
//! A [`Transform`] is local to its entity. World matrices are resolved by the
//! [`Scene`](crate::Scene), which walks the parent chain.

use glam::{Mat4, Quat, Vec3};

/// Determinant magnitude below which a matrix is treated as non-invertible.
const INVERTIBLE_EPSILON: f32 = 1e-6;

/// Position, rotation and scale of an entity relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Rotate so that [`forward`](Self::forward) points at `target`.
    ///
    /// Leaves the rotation untouched when `target` coincides with the position.
    pub fn looking_at(mut self, target: Vec3) -> Self {
        let to_target = target - self.position;
        if to_target.length_squared() > f32::EPSILON {
            let view = Mat4::look_at_rh(self.position, target, Vec3::Y);
            self.rotation = Quat::from_mat4(&view.inverse());
        }
        self
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    /// Apply `rotation` on top of the current orientation.
    pub fn rotate(&mut self, rotation: Quat) {
        self.rotation = (rotation * self.rotation).normalize();
    }

    /// Local transformation matrix (scale, then rotate, then translate).
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }
}

/// Inverse transpose of `world`, used to transform normals.
///
/// Falls back to the identity for non-invertible matrices (e.g. zero scale) so
/// no NaN reaches the GPU.
pub fn normal_matrix(world: Mat4) -> Mat4 {
    if world.determinant().abs() < INVERTIBLE_EPSILON {
        Mat4::IDENTITY
    } else {
        world.inverse().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn approx_eq_vec3(a: Vec3, b: Vec3) -> bool {
        a.abs_diff_eq(b, EPSILON)
    }

    #[test]
    fn test_transform_default() {
        let t = Transform::default();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.local_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_local_matrix_applies_scale_before_translation() {
        let t = Transform::new()
            .with_position(Vec3::new(1.0, 0.0, 0.0))
            .with_scale(Vec3::splat(2.0));
        let p = t.local_matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!(approx_eq_vec3(p, Vec3::new(3.0, 0.0, 0.0)));
    }

    #[test]
    fn test_normal_matrix_with_scale() {
        let world = Transform::new()
            .with_scale(Vec3::new(1.0, 2.0, 1.0))
            .local_matrix();
        assert_eq!(normal_matrix(world), world.inverse().transpose());
    }

    #[test]
    fn test_normal_matrix_non_invertible() {
        let world = Transform::new().with_scale(Vec3::ZERO).local_matrix();
        let normal = normal_matrix(world);

        assert_eq!(normal, Mat4::IDENTITY);
        assert!(!normal.is_nan());
    }

    #[test]
    fn test_direction_vectors() {
        let t = Transform::new();
        assert!(approx_eq_vec3(t.forward(), Vec3::NEG_Z));
        assert!(approx_eq_vec3(t.right(), Vec3::X));
        assert!(approx_eq_vec3(t.up(), Vec3::Y));
    }

    #[test]
    fn test_looking_at() {
        let t = Transform::new()
            .with_position(Vec3::new(0.0, 0.0, 5.0))
            .looking_at(Vec3::new(5.0, 0.0, 5.0));
        assert!(approx_eq_vec3(t.forward(), Vec3::X));
        assert!(approx_eq_vec3(t.up(), Vec3::Y));
    }

    #[test]
    fn test_looking_at_self_is_noop() {
        let t = Transform::new()
            .with_position(Vec3::ONE)
            .looking_at(Vec3::ONE);
        assert_eq!(t.rotation, Quat::IDENTITY);
    }

    #[test]
    fn test_rotate_accumulates() {
        let mut t = Transform::new();
        let quarter = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        t.rotate(quarter);
        t.rotate(quarter);
        // Two eighth turns about +Y turn -Z into -X.
        assert!(approx_eq_vec3(t.forward(), Vec3::NEG_X));
    }
}
