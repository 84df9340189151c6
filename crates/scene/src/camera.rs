//! Camera component.

use glam::Mat4;

/// Projection type for the camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        half_height: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
}

/// A camera attached to an entity.
///
/// The view matrix comes from the owning entity's world transform. The render
/// scene picks the last enabled camera flagged `main`.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub projection: Projection,
    pub enabled: bool,
    pub main: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Projection::Perspective {
                fov_y: 45.0_f32.to_radians(),
                aspect: 16.0 / 9.0,
                near: 0.1,
                far: 1000.0,
            },
            enabled: true,
            main: false,
        }
    }
}

impl Camera {
    /// A perspective camera marked as the main camera.
    pub fn main_perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            },
            enabled: true,
            main: true,
        }
    }

    /// Update the aspect ratio, typically after a resize.
    pub fn set_aspect(&mut self, new_aspect: f32) {
        match &mut self.projection {
            Projection::Perspective { aspect, .. } | Projection::Orthographic { aspect, .. } => {
                *aspect = new_aspect;
            }
        }
    }

    /// Projection matrix with the Y axis flipped for Vulkan clip space.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = match self.projection {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                half_height,
                aspect,
                near,
                far,
            } => {
                let half_width = half_height * aspect;
                Mat4::orthographic_rh(-half_width, half_width, -half_height, half_height, near, far)
            }
        };
        proj.y_axis.y *= -1.0;
        proj
    }

    /// View matrix for a camera whose entity has world matrix `camera_world`.
    pub fn view_matrix(camera_world: Mat4) -> Mat4 {
        camera_world.inverse()
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec3, Vec4};

    use super::*;
    use crate::Transform;

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let clip = camera.projection_matrix() * Vec4::new(0.0, 1.0, -1.0, 1.0);
        assert!(clip.y < 0.0);
    }

    #[test]
    fn test_view_matrix_moves_world_opposite_to_camera() {
        let world = Transform::new()
            .with_position(Vec3::new(0.0, 0.0, 5.0))
            .local_matrix();
        let view = Camera::view_matrix(world);
        let p = view.transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
    }

    #[test]
    fn test_set_aspect() {
        let mut camera = Camera::default();
        camera.set_aspect(1.0);
        assert!(matches!(
            camera.projection,
            Projection::Perspective { aspect, .. } if aspect == 1.0
        ));
    }
}
