//! Per-frame uniform data.
//!
//! All structures use `#[repr(C)]` and implement `Pod` so they can be copied
//! into GPU memory or push constants as raw bytes. Blocks read through uniform
//! buffers follow std140 rules.

use bytemuck::{Pod, Zeroable};
use forge_resources::Material;
use forge_scene::{Light, LightKind};
use glam::{Mat4, Vec3, Vec4};
use tracing::warn;

/// Lights the mesh shaders can read per frame.
pub const MAX_SHADER_LIGHTS: usize = 16;

/// Half extent of the region covered by the directional shadow map, centred
/// on the world origin.
pub const SHADOW_SCENE_RADIUS: f32 = 10.0;

/// Camera matrices.
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: view-projection matrix (64 bytes)
/// - Offset 192: camera position (12 bytes) plus padding (4 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub position: Vec3,
    pub _padding: f32,
}

impl CameraUniform {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(view: Mat4, projection: Mat4, position: Vec3) -> Self {
        Self {
            view,
            projection,
            view_projection: projection * view,
            position,
            _padding: 0.0,
        }
    }
}

/// Per-object transform: world matrix and its inverse transpose.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectUniform {
    pub world: Mat4,
    pub normal_matrix: Mat4,
}

impl Default for ObjectUniform {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            normal_matrix: Mat4::IDENTITY,
        }
    }
}

impl ObjectUniform {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Builds the normal matrix with [`forge_scene::normal_matrix`], which
    /// falls back to the identity for degenerate transforms.
    pub fn new(world: Mat4) -> Self {
        Self {
            world,
            normal_matrix: forge_scene::normal_matrix(world),
        }
    }
}

/// Surface parameters of one material.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub _padding: [f32; 2],
}

impl Default for MaterialUniform {
    fn default() -> Self {
        Self::new(Vec4::ONE, 0.0, 0.5)
    }
}

impl MaterialUniform {
    pub fn new(base_color: Vec4, metallic: f32, roughness: f32) -> Self {
        Self {
            base_color,
            metallic,
            roughness,
            _padding: [0.0; 2],
        }
    }
}

impl From<&Material> for MaterialUniform {
    fn from(material: &Material) -> Self {
        Self::new(material.base_color, material.metallic, material.roughness)
    }
}

/// Push constant block shared by the mesh and shadow shaders.
///
/// # Memory Layout
///
/// - Offset 0: world matrix (64 bytes)
/// - Offset 64: base color (16 bytes)
/// - Offset 80: metallic, roughness, padding (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawConstants {
    pub world: Mat4,
    pub material: MaterialUniform,
}

impl DrawConstants {
    pub fn new(object: &ObjectUniform, material: &MaterialUniform) -> Self {
        Self {
            world: object.world,
            material: *material,
        }
    }
}

/// One light in world space.
///
/// - `position.w`: light kind tag (0 directional, 1 point, 2 spot)
/// - `direction.w`: range
/// - `color.w`: intensity
/// - `cone.xy`: inner and outer cutoff cosines for spot lights
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SceneLight {
    pub position: Vec4,
    pub direction: Vec4,
    pub color: Vec4,
    pub cone: Vec4,
}

impl SceneLight {
    /// Place `light` using its entity's world matrix. The light points along
    /// the entity's local -Z axis.
    pub fn from_light(light: &Light, world: Mat4) -> Self {
        let position = world.transform_point3(Vec3::ZERO);
        let direction = world.transform_vector3(Vec3::NEG_Z).normalize_or_zero();
        let cone = match light.kind {
            LightKind::Spot {
                inner_cutoff,
                outer_cutoff,
            } => Vec4::new(inner_cutoff, outer_cutoff, 0.0, 0.0),
            _ => Vec4::ZERO,
        };

        Self {
            position: position.extend(light.kind.tag() as f32),
            direction: direction.extend(light.range),
            color: light.color.extend(light.intensity),
            cone,
        }
    }

    pub fn kind_tag(&self) -> u32 {
        self.position.w as u32
    }
}

/// View-projection of an orthographic shadow camera looking along
/// `direction` at `center`, covering a cube of half extent `radius`.
///
/// The Y axis is flipped for Vulkan clip space, like camera projections.
pub fn directional_shadow_matrix(direction: Vec3, center: Vec3, radius: f32) -> Mat4 {
    let direction = match direction.try_normalize() {
        Some(direction) => direction,
        None => Vec3::NEG_Y,
    };
    let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let eye = center - direction * radius * 2.0;
    let view = Mat4::look_at_rh(eye, center, up);
    let mut projection = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, radius * 4.0);
    projection.y_axis.y *= -1.0;
    projection * view
}

/// Lights gathered for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LightingData {
    pub ambient_color: Vec3,
    pub lights: Vec<SceneLight>,
    /// Shadow camera of the last enabled directional light, if any.
    pub light_view_projection: Option<Mat4>,
}

impl LightingData {
    pub fn clear(&mut self) {
        self.ambient_color = Vec3::ZERO;
        self.lights.clear();
        self.light_view_projection = None;
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }
}

/// Lighting block read by the mesh shaders (set 0, binding 1).
///
/// # Memory Layout
///
/// - Offset 0: ambient color (16 bytes)
/// - Offset 16: light view-projection (64 bytes)
/// - Offset 80: light count, shadow flag, padding (16 bytes)
/// - Offset 96: lights (64 bytes each)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightingUniform {
    pub ambient_color: Vec4,
    pub light_view_projection: Mat4,
    pub light_count: u32,
    /// 1 when `light_view_projection` and the shadow map are valid.
    pub shadow_enabled: u32,
    pub _padding: [u32; 2],
    pub lights: [SceneLight; MAX_SHADER_LIGHTS],
}

impl LightingUniform {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Packs `lighting`, keeping the first [`MAX_SHADER_LIGHTS`] lights.
    pub fn new(lighting: &LightingData) -> Self {
        if lighting.len() > MAX_SHADER_LIGHTS {
            warn!(
                "{} lights collected, shaders read the first {}",
                lighting.len(),
                MAX_SHADER_LIGHTS
            );
        }

        let mut lights = [SceneLight::default(); MAX_SHADER_LIGHTS];
        let count = lighting.len().min(MAX_SHADER_LIGHTS);
        lights[..count].copy_from_slice(&lighting.lights[..count]);

        Self {
            ambient_color: lighting.ambient_color.extend(1.0),
            light_view_projection: lighting.light_view_projection.unwrap_or(Mat4::IDENTITY),
            light_count: count as u32,
            shadow_enabled: u32::from(lighting.light_view_projection.is_some()),
            _padding: [0; 2],
            lights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_uniform_layout() {
        assert_eq!(CameraUniform::SIZE, 208);
        assert_eq!(std::mem::align_of::<CameraUniform>(), 16);
    }

    #[test]
    fn test_object_uniform_layout() {
        assert_eq!(ObjectUniform::SIZE, 128);
        assert_eq!(ObjectUniform::default().world, Mat4::IDENTITY);
    }

    #[test]
    fn test_draw_constants_fill_push_constant_block() {
        assert_eq!(
            std::mem::size_of::<DrawConstants>(),
            forge_rhi::PUSH_CONSTANT_SIZE as usize
        );
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 32);
    }

    #[test]
    fn test_draw_constants_carry_material() {
        let material = Material::new(forge_resources::ResourceId::INVALID)
            .with_base_color(Vec4::new(0.8, 0.1, 0.1, 1.0));
        let surface = MaterialUniform::from(&material);
        let object = ObjectUniform::new(Mat4::from_translation(Vec3::Y));
        let constants = DrawConstants::new(&object, &surface);

        assert_eq!(constants.world, object.world);
        assert_eq!(constants.material.base_color, Vec4::new(0.8, 0.1, 0.1, 1.0));
        assert_eq!(constants.material.roughness, 0.5);
    }

    #[test]
    fn test_lighting_uniform_layout() {
        assert_eq!(LightingUniform::SIZE, 96 + 64 * MAX_SHADER_LIGHTS);
        assert_eq!(std::mem::offset_of!(LightingUniform, light_count), 80);
        assert_eq!(std::mem::offset_of!(LightingUniform, lights), 96);
    }

    #[test]
    fn test_lighting_uniform_packs_lights() {
        let lighting = LightingData {
            ambient_color: Vec3::splat(0.1),
            lights: vec![SceneLight::from_light(&Light::point(Vec3::ONE, 3.0, 5.0), Mat4::IDENTITY)],
            light_view_projection: None,
        };
        let packed = LightingUniform::new(&lighting);

        assert_eq!(packed.light_count, 1);
        assert_eq!(packed.shadow_enabled, 0);
        assert_eq!(packed.ambient_color, Vec4::new(0.1, 0.1, 0.1, 1.0));
        assert_eq!(packed.lights[0], lighting.lights[0]);
        assert_eq!(packed.lights[1], SceneLight::default());
    }

    #[test]
    fn test_lighting_uniform_truncates_extra_lights() {
        let light = SceneLight::from_light(&Light::point(Vec3::ONE, 1.0, 1.0), Mat4::IDENTITY);
        let lighting = LightingData {
            ambient_color: Vec3::ZERO,
            lights: vec![light; MAX_SHADER_LIGHTS + 4],
            light_view_projection: Some(Mat4::IDENTITY),
        };
        let packed = LightingUniform::new(&lighting);

        assert_eq!(packed.light_count as usize, MAX_SHADER_LIGHTS);
        assert_eq!(packed.shadow_enabled, 1);
    }

    #[test]
    fn test_directional_shadow_matrix_centres_origin() {
        let matrix = directional_shadow_matrix(Vec3::new(0.3, -1.0, 0.2), Vec3::ZERO, SHADOW_SCENE_RADIUS);
        let clip = matrix * Vec4::new(0.0, 0.0, 0.0, 1.0);

        assert!(clip.x.abs() < 1e-5);
        assert!(clip.y.abs() < 1e-5);
        assert!((clip.z - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_directional_shadow_matrix_straight_down() {
        let matrix = directional_shadow_matrix(Vec3::NEG_Y, Vec3::ZERO, 10.0);
        assert!(matrix.is_finite());
    }

    #[test]
    fn test_camera_uniform_combines_matrices() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(45.0_f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
        let camera = CameraUniform::new(view, projection, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(camera.view_projection, projection * view);
    }

    #[test]
    fn test_object_uniform_degenerate_scale() {
        let object = ObjectUniform::new(Mat4::from_scale(Vec3::ZERO));
        assert_eq!(object.normal_matrix, Mat4::IDENTITY);
    }

    #[test]
    fn test_scene_light_packs_spot_cone() {
        let mut light = Light::spot(Vec3::ONE, 2.0, 10.0);
        light.kind = LightKind::Spot {
            inner_cutoff: 0.9,
            outer_cutoff: 0.8,
        };
        let packed = SceneLight::from_light(&light, Mat4::from_translation(Vec3::X));

        assert_eq!(packed.kind_tag(), 2);
        assert!(packed.position.truncate().abs_diff_eq(Vec3::X, 1e-6));
        assert!(packed.direction.truncate().abs_diff_eq(Vec3::NEG_Z, 1e-6));
        assert_eq!(packed.direction.w, 10.0);
        assert_eq!(packed.color.w, 2.0);
        assert_eq!(packed.cone.x, 0.9);
    }
}
