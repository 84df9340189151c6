//! The authoritative application scene.
//!
//! A [`Scene`] is a flat list of entities with optional parents. Components are
//! plain optional fields; the renderer reads them once per frame when it builds
//! its render scene.

use glam::{Mat4, Vec3};

use forge_resources::ResourceId;

use crate::camera::Camera;
use crate::light::Light;
use crate::transform::Transform;

/// Index of an entity in its scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

/// Draws a mesh resource with one material per submesh.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshRenderer {
    pub mesh: ResourceId,
    pub materials: Vec<ResourceId>,
    pub enabled: bool,
}

impl MeshRenderer {
    pub fn new(mesh: ResourceId, materials: Vec<ResourceId>) -> Self {
        Self {
            mesh,
            materials,
            enabled: true,
        }
    }

    /// Material for submesh `index`, reusing the last material when the list is shorter.
    pub fn material_for(&self, index: usize) -> Option<ResourceId> {
        self.materials
            .get(index)
            .or_else(|| self.materials.last())
            .copied()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Entity {
    pub name: String,
    pub transform: Transform,
    pub parent: Option<EntityId>,
    pub camera: Option<Camera>,
    pub mesh_renderer: Option<MeshRenderer>,
    pub light: Option<Light>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_mesh_renderer(mut self, renderer: MeshRenderer) -> Self {
        self.mesh_renderer = Some(renderer);
        self
    }

    pub fn with_light(mut self, light: Light) -> Self {
        self.light = Some(light);
        self
    }
}

/// Scene-wide lighting settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Environment {
    pub ambient_color: Vec3,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            ambient_color: Vec3::splat(0.03),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    entities: Vec<Entity>,
    pub environment: Environment,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, entity: Entity) -> EntityId {
        let id = EntityId(self.entities.len() as u32);
        self.entities.push(entity);
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0 as usize)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id.0 as usize)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (EntityId(index as u32), entity))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// World matrix of `id`, composed through its parent chain.
    ///
    /// A parent cycle or a dangling parent ends the walk; the matrix composed so
    /// far is returned.
    pub fn world_matrix(&self, id: EntityId) -> Mat4 {
        let mut world = Mat4::IDENTITY;
        let mut current = Some(id);
        let mut depth = 0;

        while let Some(entity_id) = current
            && let Some(entity) = self.entity(entity_id)
            && depth <= self.entities.len()
        {
            world = entity.transform.local_matrix() * world;
            current = entity.parent;
            depth += 1;
        }
        world
    }

    /// The enabled camera flagged `main`. When several qualify, the one
    /// spawned last wins.
    pub fn main_camera(&self) -> Option<(EntityId, &Camera)> {
        self.entities()
            .filter_map(|(id, entity)| {
                entity
                    .camera
                    .as_ref()
                    .filter(|camera| camera.enabled && camera.main)
                    .map(|camera| (id, camera))
            })
            .last()
    }
}

#[cfg(test)]
mod tests {
    use glam::Quat;

    use super::*;

    #[test]
    fn test_world_matrix_with_parent_translation() {
        let mut scene = Scene::new();
        let parent = scene.spawn(
            Entity::new("parent")
                .with_transform(Transform::new().with_position(Vec3::new(10.0, 0.0, 0.0))),
        );
        let child = scene.spawn(
            Entity::new("child")
                .with_transform(Transform::new().with_position(Vec3::new(0.0, 5.0, 0.0)))
                .with_parent(parent),
        );

        let p = scene.world_matrix(child).transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(10.0, 5.0, 0.0), 1e-5));
    }

    #[test]
    fn test_world_matrix_nested_rotation_and_scale() {
        let mut scene = Scene::new();
        let root = scene.spawn(Entity::new("root").with_transform(
            Transform::new().with_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
        ));
        let mid = scene.spawn(
            Entity::new("mid")
                .with_transform(Transform::new().with_scale(Vec3::splat(2.0)))
                .with_parent(root),
        );
        let leaf = scene.spawn(
            Entity::new("leaf")
                .with_transform(Transform::new().with_position(Vec3::X))
                .with_parent(mid),
        );

        // X scaled by 2, then rotated a quarter turn about Z.
        let p = scene.world_matrix(leaf).transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));
    }

    #[test]
    fn test_world_matrix_survives_parent_cycle() {
        let mut scene = Scene::new();
        let a = scene.spawn(Entity::new("a"));
        let b = scene.spawn(Entity::new("b").with_parent(a));
        if let Some(entity) = scene.entity_mut(a) {
            entity.parent = Some(b);
        }
        assert_eq!(scene.world_matrix(a), Mat4::IDENTITY);
    }

    #[test]
    fn test_main_camera_skips_disabled() {
        let mut scene = Scene::new();
        let mut disabled = Camera::main_perspective(1.0, 1.0, 0.1, 10.0);
        disabled.enabled = false;
        scene.spawn(Entity::new("off").with_camera(disabled));
        scene.spawn(Entity::new("secondary").with_camera(Camera::default()));
        let main = scene.spawn(
            Entity::new("main").with_camera(Camera::main_perspective(1.0, 1.0, 0.1, 10.0)),
        );

        assert_eq!(scene.main_camera().map(|(id, _)| id), Some(main));
    }

    #[test]
    fn test_last_main_camera_wins() {
        let mut scene = Scene::new();
        scene.spawn(Entity::new("first").with_camera(Camera::main_perspective(1.0, 1.0, 0.1, 10.0)));
        let last = scene.spawn(
            Entity::new("last").with_camera(Camera::main_perspective(1.0, 1.0, 0.1, 10.0)),
        );
        let mut disabled = Camera::main_perspective(1.0, 1.0, 0.1, 10.0);
        disabled.enabled = false;
        scene.spawn(Entity::new("off").with_camera(disabled));

        assert_eq!(scene.main_camera().map(|(id, _)| id), Some(last));
    }

    #[test]
    fn test_material_for_clamps_to_last() {
        let renderer = MeshRenderer::new(
            ResourceId::from_index(0),
            vec![ResourceId::from_index(1), ResourceId::from_index(2)],
        );
        assert_eq!(renderer.material_for(0), Some(ResourceId::from_index(1)));
        assert_eq!(renderer.material_for(5), Some(ResourceId::from_index(2)));
        assert_eq!(MeshRenderer::new(ResourceId::INVALID, vec![]).material_for(0), None);
    }
}
