//! Per-frame batched view of the scene.
//!
//! [`RenderScene::convert`] rebuilds everything from the authoritative
//! [`Scene`] each frame: camera uniforms, per-object uniforms, lights and the
//! draw calls grouped by material into [`SetPass`]es.

use std::collections::HashMap;

use forge_resources::{Material, Mesh, ResourceId, ResourceTable};
use forge_scene::{Camera, LightKind, Scene};
use glam::{Mat4, Vec3};
use tracing::{trace, warn};

use crate::error::{RenderError, RenderResult, SlotKind};
use crate::ubo::{
    CameraUniform, LightingData, MaterialUniform, ObjectUniform, SHADOW_SCENE_RADIUS, SceneLight,
    directional_shadow_matrix,
};

/// One indexed draw of a submesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Drawcall {
    pub vertex_buffer: ResourceId,
    pub index_buffer: ResourceId,
    pub index_count: u32,
    /// Index into the object uniforms of the owning render scene.
    pub uniform_slot: u32,
}

/// Draw calls sharing one material, and therefore one pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct SetPass {
    pub material: ResourceId,
    pub pipeline: ResourceId,
    pub texture: Option<ResourceId>,
    /// Material factors pushed with every draw of this set pass.
    pub surface: MaterialUniform,
    pub drawcalls: Vec<Drawcall>,
}

pub struct RenderScene {
    cameras: Vec<CameraUniform>,
    objects: Vec<ObjectUniform>,
    max_cameras: u32,
    max_uniform_slots: u32,
    max_lights: u32,
    main_camera_slot: Option<u32>,
    lighting: LightingData,
    set_passes: Vec<SetPass>,
    set_pass_by_material: HashMap<ResourceId, usize>,
}

impl RenderScene {
    pub fn new(max_cameras: u32, max_uniform_slots: u32, max_lights: u32) -> Self {
        Self {
            cameras: Vec::with_capacity(max_cameras as usize),
            objects: Vec::with_capacity(max_uniform_slots as usize),
            max_cameras,
            max_uniform_slots,
            max_lights,
            main_camera_slot: None,
            lighting: LightingData::default(),
            set_passes: Vec::new(),
            set_pass_by_material: HashMap::new(),
        }
    }

    /// Drop everything gathered by the previous [`convert`](Self::convert).
    pub fn clear(&mut self) {
        self.cameras.clear();
        self.objects.clear();
        self.main_camera_slot = None;
        self.lighting.clear();
        self.set_passes.clear();
        self.set_pass_by_material.clear();
    }

    /// Rebuild from `scene`, resolving meshes and materials through `resources`.
    ///
    /// # Errors
    ///
    /// [`RenderError::SceneTooLarge`] when the scene needs more camera, object
    /// or light slots than this render scene holds. Invalid mesh and material
    /// handles are skipped, not reported.
    pub fn convert(&mut self, scene: &Scene, resources: &ResourceTable) -> RenderResult<()> {
        self.clear();
        self.collect_lights(scene)?;

        if let Some((id, camera)) = scene.main_camera() {
            let slot = self.set_camera_data(camera, scene.world_matrix(id))?;
            self.main_camera_slot = Some(slot);
        }

        self.setup_drawcalls(scene, resources)?;

        trace!(
            "Render scene: {} set passes, {} draw calls, {} objects, {} lights",
            self.set_passes.len(),
            self.drawcall_count(),
            self.objects.len(),
            self.lighting.len()
        );
        Ok(())
    }

    fn collect_lights(&mut self, scene: &Scene) -> RenderResult<()> {
        self.lighting.ambient_color = scene.environment.ambient_color;

        for (id, entity) in scene.entities() {
            let Some(light) = entity.light.as_ref().filter(|light| light.enabled) else {
                continue;
            };
            if self.lighting.len() >= self.max_lights as usize {
                return Err(RenderError::SceneTooLarge {
                    kind: SlotKind::Lights,
                    capacity: self.max_lights,
                });
            }
            let packed = SceneLight::from_light(light, scene.world_matrix(id));
            if light.kind == LightKind::Directional {
                // Later directional lights replace the shadow camera.
                self.lighting.light_view_projection = Some(directional_shadow_matrix(
                    packed.direction.truncate(),
                    Vec3::ZERO,
                    SHADOW_SCENE_RADIUS,
                ));
            }
            self.lighting.lights.push(packed);
        }
        Ok(())
    }

    /// Write `camera` as seen from `camera_world` into the next camera slot.
    ///
    /// Slots are handed out in order and start over at 0 on every `convert`.
    pub fn set_camera_data(&mut self, camera: &Camera, camera_world: Mat4) -> RenderResult<u32> {
        let slot = self.cameras.len() as u32;
        if slot >= self.max_cameras {
            return Err(RenderError::SceneTooLarge {
                kind: SlotKind::Cameras,
                capacity: self.max_cameras,
            });
        }

        self.cameras.push(CameraUniform::new(
            Camera::view_matrix(camera_world),
            camera.projection_matrix(),
            camera_world.transform_point3(Vec3::ZERO),
        ));
        Ok(slot)
    }

    fn setup_drawcalls(&mut self, scene: &Scene, resources: &ResourceTable) -> RenderResult<()> {
        for (id, entity) in scene.entities() {
            let Some(renderer) = entity.mesh_renderer.as_ref() else {
                continue;
            };
            if !renderer.enabled || renderer.materials.is_empty() {
                continue;
            }
            let Some(mesh) = resources.get::<Mesh>(renderer.mesh) else {
                warn!(
                    "Entity '{}' references invalid mesh {}, skipping",
                    entity.name, renderer.mesh
                );
                continue;
            };

            let uniform_slot = self.allocate_object(ObjectUniform::new(scene.world_matrix(id)))?;

            for (index, submesh) in mesh.submeshes.iter().enumerate() {
                let Some(material_id) = renderer.material_for(index) else {
                    continue;
                };
                let Some(set_pass) = self.set_pass_for(material_id, resources) else {
                    warn!(
                        "Entity '{}' references invalid material {}, skipping submesh {}",
                        entity.name, material_id, index
                    );
                    continue;
                };

                set_pass.drawcalls.push(Drawcall {
                    vertex_buffer: submesh.vertex_buffer,
                    index_buffer: submesh.index_buffer,
                    index_count: submesh.index_count,
                    uniform_slot,
                });
            }
        }
        Ok(())
    }

    fn allocate_object(&mut self, object: ObjectUniform) -> RenderResult<u32> {
        let slot = self.objects.len() as u32;
        if slot >= self.max_uniform_slots {
            return Err(RenderError::SceneTooLarge {
                kind: SlotKind::Objects,
                capacity: self.max_uniform_slots,
            });
        }
        self.objects.push(object);
        Ok(slot)
    }

    fn set_pass_for(&mut self, material_id: ResourceId, resources: &ResourceTable) -> Option<&mut SetPass> {
        if let Some(&index) = self.set_pass_by_material.get(&material_id) {
            return self.set_passes.get_mut(index);
        }

        let material = resources.get::<Material>(material_id)?;
        let index = self.set_passes.len();
        self.set_passes.push(SetPass {
            material: material_id,
            pipeline: material.pipeline,
            texture: material.texture,
            surface: MaterialUniform::from(material),
            drawcalls: Vec::new(),
        });
        self.set_pass_by_material.insert(material_id, index);
        self.set_passes.get_mut(index)
    }

    pub fn set_passes(&self) -> &[SetPass] {
        &self.set_passes
    }

    pub fn camera(&self, slot: u32) -> Option<&CameraUniform> {
        self.cameras.get(slot as usize)
    }

    /// Camera uniforms in slot order.
    pub fn cameras(&self) -> &[CameraUniform] {
        &self.cameras
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    pub fn object(&self, slot: u32) -> Option<&ObjectUniform> {
        self.objects.get(slot as usize)
    }

    /// Slot written for the scene's main camera, `None` if it has none.
    pub fn main_camera_slot(&self) -> Option<u32> {
        self.main_camera_slot
    }

    pub fn lighting(&self) -> &LightingData {
        &self.lighting
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn drawcall_count(&self) -> usize {
        self.set_passes.iter().map(|pass| pass.drawcalls.len()).sum()
    }
}
