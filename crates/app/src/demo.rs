//! Assets and scene for the demo window: a spinning cube over a floor, lit by
//! a point light and a shadow-casting sun.

use std::path::Path;

use forge_renderer::vulkan::to_vk_extent;
use forge_renderer::{GpuBackend, RenderResult, ShadowPass, VulkanBackend};
use forge_resources::{Material, Mesh, MeshData, ResourceId, ResourceTable, SubMesh};
use forge_rhi::pipeline::CullMode;
use forge_rhi::render_target::DEFAULT_DEPTH_FORMAT;
use forge_rhi::{
    Buffer, BufferUsage, GraphicsPipelineDesc, Pipeline, RenderTarget, Shader, ShaderStage, Vertex,
};
use forge_scene::{Camera, Entity, EntityId, Light, MeshRenderer, Scene, Transform};
use glam::{Quat, Vec3, Vec4};
use tracing::{info, warn};

const VERTEX_SHADER: &str = "shaders/mesh.vert.spv";
const FRAGMENT_SHADER: &str = "shaders/mesh.frag.spv";
const SHADOW_VERTEX_SHADER: &str = "shaders/shadow.vert.spv";
const SHADOW_FRAGMENT_SHADER: &str = "shaders/shadow.frag.spv";

/// Radians per second.
const SPIN_SPEED: f32 = 0.8;

pub struct DemoScene {
    pub scene: Scene,
    pub camera: EntityId,
    pub cube: Option<EntityId>,
}

impl DemoScene {
    pub fn new(backend: &VulkanBackend, resources: &mut ResourceTable, aspect: f32) -> Self {
        let mut scene = Scene::new();
        scene.environment.ambient_color = Vec3::splat(0.05);

        let camera = scene.spawn(
            Entity::new("main camera")
                .with_transform(
                    Transform::new()
                        .with_position(Vec3::new(2.5, 2.0, 4.0))
                        .looking_at(Vec3::ZERO),
                )
                .with_camera(Camera::main_perspective(
                    60.0_f32.to_radians(),
                    aspect,
                    0.1,
                    100.0,
                )),
        );
        scene.spawn(
            Entity::new("key light")
                .with_transform(Transform::new().with_position(Vec3::new(3.0, 4.0, 2.0)))
                .with_light(Light::point(Vec3::ONE, 4.0, 20.0)),
        );
        scene.spawn(
            Entity::new("sun")
                .with_transform(Transform::new().looking_at(Vec3::new(-0.4, -1.0, -0.3)))
                .with_light(Light::directional(Vec3::new(1.0, 0.95, 0.85), 0.8)),
        );

        // Without compiled shaders the frame still clears and presents.
        let cube = match upload_meshes(backend, resources) {
            Ok((cube, floor)) => {
                scene.spawn(
                    Entity::new("floor")
                        .with_transform(
                            Transform::new()
                                .with_position(Vec3::new(0.0, -0.8, 0.0))
                                .with_scale(Vec3::new(8.0, 0.1, 8.0)),
                        )
                        .with_mesh_renderer(floor),
                );
                Some(scene.spawn(Entity::new("cube").with_mesh_renderer(cube)))
            }
            Err(e) => {
                warn!("Meshes disabled: {}", e);
                None
            }
        };

        Self {
            scene,
            camera,
            cube,
        }
    }

    pub fn update(&mut self, delta_secs: f32) {
        if let Some(cube) = self.cube.and_then(|id| self.scene.entity_mut(id)) {
            cube.transform
                .rotate(Quat::from_rotation_y(SPIN_SPEED * delta_secs));
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Some(camera) = self
            .scene
            .entity_mut(self.camera)
            .and_then(|entity| entity.camera.as_mut())
        {
            camera.set_aspect(aspect);
        }
    }
}

/// Upload the cube mesh once and return renderers for the cube and the floor,
/// which share it with different materials.
fn upload_meshes(
    backend: &VulkanBackend,
    resources: &mut ResourceTable,
) -> RenderResult<(MeshRenderer, MeshRenderer)> {
    let device = backend.device();

    let vertex_shader = Shader::from_spirv_file(device.clone(), Path::new(VERTEX_SHADER), ShaderStage::Vertex)?;
    let fragment_shader =
        Shader::from_spirv_file(device.clone(), Path::new(FRAGMENT_SHADER), ShaderStage::Fragment)?;
    let desc = GraphicsPipelineDesc::new(backend.color_format())
        .with_depth(DEFAULT_DEPTH_FORMAT)
        .with_cull_mode(CullMode::Back);
    let pipeline = resources.allocate(Pipeline::new(
        device.clone(),
        &vertex_shader,
        &fragment_shader,
        &[backend.scene_set_layout()],
        desc,
    )?);

    let data = MeshData::cube();
    let vertices = Vertex::interleave(&data.positions, &data.normals, &data.tex_coords);
    let vertex_buffer = resources.allocate(Buffer::from_slice(
        device.clone(),
        BufferUsage::Vertex,
        &vertices,
    )?);
    let index_buffer = resources.allocate(Buffer::from_slice(
        device.clone(),
        BufferUsage::Index,
        &data.indices,
    )?);

    let mesh = resources.allocate(Mesh::new(vec![SubMesh {
        vertex_buffer,
        index_buffer,
        index_count: data.indices.len() as u32,
    }]));
    let mut cube_material = Material::new(pipeline).with_base_color(Vec4::new(0.8, 0.3, 0.2, 1.0));
    cube_material.metallic = 0.2;
    cube_material.roughness = 0.3;
    let cube_material = resources.allocate(cube_material);
    let mut floor_material = Material::new(pipeline).with_base_color(Vec4::new(0.55, 0.55, 0.6, 1.0));
    floor_material.roughness = 0.9;
    let floor_material = resources.allocate(floor_material);

    info!(
        "Uploaded cube: {} vertices, {} triangles",
        data.vertex_count(),
        data.triangle_count()
    );
    Ok((
        MeshRenderer::new(mesh, vec![cube_material]),
        MeshRenderer::new(mesh, vec![floor_material]),
    ))
}

/// Shadow map of `size` texels and the depth-only pass that renders the sun's
/// view into it.
pub fn shadow_pass(backend: &VulkanBackend, resources: &mut ResourceTable, size: u32) -> RenderResult<ShadowPass> {
    let device = backend.device();

    let vertex_shader = Shader::from_spirv_file(
        device.clone(),
        Path::new(SHADOW_VERTEX_SHADER),
        ShaderStage::Vertex,
    )?;
    let fragment_shader = Shader::from_spirv_file(
        device.clone(),
        Path::new(SHADOW_FRAGMENT_SHADER),
        ShaderStage::Fragment,
    )?;
    let desc = GraphicsPipelineDesc::depth_only(DEFAULT_DEPTH_FORMAT).with_cull_mode(CullMode::Front);
    let pipeline = resources.allocate(Pipeline::new(
        device.clone(),
        &vertex_shader,
        &fragment_shader,
        &[backend.scene_set_layout()],
        desc,
    )?);
    let shadowmap = resources.allocate(RenderTarget::shadow_map(device.clone(), size)?);

    info!("Shadow map: {}x{}", size, size);
    Ok(ShadowPass::new(shadowmap, pipeline))
}

/// Depth target matching the current swapchain size.
pub fn depth_target(backend: &VulkanBackend) -> RenderResult<RenderTarget> {
    Ok(RenderTarget::depth(
        backend.device().clone(),
        to_vk_extent(backend.extent()),
    )?)
}

/// Swap the depth target behind `id` for one of the current swapchain size.
///
/// The old target is dropped at once, so the device must be idle, e.g. right
/// after a swapchain rebuild.
pub fn resize_depth_target(backend: &VulkanBackend, resources: &mut ResourceTable, id: ResourceId) -> RenderResult<()> {
    let target = depth_target(backend)?;
    if let Some(slot) = resources.get_mut::<RenderTarget>(id) {
        *slot = target;
    }
    Ok(())
}
