//! Scripted [`GpuBackend`] that records every call into a shared log.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use forge_core::RendererConfig;
use forge_renderer::{
    AcquireOutcome, CommandRecorder, Extent2D, FrameTarget, GpuBackend, ImageLayout, ImageTarget,
    MaterialUniform, ObjectUniform, PresentOutcome, RecordFn, RenderError, RenderResult,
    RenderScene, RenderingDesc, Submission,
};
use forge_resources::{Material, Mesh, Resource, ResourceId, ResourceTable, SubMesh};
use forge_scene::{Camera, Entity, Light, MeshRenderer, Scene, Transform};
use glam::{Vec3, Vec4};

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    CreateFence { id: u32, signaled: bool },
    CreateSemaphore(u32),
    CreatePool(u32),
    AllocateBuffer { pool: u32, buffer: u32 },
    WaitFence(u32),
    ResetFence(u32),
    Acquire { semaphore: u32 },
    UploadScene {
        frame: usize,
        cameras: usize,
        lights: usize,
    },
    Begin(u32),
    End(u32),
    Submit {
        buffer: u32,
        wait: Option<u32>,
        signal: Option<u32>,
        fence: Option<u32>,
    },
    Present { image: u32, wait: u32 },
    WaitIdle,
    Recreate,
    DestroyPool(u32),
    DestroyBuffer(u32),
    Destroyed(&'static str),
    Transition(ImageTarget, ImageLayout),
    BeginRendering(RenderingDesc),
    EndRendering,
    Viewport(Extent2D),
    BindPipeline(ResourceId),
    BindScene {
        camera_slot: u32,
        shadowmap: Option<ResourceId>,
    },
    PushUniforms { base_color: Vec4 },
    DrawIndexed(u32),
}

pub type Log = Rc<RefCell<Vec<Event>>>;

pub struct MockFence {
    pub id: u32,
}

pub struct MockSemaphore {
    pub id: u32,
}

pub struct MockCommandPool {
    pub id: u32,
    log: Log,
}

impl Resource for MockCommandPool {}

impl Drop for MockCommandPool {
    fn drop(&mut self) {
        self.log.borrow_mut().push(Event::DestroyPool(self.id));
    }
}

pub struct MockCommandBuffer {
    pub id: u32,
    log: Log,
}

impl Resource for MockCommandBuffer {}

impl Drop for MockCommandBuffer {
    fn drop(&mut self) {
        self.log.borrow_mut().push(Event::DestroyBuffer(self.id));
    }
}

/// Logs its own destruction.
pub struct Tracked {
    pub name: &'static str,
    pub log: Log,
}

impl Resource for Tracked {
    fn destroy(&mut self) {
        self.log.borrow_mut().push(Event::Destroyed(self.name));
    }
}

/// Stand-in for pipelines and buffers; the mock recorder only checks liveness.
pub struct Blob;

impl Resource for Blob {}

pub struct MockBackend {
    pub log: Log,
    next_id: u32,
    image_count: u32,
    /// Image count reported after the next swapchain rebuild.
    pub rebuilt_image_count: Option<u32>,
    extent: Extent2D,
    next_image: u32,
    pub acquire_script: VecDeque<AcquireOutcome>,
    pub present_script: VecDeque<PresentOutcome>,
    pub fail_fence_wait: bool,
}

impl MockBackend {
    pub fn new(image_count: u32) -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
            next_id: 0,
            image_count,
            rebuilt_image_count: None,
            extent: Extent2D::new(800, 600),
            next_image: 0,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            fail_fence_wait: false,
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn push(&self, event: Event) {
        self.log.borrow_mut().push(event);
    }
}

impl GpuBackend for MockBackend {
    type Fence = MockFence;
    type Semaphore = MockSemaphore;
    type CommandPool = MockCommandPool;
    type CommandBuffer = MockCommandBuffer;

    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn extent(&self) -> Extent2D {
        self.extent
    }

    fn create_fence(&mut self, signaled: bool) -> RenderResult<MockFence> {
        let id = self.next_id();
        self.push(Event::CreateFence { id, signaled });
        Ok(MockFence { id })
    }

    fn create_semaphore(&mut self) -> RenderResult<MockSemaphore> {
        let id = self.next_id();
        self.push(Event::CreateSemaphore(id));
        Ok(MockSemaphore { id })
    }

    fn create_command_pool(&mut self) -> RenderResult<MockCommandPool> {
        let id = self.next_id();
        self.push(Event::CreatePool(id));
        Ok(MockCommandPool {
            id,
            log: self.log.clone(),
        })
    }

    fn allocate_command_buffer(&mut self, pool: &MockCommandPool) -> RenderResult<MockCommandBuffer> {
        let id = self.next_id();
        self.push(Event::AllocateBuffer {
            pool: pool.id,
            buffer: id,
        });
        Ok(MockCommandBuffer {
            id,
            log: self.log.clone(),
        })
    }

    fn wait_for_fence(&mut self, fence: &MockFence, _timeout_ns: u64) -> RenderResult<()> {
        self.push(Event::WaitFence(fence.id));
        if self.fail_fence_wait {
            return Err(RenderError::Backend("fence wait timed out".to_string()));
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: &MockFence) -> RenderResult<()> {
        self.push(Event::ResetFence(fence.id));
        Ok(())
    }

    fn acquire_next_image(&mut self, signal: &MockSemaphore) -> RenderResult<AcquireOutcome> {
        self.push(Event::Acquire {
            semaphore: signal.id,
        });
        if let Some(outcome) = self.acquire_script.pop_front() {
            return Ok(outcome);
        }
        let image = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(AcquireOutcome::Acquired(image))
    }

    fn upload_scene(&mut self, frame_index: usize, scene: &RenderScene) -> RenderResult<()> {
        self.push(Event::UploadScene {
            frame: frame_index,
            cameras: scene.camera_count(),
            lights: scene.lighting().lights.len(),
        });
        Ok(())
    }

    fn begin_commands(&mut self, command_buffer: &MockCommandBuffer) -> RenderResult<()> {
        self.push(Event::Begin(command_buffer.id));
        Ok(())
    }

    fn end_commands(&mut self, command_buffer: &MockCommandBuffer) -> RenderResult<()> {
        self.push(Event::End(command_buffer.id));
        Ok(())
    }

    fn record(
        &mut self,
        _command_buffer: &MockCommandBuffer,
        resources: &ResourceTable,
        _target: FrameTarget,
        record: &mut RecordFn<'_>,
    ) -> RenderResult<()> {
        let mut recorder = MockRecorder {
            log: self.log.clone(),
            resources,
            extent: self.extent,
        };
        record(&mut recorder)
    }

    fn submit(&mut self, submission: Submission<'_, Self>) -> RenderResult<()> {
        self.push(Event::Submit {
            buffer: submission.command_buffer.id,
            wait: submission.wait_semaphore.map(|s| s.id),
            signal: submission.signal_semaphore.map(|s| s.id),
            fence: submission.fence.map(|f| f.id),
        });
        Ok(())
    }

    fn present(&mut self, image_index: u32, wait: &MockSemaphore) -> RenderResult<PresentOutcome> {
        self.push(Event::Present {
            image: image_index,
            wait: wait.id,
        });
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        self.push(Event::WaitIdle);
        Ok(())
    }

    fn recreate_swapchain(&mut self) -> RenderResult<()> {
        self.push(Event::Recreate);
        if let Some(count) = self.rebuilt_image_count.take() {
            self.image_count = count;
        }
        self.next_image = 0;
        Ok(())
    }
}

pub struct MockRecorder<'a> {
    log: Log,
    resources: &'a ResourceTable,
    extent: Extent2D,
}

impl<'a> MockRecorder<'a> {
    pub fn new(log: Log, resources: &'a ResourceTable, extent: Extent2D) -> Self {
        Self {
            log,
            resources,
            extent,
        }
    }

    fn push(&self, event: Event) {
        self.log.borrow_mut().push(event);
    }
}

impl CommandRecorder for MockRecorder<'_> {
    fn target_extent(&self, target: ImageTarget) -> Option<Extent2D> {
        match target {
            ImageTarget::Backbuffer => Some(self.extent),
            ImageTarget::Resource(id) => self.resources.is_alive(id).then_some(self.extent),
        }
    }

    fn transition(&mut self, target: ImageTarget, layout: ImageLayout) -> bool {
        self.push(Event::Transition(target, layout));
        true
    }

    fn begin_rendering(&mut self, desc: &RenderingDesc) -> bool {
        self.push(Event::BeginRendering(*desc));
        true
    }

    fn end_rendering(&mut self) {
        self.push(Event::EndRendering);
    }

    fn set_viewport_and_scissor(&mut self, extent: Extent2D) {
        self.push(Event::Viewport(extent));
    }

    fn bind_pipeline(&mut self, pipeline: ResourceId) -> bool {
        let live = self.resources.is_alive(pipeline);
        if live {
            self.push(Event::BindPipeline(pipeline));
        }
        live
    }

    fn bind_vertex_buffer(&mut self, buffer: ResourceId) -> bool {
        self.resources.is_alive(buffer)
    }

    fn bind_index_buffer(&mut self, buffer: ResourceId) -> bool {
        self.resources.is_alive(buffer)
    }

    fn bind_scene_uniforms(&mut self, camera_slot: u32, shadowmap: Option<ResourceId>) -> bool {
        let live = shadowmap.is_none_or(|id| self.resources.is_alive(id));
        if live {
            self.push(Event::BindScene {
                camera_slot,
                shadowmap,
            });
        }
        live
    }

    fn push_uniforms(&mut self, _object: &ObjectUniform, material: &MaterialUniform) {
        self.push(Event::PushUniforms {
            base_color: material.base_color,
        });
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.push(Event::DrawIndexed(index_count));
    }
}

/// Ids of every `CreateFence` event with the given `signaled` flag, in order.
pub fn created_fences(log: &Log, signaled: bool) -> Vec<u32> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            Event::CreateFence { id, signaled: s } if *s == signaled => Some(*id),
            _ => None,
        })
        .collect()
}

pub fn created_semaphores(log: &Log) -> Vec<u32> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            Event::CreateSemaphore(id) => Some(*id),
            _ => None,
        })
        .collect()
}

pub fn submits(log: &Log) -> Vec<Event> {
    log.borrow()
        .iter()
        .filter(|event| matches!(event, Event::Submit { .. }))
        .cloned()
        .collect()
}

pub fn push_count(log: &Log) -> usize {
    log.borrow()
        .iter()
        .filter(|event| matches!(event, Event::PushUniforms { .. }))
        .count()
}

/// Walks the log and panics if a fence is waited on after a reset (or an
/// unsignaled creation) with no submit signaling it in between. Such a wait
/// never returns on a real device.
pub fn assert_no_wait_on_unsubmitted_fence(log: &Log) {
    let mut unsubmitted = std::collections::HashSet::new();
    for (index, event) in log.borrow().iter().enumerate() {
        match event {
            Event::CreateFence { id, signaled: false } | Event::ResetFence(id) => {
                unsubmitted.insert(*id);
            }
            Event::Submit { fence: Some(id), .. } => {
                unsubmitted.remove(id);
            }
            Event::WaitFence(id) => assert!(
                !unsubmitted.contains(id),
                "event {index}: fence {id} waited on without a pending submit"
            ),
            _ => {}
        }
    }
}

pub fn config(inter_pass_fencing: bool) -> RendererConfig {
    RendererConfig {
        inter_pass_fencing,
        ..RendererConfig::default()
    }
}

/// A drawable mesh with one submesh, its material and pipeline.
pub struct TestMesh {
    pub mesh: ResourceId,
    pub material: ResourceId,
    pub pipeline: ResourceId,
}

pub fn add_test_mesh(resources: &mut ResourceTable, index_count: u32) -> TestMesh {
    let pipeline = resources.allocate(Blob);
    let vertex_buffer = resources.allocate(Blob);
    let index_buffer = resources.allocate(Blob);
    let mesh = resources.allocate(Mesh::new(vec![SubMesh {
        vertex_buffer,
        index_buffer,
        index_count,
    }]));
    let material = resources.allocate(Material::new(pipeline));
    TestMesh {
        mesh,
        material,
        pipeline,
    }
}

/// Main camera at +Z, one cube-like renderable at the origin and a point light.
pub fn test_scene(mesh: &TestMesh) -> Scene {
    let mut scene = Scene::new();
    scene.spawn(
        Entity::new("camera")
            .with_transform(Transform::new().with_position(Vec3::new(0.0, 0.0, 5.0)))
            .with_camera(Camera::main_perspective(60.0_f32.to_radians(), 4.0 / 3.0, 0.1, 100.0)),
    );
    scene.spawn(
        Entity::new("cube").with_mesh_renderer(MeshRenderer::new(mesh.mesh, vec![mesh.material])),
    );
    scene.spawn(
        Entity::new("light")
            .with_transform(Transform::new().with_position(Vec3::new(2.0, 3.0, 2.0)))
            .with_light(Light::point(Vec3::ONE, 1.0, 10.0)),
    );
    scene
}
