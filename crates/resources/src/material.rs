//! Material records.

use glam::Vec4;

use crate::handle::ResourceId;
use crate::resource::Resource;

/// A material instance: the pipeline it draws with, an optional texture and
/// its PBR factors.
///
/// Draw calls are grouped by material id, so two materials sharing a pipeline
/// still produce two set passes.
#[derive(Debug, Clone)]
pub struct Material {
    /// Graphics pipeline resource.
    pub pipeline: ResourceId,
    /// Texture resource sampled by the pipeline, if any.
    pub texture: Option<ResourceId>,
    /// Base color (albedo)
    pub base_color: Vec4,
    /// Metallic factor (0.0 = dielectric, 1.0 = metal)
    pub metallic: f32,
    /// Roughness factor (0.0 = smooth, 1.0 = rough)
    pub roughness: f32,
    id: ResourceId,
}

impl Material {
    pub fn new(pipeline: ResourceId) -> Self {
        Self {
            pipeline,
            texture: None,
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            id: ResourceId::INVALID,
        }
    }

    pub fn with_texture(mut self, texture: ResourceId) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_base_color(mut self, base_color: Vec4) -> Self {
        self.base_color = base_color;
        self
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }
}

impl Resource for Material {
    fn on_allocated(&mut self, id: ResourceId) {
        self.id = id;
    }
}
