//! Interleaved vertex layout shared by every mesh pipeline.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Position, normal and texture coordinate, 32 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }

    /// Interleave separate attribute streams. Missing normals or texture
    /// coordinates are filled with zeros.
    pub fn interleave(positions: &[Vec3], normals: &[Vec3], tex_coords: &[[f32; 2]]) -> Vec<Self> {
        positions
            .iter()
            .enumerate()
            .map(|(i, &position)| Self {
                position,
                normal: normals.get(i).copied().unwrap_or(Vec3::ZERO),
                tex_coord: tex_coords.get(i).copied().map_or(Vec2::ZERO, Vec2::from),
            })
            .collect()
    }
}
