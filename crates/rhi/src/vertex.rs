//! Mesh vertex format and its input description.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Vertex with homogeneous position and normal.
///
/// # Memory Layout
///
/// - Offset 0: position (16 bytes, `w = 1`)
/// - Offset 16: normal (16 bytes, `w = 0`)
/// - Total size: 32 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec4,
    pub normal: Vec4,
}

impl Vertex {
    /// Builds a vertex from a point and a direction; the normal is normalized.
    #[inline]
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position: position.extend(1.0),
            normal: normal.normalize_or_zero().extend(0.0),
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, normal) as u32,
            },
        ]
    }
}
