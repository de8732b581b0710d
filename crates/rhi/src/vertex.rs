//! Vertex input descriptions.
//!
//! Vertex types live with the data that fills them; these helpers describe
//! them to the pipeline. Everything is interleaved in binding 0.

use ash::vk;

/// Binding 0 with one interleaved vertex of `stride` bytes per vertex.
#[inline]
pub fn interleaved_binding(stride: usize) -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: stride as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

/// Attribute at `location` read from byte `offset` of binding 0.
#[inline]
pub fn attribute(
    location: u32,
    format: vk::Format,
    offset: usize,
) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        binding: 0,
        location,
        format,
        offset: offset as u32,
    }
}

/// Format of an `f32` vector attribute with `components` lanes.
pub fn float_format(components: u32) -> vk::Format {
    match components {
        1 => vk::Format::R32_SFLOAT,
        2 => vk::Format::R32G32_SFLOAT,
        3 => vk::Format::R32G32B32_SFLOAT,
        _ => vk::Format::R32G32B32A32_SFLOAT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[allow(dead_code)]
    #[derive(Clone, Copy)]
    struct PositionUv {
        position: [f32; 3],
        uv: [f32; 2],
    }

    fn position_uv_attributes() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, float_format(3), std::mem::offset_of!(PositionUv, position)),
            attribute(1, float_format(2), std::mem::offset_of!(PositionUv, uv)),
        ]
    }

    #[test]
    fn test_binding_stride_matches_size() {
        let binding = interleaved_binding(std::mem::size_of::<PositionUv>());
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 20);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_attribute_offsets() {
        let attrs = position_uv_attributes();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 12);
        assert_eq!(attrs[1].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_float_format() {
        assert_eq!(float_format(1), vk::Format::R32_SFLOAT);
        assert_eq!(float_format(4), vk::Format::R32G32B32A32_SFLOAT);
    }
}
