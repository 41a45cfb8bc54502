//! GPU-facing data layouts for the viewer.

use glam::Mat4;

/// Per-frame uniform block, respecting std140 layout.
/// Must match the layout of `FrameUniforms` in `scan_points.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    /// projection × view × model for the current camera.
    pub model_view_projection: [[f32; 4]; 4],
    /// Size of the viewport in physical pixels.
    pub viewport_size: [f32; 2],
    /// Diameter of a point sprite in pixels.
    pub point_size_px: f32,
    pub _pad: f32,
}

impl FrameUniforms {
    pub fn new(mvp: Mat4, viewport_size: [f32; 2], point_size_px: f32) -> Self {
        Self {
            model_view_projection: mvp.to_cols_array_2d(),
            viewport_size,
            point_size_px,
            _pad: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_std140_sized() {
        // mat4x4 (64) + vec2 (8) + f32 + f32 padding to a 16-byte multiple.
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 80);
        assert_eq!(std::mem::size_of::<FrameUniforms>() % 16, 0);
    }
}
