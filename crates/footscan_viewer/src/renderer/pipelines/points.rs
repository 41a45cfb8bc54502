use crate::data::{FrameUniforms, VertexRecord};
use wgpu::util::DeviceExt;

/// Sprite corners in units of half a point, two triangles.
const QUAD_CORNERS: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [1.0, 1.0],
    [-1.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
];

const CORNER_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
/// `VertexRecord::position` then `VertexRecord::color`, one record per instance.
const RECORD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![1 => Float32x3, 2 => Float32x3];

fn vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
    [
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 2]>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &CORNER_ATTRIBUTES,
        },
        wgpu::VertexBufferLayout {
            array_stride: VertexRecord::SIZE as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &RECORD_ATTRIBUTES,
        },
    ]
}

/// Draws the scan as unconnected, screen-sized point sprites.
pub struct PointPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub frame_layout: wgpu::BindGroupLayout,
    quad_vb: wgpu::Buffer,
}

impl PointPipeline {
    pub fn new(
        device: &wgpu::Device,
        color_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
    ) -> Self {
        // Uniform buffer layout for frame data
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame UBO Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<FrameUniforms>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shaders/scan_points.wgsl"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../../shaders/scan_points.wgsl").into(),
            ),
        });

        let quad_vb = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Point Sprite Quad VB"),
            contents: bytemuck::cast_slice(&QUAD_CORNERS),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let vbuf_layouts = vertex_layouts();

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scan Points PipelineLayout"),
            bind_group_layouts: &[&frame_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scan Points Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &vbuf_layouts,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_fmt,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_fmt,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Self {
            pipeline,
            frame_layout,
            quad_vb,
        }
    }

    pub fn create_frame_bind_group(
        &self,
        device: &wgpu::Device,
        ubo: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame BindGroup"),
            layout: &self.frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: ubo.as_entire_binding(),
            }],
        })
    }

    /// One instanced draw covering every point.
    pub fn draw<'a>(
        &'a self,
        rpass: &mut wgpu::RenderPass<'a>,
        frame: &'a wgpu::BindGroup,
        points: &'a wgpu::Buffer,
        count: u32,
    ) {
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, frame, &[]);
        rpass.set_vertex_buffer(0, self.quad_vb.slice(..));
        rpass.set_vertex_buffer(1, points.slice(..));
        rpass.draw(0..6, 0..count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn instance_layout_matches_vertex_record() {
        let [corners, records] = vertex_layouts();
        assert_eq!(corners.step_mode, wgpu::VertexStepMode::Vertex);
        assert_eq!(records.step_mode, wgpu::VertexStepMode::Instance);
        assert_eq!(records.array_stride, 24);

        let position = records.attributes[0];
        let color = records.attributes[1];
        assert_eq!(position.offset, offset_of!(VertexRecord, position) as u64);
        assert_eq!(color.offset, offset_of!(VertexRecord, color) as u64);
        assert_eq!(position.format.size() + color.format.size(), records.array_stride);
        assert_eq!((position.shader_location, color.shader_location), (1, 2));
    }

    #[test]
    fn quad_covers_the_unit_square() {
        for axis in 0..2 {
            assert!(QUAD_CORNERS.iter().any(|c| c[axis] == -1.0));
            assert!(QUAD_CORNERS.iter().any(|c| c[axis] == 1.0));
        }
    }
}
