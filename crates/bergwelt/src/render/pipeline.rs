use bytemuck::{Pod, Zeroable};
use cgmath::{Matrix4, Vector4};

use crate::dynamics::Camera;

/// Per-frame camera data as the shader sees it. The view translation is
/// removed on the CPU; instances arrive camera-relative in x/y, so only
/// the eye height and the height scale travel separately.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// x: eye z, y: height decode scale, z/w unused
    pub params: [f32; 4],
}

impl FrameUniforms {
    pub fn from_camera(camera: &Camera, height_scale: f32) -> Self {
        // zero the translation; instance positions are pre-translated by
        // -eye on the CPU to keep f32 precision at mercator magnitudes
        let mut view = camera.view();
        view.w = Vector4::new(0.0, 0.0, 0.0, view.w.w);
        let m: Matrix4<f64> = camera.projection() * view;
        let cast = |v: Vector4<f64>| [v.x as f32, v.y as f32, v.z as f32, v.w as f32];
        FrameUniforms {
            view_proj: [cast(m.x), cast(m.y), cast(m.z), cast(m.w)],
            params: [camera.position().z as f32, height_scale, 0.0, 0.0],
        }
    }
}

pub struct TerrainPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub frame_bind_group: wgpu::BindGroup,
    pub frame_buffer: wgpu::Buffer,
}

impl TerrainPipeline {
    pub fn write_frame(&self, queue: &wgpu::Queue, uniforms: &FrameUniforms) {
        queue.write_buffer(
            &self.frame_buffer,
            0,
            bytemuck::cast_slice(std::slice::from_ref(uniforms)),
        );
    }
}

/// The four per-instance vertex buffers: bounds, tileset id, zoom level,
/// texture layer. There is no per-vertex buffer; the grid position comes
/// from the vertex index.
fn instance_layouts() -> [wgpu::VertexBufferLayout<'static>; 4] {
    const BOUNDS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x4];
    const TILESET: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Sint32];
    const ZOOM: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Sint32];
    const LAYER: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![3 => Sint32];
    [
        wgpu::VertexBufferLayout {
            array_stride: 16,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &BOUNDS,
        },
        wgpu::VertexBufferLayout {
            array_stride: 4,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &TILESET,
        },
        wgpu::VertexBufferLayout {
            array_stride: 4,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &ZOOM,
        },
        wgpu::VertexBufferLayout {
            array_stride: 4,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &LAYER,
        },
    ]
}

pub fn build_terrain_pipeline(
    device: &wgpu::Device,
    surface_format: wgpu::TextureFormat,
    tile_bind_group_layout: &wgpu::BindGroupLayout,
) -> TerrainPipeline {
    let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("frame_ubo"),
        size: std::mem::size_of::<FrameUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let frame_bind_group_layout =
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZeroU64::new(
                        std::mem::size_of::<FrameUniforms>() as u64,
                    ),
                },
                count: None,
            }],
        });

    let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Frame Bind Group"),
        layout: &frame_bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: frame_buffer.as_entire_binding(),
        }],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Terrain Pipeline Layout"),
        bind_group_layouts: &[&frame_bind_group_layout, tile_bind_group_layout],
        push_constant_ranges: &[],
    });

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Terrain Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/terrain.wgsl").into()),
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Terrain Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &instance_layouts(),
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        cache: None,
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: Some(wgpu::IndexFormat::Uint16),
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: wgpu::TextureFormat::Depth24Plus,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    });

    TerrainPipeline {
        pipeline,
        frame_bind_group,
        frame_buffer,
    }
}
