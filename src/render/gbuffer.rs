//! Deferred-rendering targets and the `block` / `block_deferred` pipelines.
//!
//! The geometry pass rasterizes every renderable chunk's mesh into the
//! G-buffer (position/normal/diffuse/depth); composition first lays down the
//! procedural background, then runs one lighting pass per chunk that shades
//! only the pixels whose G-buffer position falls inside that chunk.

use fastnoise_lite::{FastNoiseLite, NoiseType};
use wgpu::util::DeviceExt;

use crate::constants::BACKGROUND_SIZE;
use crate::core::uniforms::FrameUniforms;
use crate::render::context::GpuContext;
use crate::render::kernels::KernelLibrary;

pub const POSITION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DIFFUSE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub struct GBuffer {
    pub position_texture: wgpu::Texture,
    position_view: wgpu::TextureView,
    normal_view: wgpu::TextureView,
    diffuse_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,

    background_view: wgpu::TextureView,
    background_sampler: wgpu::Sampler,

    pub frame_uniforms: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    compose_bind_group: wgpu::BindGroup,

    compose_layout: wgpu::BindGroupLayout,
    /// Per-chunk composition inputs: chunk params + stable light buffer.
    pub chunk_compose_layout: wgpu::BindGroupLayout,

    block_pipeline: wgpu::RenderPipeline,
    background_pipeline: wgpu::RenderPipeline,
    chunk_compose_pipeline: wgpu::RenderPipeline,

    pub width: u32,
    pub height: u32,
}

fn texture_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

impl GBuffer {
    pub fn new(
        ctx: &GpuContext,
        kernels: &KernelLibrary,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let device = &ctx.device;

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let compose_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("compose_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1, false),
                texture_entry(2, false),
                texture_entry(3, false),
                texture_entry(4, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let chunk_compose_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("chunk_compose_layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let frame_uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_bind_group"),
            layout: &frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_uniforms.as_entire_binding(),
            }],
        });

        let (background_view, background_sampler) = Self::create_background(ctx);

        // Block (G-buffer geometry) pipeline: three tightly-packed vertex
        // streams written by the mesh kernel.
        let block_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("block layout"),
            bind_group_layouts: &[&frame_layout],
            immediate_size: 0,
        });
        let block_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("block"),
            layout: Some(&block_layout),
            cache: None,
            vertex: wgpu::VertexState {
                module: kernels.block_module(),
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: 16,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x4],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: 16,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![1 => Float32x4],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: 4,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![2 => Uint32],
                    },
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module: kernels.block_module(),
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[
                    Some(wgpu::ColorTargetState {
                        format: POSITION_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                    Some(wgpu::ColorTargetState {
                        format: NORMAL_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                    Some(wgpu::ColorTargetState {
                        format: DIFFUSE_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                ],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview_mask: None,
        });

        let fullscreen_pipeline = |label: &str,
                                   entry: &str,
                                   layouts: &[&wgpu::BindGroupLayout]| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{label} layout")),
                bind_group_layouts: layouts,
                immediate_size: 0,
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                cache: None,
                vertex: wgpu::VertexState {
                    module: kernels.deferred_module(),
                    entry_point: Some("vs_fullscreen"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: kernels.deferred_module(),
                    entry_point: Some(entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview_mask: None,
            })
        };

        let background_pipeline =
            fullscreen_pipeline("block_deferred background", "fs_background", &[&compose_layout]);
        let chunk_compose_pipeline = fullscreen_pipeline(
            "block_deferred chunk",
            "fs_chunk",
            &[&compose_layout, &chunk_compose_layout],
        );

        let targets = Targets::new(
            device,
            &compose_layout,
            &frame_uniforms,
            &background_view,
            &background_sampler,
            width,
            height,
        );

        GBuffer {
            position_texture: targets.position_texture,
            position_view: targets.position_view,
            normal_view: targets.normal_view,
            diffuse_view: targets.diffuse_view,
            depth_view: targets.depth_view,
            background_view,
            background_sampler,
            frame_uniforms,
            frame_bind_group,
            compose_bind_group: targets.compose_bind_group,
            compose_layout,
            chunk_compose_layout,
            block_pipeline,
            background_pipeline,
            chunk_compose_pipeline,
            width: width.max(1),
            height: height.max(1),
        }
    }

    fn create_target(
        device: &wgpu::Device,
        label: &str,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> wgpu::Texture {
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        if format == POSITION_FORMAT {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
    }

    /// Recreate the render targets and the composition bind group for a new
    /// surface size. Per-chunk bind groups are unaffected: they only
    /// reference chunk-owned buffers.
    pub fn rebuild_targets(&mut self, ctx: &GpuContext, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        let targets = Targets::new(
            &ctx.device,
            &self.compose_layout,
            &self.frame_uniforms,
            &self.background_view,
            &self.background_sampler,
            width,
            height,
        );
        self.position_texture = targets.position_texture;
        self.position_view = targets.position_view;
        self.normal_view = targets.normal_view;
        self.diffuse_view = targets.diffuse_view;
        self.depth_view = targets.depth_view;
        self.compose_bind_group = targets.compose_bind_group;
    }

    /// Procedural sky background sampled by the composition pass.
    fn create_background(ctx: &GpuContext) -> (wgpu::TextureView, wgpu::Sampler) {
        let mut noise = FastNoiseLite::with_seed(1337);
        noise.set_noise_type(Some(NoiseType::OpenSimplex2));
        noise.set_frequency(Some(6.0 / BACKGROUND_SIZE as f32));

        let size = BACKGROUND_SIZE as usize;
        let mut pixels = vec![0u8; size * size * 4];
        for y in 0..size {
            let t = y as f32 / size as f32;
            // Horizon gradient from pale blue to deep sky.
            let base = [
                180.0 - 120.0 * t,
                205.0 - 100.0 * t,
                235.0 - 55.0 * t,
            ];
            for x in 0..size {
                let n = noise.get_noise_2d(x as f32, y as f32) * 0.5 + 0.5;
                let cloud = (n - 0.62).max(0.0) * 2.6;
                let idx = (y * size + x) * 4;
                for c in 0..3 {
                    let v = base[c] + (255.0 - base[c]) * cloud;
                    pixels[idx + c] = v.clamp(0.0, 255.0) as u8;
                }
                pixels[idx + 3] = 255;
            }
        }

        let texture = ctx.device.create_texture_with_data(
            &ctx.queue,
            &wgpu::TextureDescriptor {
                label: Some("Background Texture"),
                size: wgpu::Extent3d {
                    width: BACKGROUND_SIZE,
                    height: BACKGROUND_SIZE,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &pixels,
        );

        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Background Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        (texture.create_view(&wgpu::TextureViewDescriptor::default()), sampler)
    }

    pub fn write_frame_uniforms(&self, queue: &wgpu::Queue, uniforms: &FrameUniforms) {
        queue.write_buffer(&self.frame_uniforms, 0, bytemuck::bytes_of(uniforms));
    }

    /// Begin the single G-buffer geometry pass over all chunks.
    pub fn begin_geometry_pass<'a>(
        &'a self,
        encoder: &'a mut wgpu::CommandEncoder,
    ) -> wgpu::RenderPass<'a> {
        let color = |view| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("G-Buffer Pass"),
            color_attachments: &[
                color(&self.position_view),
                color(&self.normal_view),
                color(&self.diffuse_view),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        pass.set_pipeline(&self.block_pipeline);
        pass.set_bind_group(0, &self.frame_bind_group, &[]);
        pass
    }

    /// Background composition: clears the frame and fills pixels the
    /// geometry pass left empty.
    pub fn record_background(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Deferred Background Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });
        pass.set_pipeline(&self.background_pipeline);
        pass.set_bind_group(0, &self.compose_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    /// One deferred-lighting pass for a single chunk.
    pub fn record_chunk_compose(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        chunk_bind_group: &wgpu::BindGroup,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Deferred Chunk Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });
        pass.set_pipeline(&self.chunk_compose_pipeline);
        pass.set_bind_group(0, &self.compose_bind_group, &[]);
        pass.set_bind_group(1, chunk_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

/// Size-dependent targets, rebuilt together on resize.
struct Targets {
    position_texture: wgpu::Texture,
    position_view: wgpu::TextureView,
    normal_view: wgpu::TextureView,
    diffuse_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    compose_bind_group: wgpu::BindGroup,
}

impl Targets {
    fn new(
        device: &wgpu::Device,
        compose_layout: &wgpu::BindGroupLayout,
        frame_uniforms: &wgpu::Buffer,
        background_view: &wgpu::TextureView,
        background_sampler: &wgpu::Sampler,
        width: u32,
        height: u32,
    ) -> Self {
        let position_texture =
            GBuffer::create_target(device, "G Position", POSITION_FORMAT, width, height);
        let position_view = position_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let normal_view = GBuffer::create_target(device, "G Normal", NORMAL_FORMAT, width, height)
            .create_view(&wgpu::TextureViewDescriptor::default());
        let diffuse_view =
            GBuffer::create_target(device, "G Diffuse", DIFFUSE_FORMAT, width, height)
                .create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = GBuffer::create_target(device, "G Depth", DEPTH_FORMAT, width, height)
            .create_view(&wgpu::TextureViewDescriptor::default());

        let compose_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("compose_bind_group"),
            layout: compose_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: frame_uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&position_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&normal_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&diffuse_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(background_view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(background_sampler),
                },
            ],
        });

        Targets {
            position_texture,
            position_view,
            normal_view,
            diffuse_view,
            depth_view,
            compose_bind_group,
        }
    }
}
