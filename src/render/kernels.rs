//! Named-kernel registry.
//!
//! Every GPU kernel the engine consumes is listed here by name with its
//! binding layout; the shader bodies live in `src/shaders/` and are treated
//! as opaque collaborators. Stage drivers and the renderer look pipelines up
//! from this library instead of compiling shaders themselves.

use wgpu::ShaderStages;

fn uniform_entry(binding: u32, visibility: ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(
    binding: u32,
    read_only: bool,
    visibility: ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub struct KernelLibrary {
    pub noise: wgpu::ComputePipeline,
    pub mesh_reset: wgpu::ComputePipeline,
    pub mesh_extract: wgpu::ComputePipeline,
    pub light: wgpu::ComputePipeline,
    pub cull: wgpu::ComputePipeline,
    pub voxel_edit: wgpu::ComputePipeline,

    pub noise_layout: wgpu::BindGroupLayout,
    pub mesh_layout: wgpu::BindGroupLayout,
    pub light_layout: wgpu::BindGroupLayout,
    pub cull_layout: wgpu::BindGroupLayout,
    pub edit_layout: wgpu::BindGroupLayout,

    block_module: wgpu::ShaderModule,
    deferred_module: wgpu::ShaderModule,
}

impl KernelLibrary {
    pub fn new(device: &wgpu::Device) -> Self {
        let compute = ShaderStages::COMPUTE;

        let noise_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("noise_layout"),
            entries: &[
                uniform_entry(0, compute),
                uniform_entry(1, compute),
                storage_entry(2, false, compute),
            ],
        });

        let mesh_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mesh_layout"),
            entries: &[
                uniform_entry(0, compute),
                uniform_entry(1, compute),
                storage_entry(2, true, compute),
                storage_entry(3, true, compute),
                storage_entry(4, true, compute),
                storage_entry(5, false, compute),
                storage_entry(6, false, compute),
                storage_entry(7, false, compute),
                storage_entry(8, false, compute),
                storage_entry(9, false, compute),
            ],
        });

        let light_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("light_layout"),
            entries: &[
                uniform_entry(0, compute),
                uniform_entry(1, compute),
                storage_entry(2, true, compute),
                storage_entry(3, true, compute),
                storage_entry(4, false, compute),
            ],
        });

        let cull_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cull_layout"),
            entries: &[
                uniform_entry(0, compute),
                uniform_entry(1, compute),
                storage_entry(2, true, compute),
                storage_entry(3, true, compute),
                storage_entry(4, false, compute),
                storage_entry(5, false, compute),
                storage_entry(6, false, compute),
            ],
        });

        let edit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("edit_layout"),
            entries: &[
                uniform_entry(0, compute),
                storage_entry(1, true, compute),
                storage_entry(2, false, compute),
            ],
        });

        let noise = Self::compute_pipeline(device, "noise", "main", &noise_layout);
        let mesh_reset = Self::compute_pipeline(device, "mesh", "reset", &mesh_layout);
        let mesh_extract = Self::compute_pipeline(device, "mesh", "extract", &mesh_layout);
        let light = Self::compute_pipeline(device, "light", "main", &light_layout);
        let cull = Self::compute_pipeline(device, "cull", "main", &cull_layout);
        let voxel_edit = Self::compute_pipeline(device, "voxel_edit", "main", &edit_layout);

        let block_module = Self::shader_module(device, "block");
        let deferred_module = Self::shader_module(device, "block_deferred");

        KernelLibrary {
            noise,
            mesh_reset,
            mesh_extract,
            light,
            cull,
            voxel_edit,
            noise_layout,
            mesh_layout,
            light_layout,
            cull_layout,
            edit_layout,
            block_module,
            deferred_module,
        }
    }

    fn shader_source(name: &str) -> &'static str {
        match name {
            "noise" => include_str!("../shaders/noise.wgsl"),
            "mesh" => include_str!("../shaders/mesh.wgsl"),
            "light" => include_str!("../shaders/light.wgsl"),
            "cull" => include_str!("../shaders/cull.wgsl"),
            "voxel_edit" => include_str!("../shaders/voxel_edit.wgsl"),
            "block" => include_str!("../shaders/block.wgsl"),
            "block_deferred" => include_str!("../shaders/block_deferred.wgsl"),
            other => panic!("unknown kernel '{other}'"),
        }
    }

    fn shader_module(device: &wgpu::Device, name: &str) -> wgpu::ShaderModule {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(Self::shader_source(name).into()),
        })
    }

    fn compute_pipeline(
        device: &wgpu::Device,
        name: &str,
        entry: &str,
        layout: &wgpu::BindGroupLayout,
    ) -> wgpu::ComputePipeline {
        let module = Self::shader_module(device, name);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{name}:{entry} layout")),
            bind_group_layouts: &[layout],
            immediate_size: 0,
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&format!("{name}:{entry}")),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(entry),
            compilation_options: Default::default(),
            cache: None,
        })
    }

    /// G-buffer geometry kernel module (`block`).
    pub fn block_module(&self) -> &wgpu::ShaderModule {
        &self.block_module
    }

    /// Deferred composition kernel module (`block_deferred`).
    pub fn deferred_module(&self) -> &wgpu::ShaderModule {
        &self.deferred_module
    }
}
