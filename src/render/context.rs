//! Device acquisition and the explicit GPU context handed to every
//! component. Initialization failure is the one fatal error class: it is
//! surfaced as a `GpuInitError` and the application reports it and exits.

use std::fmt;
use std::sync::Arc;

use winit::window::Window;

pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

#[derive(Debug)]
pub enum GpuInitError {
    CreateSurface(wgpu::CreateSurfaceError),
    NoAdapter(String),
    RequestDevice(String),
}

impl fmt::Display for GpuInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuInitError::CreateSurface(e) => write!(f, "failed to create surface: {e}"),
            GpuInitError::NoAdapter(e) => {
                write!(f, "no compatible graphics adapter: {e}")
            }
            GpuInitError::RequestDevice(e) => {
                write!(
                    f,
                    "adapter lacks required features (MULTI_DRAW_INDIRECT) or device \
                     creation failed: {e}"
                )
            }
        }
    }
}

impl std::error::Error for GpuInitError {}

impl GpuContext {
    /// Acquire an adapter and device for `window`, returning the surface
    /// alongside the context.
    pub async fn new(
        window: Arc<Window>,
    ) -> Result<(Self, wgpu::Surface<'static>), GpuInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        tracing::info!("wgpu instance created");

        let surface = instance
            .create_surface(window)
            .map_err(GpuInitError::CreateSurface)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GpuInitError::NoAdapter(e.to_string()))?;

        let info = adapter.get_info();
        tracing::info!(
            "selected adapter: {} on {:?} backend",
            info.name,
            info.backend
        );
        if info.device_type == wgpu::DeviceType::Cpu {
            tracing::warn!("running on a software rasterizer; performance will be poor");
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: Default::default(),
                experimental_features: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| GpuInitError::RequestDevice(e.to_string()))?;

        Ok((
            GpuContext {
                adapter,
                device,
                queue,
            },
            surface,
        ))
    }

    /// Non-blocking device pump: advances map_async and submitted-work
    /// callbacks without stalling the render loop.
    pub fn pump(&self) {
        let _ = self.device.poll(wgpu::PollType::Poll);
    }

    /// Blocking wait for all submitted work. Only valid during one-time
    /// setup; the steady-state loop never calls this.
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
    }
}
