//! Hosting shell: window, device, input, and the per-frame loop that feeds
//! the streamer one shared command encoder and submits it once.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use glam::Vec3;
use winit::{
    event::{DeviceEvent, ElementState, Event, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window, WindowBuilder},
};

use crate::constants::*;
use crate::core::uniforms::FrameUniforms;
use crate::player::{Camera, InputState};
use crate::render::context::{GpuContext, GpuInitError};
use crate::render::gbuffer::GBuffer;
use crate::render::kernels::KernelLibrary;
use crate::world::edit::{EditOp, VoxelEditor};
use crate::world::streamer::{ChunkStreamer, StreamConfig};

/// Streaming iso-surface voxel world renderer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Streaming radius in chunks (Chebyshev).
    #[arg(long, default_value_t = STREAM_RADIUS)]
    radius: i32,

    /// Chunk generations drained per frame.
    #[arg(long, default_value_t = MAX_GENERATIONS_PER_FRAME)]
    generation_budget: usize,

    /// Light propagation iterations per invalidation.
    #[arg(long, default_value_t = LIGHT_ITERATIONS_PER_INVALIDATION)]
    light_iterations: u32,

    /// Frames between asynchronous cull readbacks (0 disables).
    #[arg(long, default_value_t = CULL_READBACK_INTERVAL)]
    readback_interval: u64,

    /// World seed.
    #[arg(long, default_value_t = 1337)]
    seed: u32,

    /// Edit brush radius in world units.
    #[arg(long, default_value_t = 3.0)]
    brush_radius: f32,
}

struct State {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    ctx: GpuContext,
    config: wgpu::SurfaceConfiguration,

    kernels: KernelLibrary,
    gbuffer: GBuffer,
    streamer: ChunkStreamer,
    editor: VoxelEditor,

    camera: Camera,
    input: InputState,
    mouse_captured: bool,
    brush_radius: f32,
    /// Click waiting for the center-position readback to land.
    pending_edit: Option<EditOp>,

    start_time: Instant,
    last_frame: Instant,
    frame_count: u32,
    last_fps_update: Instant,
}

impl State {
    async fn new(window: Window, args: &Args) -> Result<Self, GpuInitError> {
        let window = Arc::new(window);
        let size = window.inner_size();

        let (ctx, surface) = GpuContext::new(window.clone()).await?;

        let surface_caps = surface.get_capabilities(&ctx.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&ctx.device, &config);

        let kernels = KernelLibrary::new(&ctx.device);
        let gbuffer = GBuffer::new(&ctx, &kernels, surface_format, config.width, config.height);

        let stream_config = StreamConfig {
            radius: args.radius,
            generation_budget: args.generation_budget.max(1),
            light_iterations: args.light_iterations.max(1),
            readback_interval: args.readback_interval,
            seed: args.seed,
        };
        let mut streamer = ChunkStreamer::new(&ctx, stream_config);
        streamer.init(&ctx, &kernels, &gbuffer);

        let editor = VoxelEditor::new(&ctx.device);

        let now = Instant::now();
        Ok(State {
            window,
            surface,
            ctx,
            config,
            kernels,
            gbuffer,
            streamer,
            editor,
            camera: Camera::new(Vec3::new(16.0, 24.0, 16.0)),
            input: InputState::default(),
            mouse_captured: false,
            brush_radius: args.brush_radius,
            pending_edit: None,
            start_time: now,
            last_frame: now,
            frame_count: 0,
            last_fps_update: now,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.ctx.device, &self.config);
        self.gbuffer.rebuild_targets(&self.ctx, width, height);
    }

    fn update(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32().min(0.1);
        self.last_frame = now;

        self.camera.update(&self.input, dt);

        // Completed center-position reads resolve pending clicks into edits.
        if let Some(sample) = self.editor.poll_position() {
            if let Some(op) = self.pending_edit.take() {
                if sample.hit {
                    self.editor.queue_edit(
                        &self.streamer,
                        sample.position,
                        self.brush_radius,
                        op,
                        self.streamer.frame(),
                    );
                } else {
                    tracing::debug!("edit click hit background; ignoring");
                }
            }
        }

        // Out-of-band edit application, decoupled from the frame submission.
        self.editor
            .drain(&self.ctx, &self.kernels, &mut self.streamer);
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let aspect = self.config.width as f32 / self.config.height as f32;
        let view_proj = self.camera.view_proj(aspect);
        self.gbuffer.write_frame_uniforms(
            &self.ctx.queue,
            &FrameUniforms {
                view_proj: view_proj.to_cols_array_2d(),
                inv_view_proj: view_proj.inverse().to_cols_array_2d(),
                camera_pos: self.camera.position.to_array(),
                time: self.start_time.elapsed().as_secs_f32(),
                screen_size: [self.config.width as f32, self.config.height as f32],
                sun_dir: [0.4, 0.8],
            },
        );

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        self.streamer.update(
            &self.ctx,
            &self.kernels,
            &self.gbuffer,
            &mut encoder,
            &view,
            self.camera.position,
            &view_proj,
        );

        // The one submission for the whole frame.
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        self.streamer.after_submit(&self.ctx);
        output.present();

        Ok(())
    }

    fn set_mouse_captured(&mut self, captured: bool) {
        self.mouse_captured = captured;
        if captured {
            let _ = self
                .window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined));
            self.window.set_cursor_visible(false);
        } else {
            let _ = self.window.set_cursor_grab(CursorGrabMode::None);
            self.window.set_cursor_visible(true);
        }
    }

    fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        match key {
            KeyCode::KeyW => self.input.forward = pressed,
            KeyCode::KeyS => self.input.backward = pressed,
            KeyCode::KeyA => self.input.left = pressed,
            KeyCode::KeyD => self.input.right = pressed,
            KeyCode::Space => self.input.up = pressed,
            KeyCode::KeyC => self.input.down = pressed,
            KeyCode::ShiftLeft => self.input.sprint = pressed,
            KeyCode::Escape if pressed => self.set_mouse_captured(false),
            _ => {}
        }
    }

    fn handle_click(&mut self, button: MouseButton) {
        if !self.mouse_captured {
            self.set_mouse_captured(true);
            return;
        }
        let op = match button {
            MouseButton::Left => EditOp::Remove,
            MouseButton::Right => EditOp::Add,
            _ => return,
        };
        // One read in flight at a time; a click during a pending read is
        // simply dropped.
        if self.editor.read_position_at_center(&self.ctx, &self.gbuffer) {
            self.pending_edit = Some(op);
        }
    }
}

pub fn run() {
    let args = Args::parse();

    let event_loop = match EventLoop::new() {
        Ok(el) => el,
        Err(e) => {
            tracing::error!("failed to create event loop: {e}");
            std::process::exit(1);
        }
    };
    let window = match WindowBuilder::new()
        .with_title("isoterra")
        .with_inner_size(winit::dpi::LogicalSize::new(1280, 720))
        .build(&event_loop)
    {
        Ok(w) => w,
        Err(e) => {
            tracing::error!("failed to create window: {e}");
            std::process::exit(1);
        }
    };

    // Device or feature acquisition failure is fatal and surfaced before
    // exiting; nothing else in the application is.
    let mut state = match pollster::block_on(State::new(window, &args)) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("graphics initialization failed: {e}");
            eprintln!("isoterra: graphics initialization failed: {e}");
            std::process::exit(1);
        }
    };

    let result = event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent {
                event: WindowEvent::Resized(size),
                ..
            } => {
                state.resize(size.width, size.height);
                state.window.request_redraw();
            }
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => elwt.exit(),
            Event::WindowEvent {
                event: WindowEvent::RedrawRequested,
                ..
            } => {
                state.frame_count += 1;
                let elapsed = state.last_fps_update.elapsed().as_secs_f32();
                if elapsed >= 1.0 {
                    let fps = state.frame_count as f32 / elapsed;
                    state.window.set_title(&format!(
                        "isoterra | {:.0} fps | {} chunks ({} queued)",
                        fps,
                        state.streamer.active_count(),
                        state.streamer.queued_count(),
                    ));
                    state.frame_count = 0;
                    state.last_fps_update = Instant::now();
                }

                state.update();
                match state.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = state.window.inner_size();
                        state.resize(size.width, size.height);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        tracing::error!("surface out of memory");
                        elwt.exit();
                    }
                    Err(e) => tracing::warn!("render error: {e:?}"),
                }
                state.window.request_redraw();
            }
            Event::WindowEvent {
                event:
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                physical_key: PhysicalKey::Code(key),
                                state: key_state,
                                ..
                            },
                        ..
                    },
                ..
            } => {
                state.handle_key(key, key_state == ElementState::Pressed);
            }
            Event::WindowEvent {
                event:
                    WindowEvent::MouseInput {
                        state: ElementState::Pressed,
                        button,
                        ..
                    },
                ..
            } => state.handle_click(button),
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta },
                ..
            } => {
                if state.mouse_captured {
                    state.camera.handle_mouse(delta.0 as f32, delta.1 as f32);
                }
            }
            Event::AboutToWait => state.window.request_redraw(),
            _ => {}
        }
    });

    if let Err(e) = result {
        tracing::error!("event loop error: {e}");
    }
}
