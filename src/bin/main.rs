use std::{
    fs::File,
    io::BufReader,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use cgmath::prelude::*;
use clap::Parser;
use eframe::egui_wgpu::wgpu;
use eframe::wgpu::include_wgsl;
use eframe::{egui, wgpu::util::DeviceExt};
use encase::{ShaderSize, ShaderType};
use hand_particles::{
    CameraSnapshot, GestureRouter, HandObservation, Simulation, SimulationConfig,
    camera::{DEFAULT_EYE, DEFAULT_FOVY, DEFAULT_TARGET},
    config::{Anchor, RepelTrigger, TrackerOptions},
    feed::{ConfidenceGate, SyntheticHands, read_frames},
    gpu::{GpuCamera, GpuColors, GpuParticles, camera_bytes, color_bytes, particle_bytes},
    markers::{MARKER_RADIUS, markers},
};
use parking_lot::RwLock;

const ROTATION_SPEED: f32 = 90.0;
const MOVEMENT_SPEED: f32 = 10.0;
const DRAG_SENSITIVITY: f32 = 0.3;
const ZOOM_SENSITIVITY: f32 = 0.05;
const MIN_DISTANCE: f32 = 5.0;
const MAX_DISTANCE: f32 = 200.0;
const GROUND_VERTICES: u32 = 41 * 2 * 2;

#[derive(Parser)]
#[command(name = "viewer", about = "Hand-driven particle simulation")]
struct Cli {
    /// JSON configuration file, also the target of "Save"
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON-lines tracking recording; synthetic hands if omitted
    #[arg(long)]
    feed: Option<PathBuf>,

    /// Seed of the synthetic hands
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Rate of tracking updates
    #[arg(long, default_value_t = 30.0)]
    tracking_hz: f64,
}

struct Axes {
    pub forward: cgmath::Vector3<f32>,
    pub right: cgmath::Vector3<f32>,
    pub up: cgmath::Vector3<f32>,
}

/// Orbit camera around a target point.
struct OrbitCamera {
    pub target: cgmath::Point3<f32>,
    pub distance: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl OrbitCamera {
    fn new(eye: cgmath::Point3<f32>, target: cgmath::Point3<f32>) -> Self {
        let offset = target - eye;
        let distance = offset.magnitude();
        let forward = offset / distance;
        Self {
            target,
            distance: distance.clamp(MIN_DISTANCE, MAX_DISTANCE),
            pitch: forward.y.asin().to_degrees(),
            yaw: forward.x.atan2(-forward.z).to_degrees(),
        }
    }

    fn calculate_axes(&self) -> Axes {
        let yaw_rad = self.yaw.to_radians();
        let pitch_rad = self.pitch.to_radians();

        let forward = cgmath::vec3(
            pitch_rad.cos() * yaw_rad.sin(),
            pitch_rad.sin(),
            -pitch_rad.cos() * yaw_rad.cos(),
        )
        .normalize();

        let right = forward.cross(cgmath::Vector3::unit_y()).normalize();
        let up = right.cross(forward).normalize();

        Axes { forward, right, up }
    }

    fn eye(&self) -> cgmath::Point3<f32> {
        self.target - self.calculate_axes().forward * self.distance
    }

    fn view_matrix(&self) -> cgmath::Matrix4<f32> {
        let axes = self.calculate_axes();
        cgmath::Matrix4::look_to_rh(self.eye(), axes.forward, axes.up)
    }

    fn projection_matrix(aspect: f32) -> cgmath::Matrix4<f32> {
        cgmath::perspective(cgmath::Deg(DEFAULT_FOVY), aspect, 0.1, 1000.0)
    }

    fn snapshot(&self, aspect: f32, navigating: bool) -> Option<CameraSnapshot> {
        CameraSnapshot::new(self.eye(), self.view_matrix(), Self::projection_matrix(aspect))
            .map(|snapshot| snapshot.with_navigating(navigating))
    }
}

struct Renderer {
    camera_uniform_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    particles_storage_buffer: wgpu::Buffer,
    particles_storage_buffer_size: usize,
    colors_storage_buffer: wgpu::Buffer,
    colors_storage_buffer_size: usize,
    particles_bind_group_layout: wgpu::BindGroupLayout,
    particles_bind_group: wgpu::BindGroup,
    particles_render_pipeline: wgpu::RenderPipeline,
    ground_render_pipeline: wgpu::RenderPipeline,
}

impl Renderer {
    fn new(render_state: &eframe::egui_wgpu::RenderState) -> Self {
        let device = &render_state.device;

        let particles_shader = device.create_shader_module(include_wgsl!("./particles.wgsl"));
        let ground_shader = device.create_shader_module(include_wgsl!("./ground.wgsl"));

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Camera Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(<GpuCamera as ShaderSize>::SHADER_SIZE),
                    },
                    count: None,
                }],
            });

        let particles_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Particles Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: Some(<GpuParticles as ShaderType>::min_size()),
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: Some(<GpuColors as ShaderType>::min_size()),
                        },
                        count: None,
                    },
                ],
            });

        const PARTICLES_STORAGE_BUFFER_SIZE: usize =
            <GpuParticles as ShaderType>::METADATA.min_size().get() as _;
        const COLORS_STORAGE_BUFFER_SIZE: usize =
            <GpuColors as ShaderType>::METADATA.min_size().get() as _;

        let camera_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Uniform Buffer"),
            contents: &[0; <GpuCamera as ShaderSize>::SHADER_SIZE.get() as _],
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::UNIFORM,
        });

        let particles_storage_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Particles Storage Buffer"),
                contents: &[0; PARTICLES_STORAGE_BUFFER_SIZE],
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::STORAGE,
            });

        let colors_storage_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Colors Storage Buffer"),
            contents: &[0; COLORS_STORAGE_BUFFER_SIZE],
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::STORAGE,
        });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_uniform_buffer.as_entire_binding(),
            }],
        });

        let particles_bind_group = Self::particles_bind_group(
            device,
            &particles_bind_group_layout,
            &particles_storage_buffer,
            &colors_storage_buffer,
        );

        let particles_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Particles Pipeline Layout"),
                bind_group_layouts: &[&camera_bind_group_layout, &particles_bind_group_layout],
                push_constant_ranges: &[],
            });

        let ground_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Ground Pipeline Layout"),
                bind_group_layouts: &[&camera_bind_group_layout],
                push_constant_ranges: &[],
            });

        let depth_stencil = wgpu::DepthStencilState {
            format: wgpu::TextureFormat::Depth32Float,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        };

        let particles_render_pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Particles Render Pipeline"),
                layout: Some(&particles_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &particles_shader,
                    entry_point: "vs_main",
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &particles_shader,
                    entry_point: "fs_main",
                    targets: &[Some(render_state.target_format.into())],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    ..Default::default()
                },
                depth_stencil: Some(depth_stencil.clone()),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        let ground_render_pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Ground Render Pipeline"),
                layout: Some(&ground_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &ground_shader,
                    entry_point: "vs_main",
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &ground_shader,
                    entry_point: "fs_main",
                    targets: &[Some(render_state.target_format.into())],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::LineList,
                    ..Default::default()
                },
                depth_stencil: Some(depth_stencil),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        Self {
            camera_uniform_buffer,
            camera_bind_group,
            particles_storage_buffer,
            particles_storage_buffer_size: PARTICLES_STORAGE_BUFFER_SIZE,
            colors_storage_buffer,
            colors_storage_buffer_size: COLORS_STORAGE_BUFFER_SIZE,
            particles_bind_group_layout,
            particles_bind_group,
            particles_render_pipeline,
            ground_render_pipeline,
        }
    }

    fn particles_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        particles: &wgpu::Buffer,
        colors: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particles Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: particles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: colors.as_entire_binding(),
                },
            ],
        })
    }

    fn prepare(
        &mut self,
        camera: &[u8],
        particles: &[u8],
        colors: Option<&[u8]>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Vec<wgpu::CommandBuffer> {
        queue.write_buffer(&self.camera_uniform_buffer, 0, camera);

        let mut particles_bind_group_invalidated = false;

        if self.particles_storage_buffer_size >= particles.len() {
            queue.write_buffer(&self.particles_storage_buffer, 0, particles);
        } else {
            particles_bind_group_invalidated = true;
            self.particles_storage_buffer =
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Particles Storage Buffer"),
                    contents: particles,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::STORAGE,
                });
            self.particles_storage_buffer_size = particles.len();
        }

        // Colours only change when the population is rebuilt.
        if let Some(colors) = colors {
            if self.colors_storage_buffer_size >= colors.len() {
                queue.write_buffer(&self.colors_storage_buffer, 0, colors);
            } else {
                particles_bind_group_invalidated = true;
                self.colors_storage_buffer =
                    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Colors Storage Buffer"),
                        contents: colors,
                        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::STORAGE,
                    });
                self.colors_storage_buffer_size = colors.len();
            }
        }

        if particles_bind_group_invalidated {
            self.particles_bind_group = Self::particles_bind_group(
                device,
                &self.particles_bind_group_layout,
                &self.particles_storage_buffer,
                &self.colors_storage_buffer,
            );
        }

        vec![]
    }

    fn paint<'a>(&'a self, particle_count: u32, render_pass: &mut wgpu::RenderPass<'a>) {
        render_pass.set_pipeline(&self.ground_render_pipeline);
        render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
        render_pass.draw(0..GROUND_VERTICES, 0..1);

        render_pass.set_pipeline(&self.particles_render_pipeline);
        render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
        render_pass.set_bind_group(1, &self.particles_bind_group, &[]);
        render_pass.draw(0..4, 0..particle_count);
    }
}


type Frames = Box<dyn Iterator<Item = Vec<HandObservation>> + Send>;

/// Tracking domain: runs the feed through the confidence gate and the router
/// against the latest camera snapshot. Gesture parameters reach the router
/// through `Simulation::set_config`; tracker options arrive through `options`.
fn spawn_tracker(
    mut router: GestureRouter,
    frames: Frames,
    camera: Arc<RwLock<CameraSnapshot>>,
    options: Arc<RwLock<TrackerOptions>>,
    period: Option<Duration>,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut current = *options.read();
        let mut gate = ConfidenceGate::new(current);

        for observations in frames {
            if !running.load(Ordering::Relaxed) {
                return;
            }

            let latest = *options.read();
            if latest != current {
                gate.set_options(latest);
                current = latest;
            }

            let camera = *camera.read();
            router.on_tracking_update(&gate.filter(observations), &camera);

            if let Some(period) = period {
                thread::sleep(period);
            }
        }

        log::info!("Tracking feed ended");
        let camera = *camera.read();
        router.on_tracking_update(&[], &camera);
    })
}

struct HandParticlesApp {
    simulation: Simulation,
    config: SimulationConfig,
    pending_particle_count: usize,
    config_path: PathBuf,
    camera: OrbitCamera,
    camera_shared: Arc<RwLock<CameraSnapshot>>,
    tracker_options: Arc<RwLock<TrackerOptions>>,
    tracker: Option<thread::JoinHandle<()>>,
    running: Arc<AtomicBool>,
    rendering: bool,
    colors_dirty: bool,
    started: Instant,
    last_frame_time: Instant,
    accumulated_time: Duration,
    simulation_rate: f32,
    update_time: Duration,
}

impl HandParticlesApp {
    fn new(
        cc: &eframe::CreationContext,
        simulation: Simulation,
        router: GestureRouter,
        frames: Frames,
        config_path: PathBuf,
        tracking_hz: f64,
    ) -> Self {
        let rendering = match cc.wgpu_render_state.as_ref() {
            Some(render_state) => {
                let renderer = Renderer::new(render_state);
                render_state
                    .renderer
                    .write()
                    .paint_callback_resources
                    .insert(renderer);
                true
            }
            None => {
                log::error!("wgpu render state unavailable, particles will not be drawn");
                false
            }
        };

        let camera = OrbitCamera::new(DEFAULT_EYE.into(), DEFAULT_TARGET.into());
        let initial = camera
            .snapshot(16.0 / 9.0, false)
            .or_else(|| CameraSnapshot::default_view(16.0 / 9.0));
        let camera_shared = Arc::new(RwLock::new(initial.unwrap_or_else(|| {
            log::error!("Initial camera is singular, using identity transform");
            CameraSnapshot {
                eye: DEFAULT_EYE.into(),
                view_projection: cgmath::Matrix4::identity(),
                inverse_view_projection: cgmath::Matrix4::identity(),
                navigating: false,
            }
        })));

        let config = simulation.config().clone();
        let tracker_options = Arc::new(RwLock::new(config.tracker));
        let running = Arc::new(AtomicBool::new(true));
        let tracker = spawn_tracker(
            router,
            frames,
            Arc::clone(&camera_shared),
            Arc::clone(&tracker_options),
            (tracking_hz > 0.0).then(|| Duration::from_secs_f64(1.0 / tracking_hz)),
            Arc::clone(&running),
        );

        Self {
            simulation,
            pending_particle_count: config.particle_count,
            config,
            config_path,
            camera,
            camera_shared,
            tracker_options,
            tracker: Some(tracker),
            running,
            rendering,
            colors_dirty: true,
            started: Instant::now(),
            last_frame_time: Instant::now(),
            accumulated_time: Duration::ZERO,
            simulation_rate: 60.0,
            update_time: Duration::ZERO,
        }
    }

    fn handle_camera_input(&mut self, ctx: &egui::Context, response: &egui::Response, ts: f32) {
        if response.dragged() {
            let delta = response.drag_delta();
            self.camera.yaw += delta.x * DRAG_SENSITIVITY;
            self.camera.pitch -= delta.y * DRAG_SENSITIVITY;
        }

        if response.hovered() {
            let scroll = ctx.input(|i| i.scroll_delta.y);
            self.camera.distance *= 1.0 - scroll * ZOOM_SENSITIVITY * 0.1;
        }

        if !ctx.wants_keyboard_input() {
            ctx.input(|i| {
                let axes = self.camera.calculate_axes();
                let flat_forward = cgmath::vec3(axes.forward.x, 0.0, axes.forward.z)
                    .normalize_to(MOVEMENT_SPEED * ts);
                let flat_right = cgmath::vec3(axes.right.x, 0.0, axes.right.z)
                    .normalize_to(MOVEMENT_SPEED * ts);

                if i.key_down(egui::Key::W) {
                    self.camera.target += flat_forward;
                }
                if i.key_down(egui::Key::S) {
                    self.camera.target -= flat_forward;
                }
                if i.key_down(egui::Key::A) {
                    self.camera.target -= flat_right;
                }
                if i.key_down(egui::Key::D) {
                    self.camera.target += flat_right;
                }
                if i.key_down(egui::Key::Q) {
                    self.camera.distance += MOVEMENT_SPEED * ts;
                }
                if i.key_down(egui::Key::E) {
                    self.camera.distance -= MOVEMENT_SPEED * ts;
                }

                if i.key_down(egui::Key::ArrowUp) {
                    self.camera.pitch += ROTATION_SPEED * ts;
                }
                if i.key_down(egui::Key::ArrowDown) {
                    self.camera.pitch -= ROTATION_SPEED * ts;
                }
                if i.key_down(egui::Key::ArrowLeft) {
                    self.camera.yaw -= ROTATION_SPEED * ts;
                }
                if i.key_down(egui::Key::ArrowRight) {
                    self.camera.yaw += ROTATION_SPEED * ts;
                }
            });
        }

        self.camera.pitch = self.camera.pitch.clamp(-89.0, 89.0);
        self.camera.distance = self.camera.distance.clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    fn render_ui_panel(&mut self, ui: &mut egui::Ui, frame_time: f32) {
        ui.label(format!("FPS: {:.1}", 1.0 / frame_time.max(f32::EPSILON)));
        ui.label(format!("Frame Time: {:.3}ms", frame_time * 1000.0));
        ui.label(format!("Update Time: {:.3}ms", self.update_time.as_secs_f64() * 1000.0));
        ui.label(format!("Particles: {}", self.simulation.particles().len()));

        let control = self.simulation.control();
        ui.label(format!(
            "Attract: {}",
            if control.attract.active { "active" } else { "idle" }
        ));
        ui.label(format!("Repel pulses: {}", control.repel.pulse));

        ui.separator();
        ui.horizontal(|ui| {
            ui.label("Simulation Rate: ");
            ui.add(egui::Slider::new(&mut self.simulation_rate, 1.0..=240.0));
        });
        ui.horizontal(|ui| {
            ui.label("Particle Count: ");
            ui.add(egui::DragValue::new(&mut self.pending_particle_count).speed(1000.0));
            if ui.button("Apply").clicked() {
                self.config.particle_count = self.pending_particle_count;
            }
        });
        ui.horizontal(|ui| {
            ui.label("Particle Size: ");
            ui.add(egui::Slider::new(&mut self.config.particle_size, 0.01..=2.0));
        });

        ui.collapsing("Physics", |ui| {
            let integration = &mut self.config.integration;
            ui.add(egui::Slider::new(&mut integration.gravity, -0.02..=0.0).text("Gravity"));
            ui.add(egui::Slider::new(&mut integration.friction, 0.9..=0.9999).text("Friction"));
            ui.add(egui::Slider::new(&mut integration.bounce, 0.0..=0.9999).text("Bounce"));
            ui.add(
                egui::Slider::new(&mut integration.ground_friction, 0.0..=0.9999)
                    .text("Ground Friction"),
            );
        });

        ui.collapsing("Fields", |ui| {
            ui.label("Repel");
            ui.add(egui::Slider::new(&mut self.config.repel.radius, 0.0..=40.0).text("Radius"));
            ui.add(egui::Slider::new(&mut self.config.repel.strength, 0.0..=0.1).text("Strength"));
            ui.label("Attract");
            ui.add(egui::Slider::new(&mut self.config.attract.radius, 0.0..=40.0).text("Radius"));
            ui.add(
                egui::Slider::new(&mut self.config.attract.strength, 0.0..=0.02).text("Strength"),
            );
        });

        ui.collapsing("Gestures", |ui| {
            let gesture = &mut self.config.gesture;
            ui.add(egui::Slider::new(&mut gesture.sensitivity, 0.1..=3.0).text("Sensitivity"));
            egui::ComboBox::from_label("Anchor")
                .selected_text(format!("{:?}", gesture.anchor))
                .show_ui(ui, |ui| {
                    ui.selectable_value(&mut gesture.anchor, Anchor::PalmCenter, "PalmCenter");
                    ui.selectable_value(&mut gesture.anchor, Anchor::Wrist, "Wrist");
                });
            egui::ComboBox::from_label("Repel Trigger")
                .selected_text(format!("{:?}", gesture.repel_trigger))
                .show_ui(ui, |ui| {
                    ui.selectable_value(&mut gesture.repel_trigger, RepelTrigger::OnOpen, "OnOpen");
                    ui.selectable_value(
                        &mut gesture.repel_trigger,
                        RepelTrigger::EveryObservation,
                        "EveryObservation",
                    );
                });

            let tracker = &mut self.config.tracker;
            ui.add(egui::Slider::new(&mut tracker.max_num_hands, 1..=4).text("Max Hands"));
            ui.add(
                egui::Slider::new(&mut tracker.min_detection_confidence, 0.0..=1.0)
                    .text("Detection Confidence"),
            );
            ui.add(
                egui::Slider::new(&mut tracker.min_tracking_confidence, 0.0..=1.0)
                    .text("Tracking Confidence"),
            );
        });

        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Reset").clicked() {
                self.simulation.reset();
                self.colors_dirty = true;
            }
            if ui.button("Save").clicked() {
                match self.simulation.config().save(&self.config_path) {
                    Ok(()) => log::info!("Saved configuration to {}", self.config_path.display()),
                    Err(e) => log::error!("Failed to save configuration: {e}"),
                }
            }
        });
    }

    fn apply_config(&mut self) {
        if self.config == *self.simulation.config() {
            return;
        }

        let relayout = self.config.particle_count != self.simulation.config().particle_count
            || self.config.separation != self.simulation.config().separation;
        match self.simulation.set_config(self.config.clone()) {
            Ok(()) => {
                self.colors_dirty |= relayout;
                *self.tracker_options.write() = self.simulation.config().tracker;
            }
            Err(e) => log::warn!("Rejected configuration change: {e}"),
        }
        self.config = self.simulation.config().clone();
        self.pending_particle_count = self.config.particle_count;
    }

    fn paint_markers(&self, painter: &egui::Painter, rect: egui::Rect, camera: &CameraSnapshot) {
        let to_screen = |ndc: cgmath::Vector2<f32>| {
            egui::pos2(
                rect.center().x + ndc.x * rect.width() * 0.5,
                rect.center().y - ndc.y * rect.height() * 0.5,
            )
        };
        let right = self.camera.calculate_axes().right;
        let seconds = self.started.elapsed().as_secs_f32();

        for marker in markers(self.simulation.control(), seconds) {
            let center = cgmath::Point3::from_vec(marker.position);
            let edge = center + right * MARKER_RADIUS * marker.scale;
            let (Some(center), Some(edge)) = (camera.project(center), camera.project(edge)) else {
                continue;
            };

            let center = to_screen(center);
            let radius = center.distance(to_screen(edge));
            let [r, g, b] = marker.style.color;
            let alpha = (marker.opacity.clamp(0.0, 1.0) * 255.0) as u8;
            painter.circle_filled(center, radius, egui::Color32::from_rgba_unmultiplied(r, g, b, alpha));
        }
    }
}

impl eframe::App for HandParticlesApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let current_time = Instant::now();
        let frame_time = current_time.duration_since(self.last_frame_time);
        self.last_frame_time = current_time;

        let ts = frame_time.as_secs_f32();
        self.accumulated_time += frame_time;

        let step_time = Duration::from_secs_f32(1.0 / self.simulation_rate);
        if self.accumulated_time >= step_time {
            let report = self.simulation.step();
            self.update_time = report.update_time;
            if report.repel_dispatched {
                log::debug!("Frame {}: repel", report.frame);
            }
            // Drop the backlog instead of catching up after a stall.
            self.accumulated_time = self.accumulated_time.saturating_sub(step_time).min(step_time);
        }

        egui::SidePanel::left("Control Panel").show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                self.render_ui_panel(ui, ts);
                ui.allocate_space(ui.available_size());
            });
        });
        self.apply_config();

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(ctx.style().visuals.panel_fill))
            .show(ctx, |ui| {
                let (rect, response) =
                    ui.allocate_exact_size(ui.available_size(), egui::Sense::drag());
                self.handle_camera_input(ctx, &response, ts);

                let aspect = rect.width() / rect.height().max(1.0);
                let Some(snapshot) = self.camera.snapshot(aspect, response.dragged()) else {
                    return;
                };
                *self.camera_shared.write() = snapshot;

                if self.rendering {
                    let camera = camera_bytes(&GpuCamera {
                        view_matrix: self.camera.view_matrix(),
                        projection_matrix: OrbitCamera::projection_matrix(aspect),
                        particle_size: self.simulation.config().particle_size,
                    });
                    let particles = self.simulation.particles();
                    let (buffers, colors) = rayon::join(
                        || camera.and_then(|camera| Ok((camera, particle_bytes(particles)?))),
                        || self.colors_dirty.then(|| color_bytes(particles)).transpose(),
                    );

                    match (buffers, colors) {
                        (Ok((camera, particles)), Ok(colors)) => {
                            self.colors_dirty = false;
                            let particle_count = self.simulation.particles().len() as u32;
                            ui.painter().add(egui::PaintCallback {
                                rect,
                                callback: Arc::new(
                                    eframe::egui_wgpu::CallbackFn::new()
                                        .prepare(move |device, queue, _encoder, resources| {
                                            resources
                                                .get_mut::<Renderer>()
                                                .map(|renderer| {
                                                    renderer.prepare(
                                                        &camera,
                                                        &particles,
                                                        colors.as_deref(),
                                                        device,
                                                        queue,
                                                    )
                                                })
                                                .unwrap_or_default()
                                        })
                                        .paint(move |_info, render_pass, resources| {
                                            if let Some(renderer) = resources.get::<Renderer>() {
                                                renderer.paint(particle_count, render_pass);
                                            }
                                        }),
                                ),
                            });
                        }
                        (Err(e), _) | (_, Err(e)) => log::error!("Failed to encode frame: {e}"),
                    }
                }

                self.paint_markers(&ui.painter_at(rect), rect, &snapshot);
            });

        ctx.request_repaint();
    }
}

impl Drop for HandParticlesApp {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(tracker) = self.tracker.take() {
            if tracker.join().is_err() {
                log::error!("Tracking thread panicked");
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) if path.exists() => SimulationConfig::load(path)?,
        _ => SimulationConfig::default(),
    };
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("hand_particles.json"));

    let (simulation, router) = Simulation::with_router(config)?;

    let frames: Frames = match &cli.feed {
        Some(path) => {
            log::info!("Replaying tracking frames from {}", path.display());
            Box::new(read_frames(BufReader::new(File::open(path)?)))
        }
        None => {
            log::info!("Using synthetic hands (seed {})", cli.seed);
            Box::new(SyntheticHands::new(cli.seed))
        }
    };

    eframe::run_native(
        "Hand Particles",
        eframe::NativeOptions {
            renderer: eframe::Renderer::Wgpu,
            wgpu_options: eframe::egui_wgpu::WgpuConfiguration {
                present_mode: wgpu::PresentMode::AutoVsync,
                depth_format: Some(wgpu::TextureFormat::Depth32Float),
                ..Default::default()
            },
            depth_buffer: 32,
            ..Default::default()
        },
        Box::new(move |cc| {
            Box::new(HandParticlesApp::new(
                cc,
                simulation,
                router,
                frames,
                config_path,
                cli.tracking_hz,
            ))
        }),
    )?;
    Ok(())
}
