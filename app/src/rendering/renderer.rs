use std::sync::Arc;

use winit::window::Window;

use crate::{
    error::RenderError,
    rendering::{
        accumulator::FrameAccumulator,
        post::PostPass,
        rasterizer::Rasterizer,
        raytracer::{sbt::HitGroupDesc, Raytracer},
        retire::{RetireQueue, FRAMES_IN_FLIGHT},
        settings::{needs_accumulation_reset, FrameSettings, RenderMode},
        wgpu::{Texture, WgpuResources},
    },
    scene::Scene,
    ui::RendererEgui,
};

/// Per-frame orchestrator. Owns the offscreen target, the scene-pass
/// implementations for both modes, accumulation state and the deferred
/// destruction queue; drives the two-pass frame protocol.
pub struct Renderer {
    pub wgpu: WgpuResources,
    pub egui: RendererEgui,
    rasterizer: Rasterizer,
    raytracer: Raytracer,
    post: PostPass,
    scene_target: Texture,
    accumulator: FrameAccumulator,
    retire: RetireQueue<wgpu::Buffer>,
    frame_index: u64,
    hit_groups: Vec<HitGroupDesc>,
    previous_settings: Option<FrameSettings>,
    mode: RenderMode,
    accel_rebuild_pending: bool,
    drained: bool,
}

impl Renderer {
    pub async fn new(
        window: Arc<Window>,
        window_size: &winit::dpi::PhysicalSize<u32>,
        hit_groups: Vec<HitGroupDesc>,
    ) -> Result<Self, RenderError> {
        let wgpu = WgpuResources::new(window.clone(), window_size).await;
        let egui = RendererEgui::new(
            &window,
            &wgpu.device,
            &wgpu.surface_config,
            window.scale_factor() as f32,
        );

        let scene_target =
            Texture::create_scene_target(&wgpu.device, &wgpu.surface_config, "Scene Target");
        let rasterizer = Rasterizer::new(&wgpu)?;
        let raytracer = Raytracer::new(&wgpu, window_size, &scene_target.view)?;
        let post = PostPass::new(&wgpu, &scene_target.view)?;

        Ok(Self {
            wgpu,
            egui,
            rasterizer,
            raytracer,
            post,
            scene_target,
            accumulator: FrameAccumulator::new(),
            retire: RetireQueue::new(FRAMES_IN_FLIGHT),
            frame_index: 0,
            hit_groups,
            previous_settings: None,
            mode: RenderMode::Raster,
            accel_rebuild_pending: false,
            drained: false,
        })
    }

    pub fn current_mode(&self) -> RenderMode {
        self.mode
    }

    pub fn sample_count(&self) -> u32 {
        self.accumulator.sample_count()
    }

    pub fn instance_count(&self) -> Option<u32> {
        self.raytracer.instance_count()
    }

    pub fn reset_accumulation(&mut self) {
        self.accumulator.reset();
    }

    /// Caps progressive accumulation; `None` accumulates without bound. A
    /// changed cap restarts accumulation.
    pub fn set_max_frames(&mut self, max_frames: Option<u32>) {
        if self.accumulator.set_max_samples(max_frames) {
            self.accumulator.reset();
        }
    }

    pub fn setup_egui(
        &mut self,
        window: &Window,
        run_ui: &mut impl FnMut(&egui::Context),
    ) -> egui::FullOutput {
        let egui_raw_input = self.egui.state.take_egui_input(window);
        self.egui.state.egui_ctx().run(egui_raw_input, |ctx| run_ui(ctx))
    }

    pub fn resize(&mut self, new_size: &winit::dpi::PhysicalSize<u32>) {
        self.wgpu.resize(new_size);
        self.scene_target =
            Texture::create_scene_target(&self.wgpu.device, &self.wgpu.surface_config, "Scene Target");
        self.rasterizer.resize(&self.wgpu);
        self.raytracer.resize(
            &self.wgpu,
            new_size,
            &self.scene_target.view,
            self.frame_index,
            &mut self.retire,
        );
        self.post.rebind(&self.wgpu.device, &self.scene_target.view);
        self.accumulator.reset();
    }

    /// The frame protocol: skip when minimized, fold settings deltas into
    /// accumulation state, rebuild acceleration structures when the scene
    /// changed, run the mode-selected scene pass into the offscreen target,
    /// then tonemap and composite the UI into the swapchain image.
    pub fn render_frame(
        &mut self,
        window: &Window,
        window_size: &winit::dpi::PhysicalSize<u32>,
        scene: &mut Scene,
        settings: &FrameSettings,
        egui_output: egui::FullOutput,
    ) -> Result<(), RenderError> {
        // Zero-size surface: no GPU work at all.
        if window_size.width == 0 || window_size.height == 0 {
            return Ok(());
        }

        let geometry_dirty = scene.take_geometry_dirty();
        if geometry_dirty {
            self.accel_rebuild_pending = true;
            self.rasterizer
                .update_scene(&self.wgpu.device, scene, &self.hit_groups);
        }

        if needs_accumulation_reset(self.previous_settings.as_ref(), settings, geometry_dirty) {
            self.accumulator.reset();
        }
        self.mode = settings.mode;

        if self.accel_rebuild_pending {
            match self.raytracer.rebuild_scene(
                &self.wgpu.device,
                &self.wgpu.queue,
                scene,
                &self.hit_groups,
                self.frame_index,
                &mut self.retire,
                &self.scene_target.view,
            ) {
                Ok(()) => self.accel_rebuild_pending = false,
                // Recoverable per frame: raster path below, retry next frame.
                Err(error @ RenderError::BuildFailed(_)) => {
                    log::warn!("{error}; falling back to raster for this frame");
                }
                Err(error) => return Err(error),
            }
        }
        if !self.accel_rebuild_pending && self.raytracer.has_top_level() {
            debug_assert_eq!(self.raytracer.instance_count(), Some(scene.instance_count()));
        }

        self.rasterizer.update_frame(&self.wgpu.queue, settings);
        self.raytracer.update_camera(&self.wgpu.queue, &settings.camera);
        self.raytracer.update_light(&self.wgpu.queue, &settings.light);

        let surface_texture = match self.wgpu.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.wgpu.resize(window_size);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => return Ok(()),
            Err(wgpu::SurfaceError::OutOfMemory | wgpu::SurfaceError::Other) => {
                return Err(RenderError::DeviceLost)
            }
        };
        let surface_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .wgpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Command Encoder"),
            });

        let egui_primitives = self
            .egui
            .state
            .egui_ctx()
            .tessellate(egui_output.shapes, egui_output.pixels_per_point);
        let egui_screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.wgpu.surface_config.width, self.wgpu.surface_config.height],
            pixels_per_point: window.scale_factor() as f32,
        };
        for (id, image_delta) in egui_output.textures_delta.set {
            self.egui
                .renderer
                .update_texture(&self.wgpu.device, &self.wgpu.queue, id, &image_delta);
        }

        let width = self.wgpu.surface_config.width;
        let height = self.wgpu.surface_config.height;
        let ray_ready = self.raytracer.has_top_level() && !self.accel_rebuild_pending;
        match settings.mode {
            RenderMode::RayTrace if ray_ready => {
                if let Some(sample_index) = self.accumulator.begin_sample() {
                    self.raytracer.update_params(
                        &self.wgpu.queue,
                        settings.clear_color,
                        sample_index,
                        settings.max_ray_depth,
                        width,
                        height,
                    );
                    self.raytracer.dispatch(&mut encoder, width, height)?;
                }
                // Saturated: the converged offscreen image is re-presented.
            }
            RenderMode::RayTrace => {
                log::debug!("ray path unavailable, degrading to raster");
                self.rasterizer
                    .render(&mut encoder, &self.scene_target.view, settings.clear_color);
            }
            RenderMode::Raster => {
                self.rasterizer
                    .render(&mut encoder, &self.scene_target.view, settings.clear_color);
            }
        }

        self.post.render(&mut encoder, &surface_view);
        self.egui.render(
            &self.wgpu.device,
            &self.wgpu.queue,
            &mut encoder,
            &surface_view,
            &egui_primitives,
            &egui_screen_descriptor,
        );

        self.wgpu.queue.submit(Some(encoder.finish()));
        surface_texture.present();

        for id in egui_output.textures_delta.free {
            self.egui.renderer.free_texture(&id);
        }

        self.frame_index += 1;
        self.retire.collect(self.frame_index);
        self.previous_settings = Some(*settings);

        Ok(())
    }

    /// One global drain: waits for all in-flight GPU work, then releases the
    /// retired resources. Runs at most once; `Drop` falls back to it.
    pub fn shutdown(&mut self) {
        if self.drained {
            return;
        }
        let _ = self.wgpu.device.poll(wgpu::PollType::Wait);
        let freed = self.retire.flush();
        if freed > 0 {
            log::info!("released {freed} retired GPU buffers at shutdown");
        }
        self.drained = true;
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
