use std::{sync::Arc, time::Instant};

use maths::{Mat4, Vec3};
use winit::window::Window;

use crate::{
    camera::OrbitCamera,
    error::RenderError,
    rendering::{
        raytracer::{sbt::HitGroupDesc, MAX_RAY_DEPTH},
        FrameSettings, LightKind, LightSettings, RenderMode, Renderer,
    },
    scene::Scene,
    shapes,
};

const SCATTER_COUNT: usize = 2000;
const SCATTER_SEED: u64 = 20;

const HIT_GROUP_FLOOR: u32 = 0;
const HIT_GROUP_BODY: u32 = 1;
const HIT_GROUP_MIRROR: u32 = 2;

pub struct Engine {
    pub window: Arc<Window>,
    pub window_size: winit::dpi::PhysicalSize<u32>,
    pub renderer: Renderer,
    scene: Scene,
    camera: OrbitCamera,
    light: LightSettings,
    clear_color: [f32; 3],
    use_raytracer: bool,
    max_ray_depth: u32,
    limit_samples: bool,
    max_samples: u32,
    reset_requested: bool,
    stats: EngineStatistics,
}

impl Engine {
    pub async fn new(window: Arc<Window>) -> Result<Engine, RenderError> {
        let mut window_size = window.inner_size();
        window_size.width = window_size.width.max(1);
        window_size.height = window_size.height.max(1);

        let (scene, hit_groups) = build_demo_scene()?;

        let camera = {
            let mut camera = OrbitCamera::new(
                Vec3::new(0.0, 1.0, 0.0),
                9.0,
                window_size.width as f32 / window_size.height as f32,
            );
            camera.azimuth_deg = 45.0;
            camera.altitude_deg = 25.0;
            camera
        };

        let renderer = Renderer::new(window.clone(), &window_size, hit_groups).await?;
        log::info!(
            "scene ready: {} models, {} instances",
            scene.models().len(),
            scene.instance_count()
        );

        Ok(Self {
            window,
            window_size,
            renderer,
            scene,
            camera,
            light: LightSettings::default(),
            clear_color: [1.0, 1.0, 1.0],
            use_raytracer: true,
            max_ray_depth: 8,
            limit_samples: false,
            max_samples: 100,
            reset_requested: false,
            stats: EngineStatistics::default(),
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            self.window_size = new_size;
            return;
        }

        self.window_size = new_size;
        self.camera.aspect = new_size.width as f32 / new_size.height as f32;
        self.renderer.resize(&new_size);

        // On macOS the window needs to be redrawn manually after resizing
        #[cfg(target_os = "macos")]
        {
            self.window.request_redraw();
        }
    }

    pub fn render(&mut self) -> Result<(), RenderError> {
        let now = Instant::now();
        self.stats.delta_time = now
            .duration_since(self.stats.last_frame_time)
            .as_secs_f32();
        self.stats.last_frame_time = now;

        let delta_time_ms = self.stats.delta_time * 1000.0;
        let fps = if self.stats.delta_time > 0.0 {
            1.0 / self.stats.delta_time
        } else {
            0.0
        };
        let sample_count = self.renderer.sample_count();

        let mut clear_color = self.clear_color;
        let mut use_raytracer = self.use_raytracer;
        let mut light = self.light;
        let mut camera = self.camera.clone();
        let mut max_ray_depth = self.max_ray_depth;
        let mut limit_samples = self.limit_samples;
        let mut max_samples = self.max_samples;
        let mut reset_requested = self.reset_requested;

        let egui_output = self.renderer.setup_egui(&self.window, &mut |ctx| {
            egui::SidePanel::left("controls")
                .resizable(false)
                .show(ctx, |ui| {
                    ui.horizontal(|ui| {
                        ui.label("Clear color");
                        ui.color_edit_button_rgb(&mut clear_color);
                    });
                    ui.checkbox(&mut use_raytracer, "Ray tracer mode");

                    ui.collapsing("Light", |ui| {
                        ui.horizontal(|ui| {
                            ui.radio_value(&mut light.kind, LightKind::Point, "Point");
                            ui.radio_value(&mut light.kind, LightKind::Infinite, "Infinite");
                        });
                        ui.add(egui::Slider::new(&mut light.position.x, -20.0..=20.0).text("X"));
                        ui.add(egui::Slider::new(&mut light.position.y, 0.0..=30.0).text("Y"));
                        ui.add(egui::Slider::new(&mut light.position.z, -20.0..=20.0).text("Z"));
                        ui.add(
                            egui::Slider::new(&mut light.intensity, 0.0..=150.0).text("Intensity"),
                        );
                    });

                    ui.collapsing("Camera", |ui| {
                        ui.add(
                            egui::Slider::new(&mut camera.azimuth_deg, 0.0..=360.0)
                                .text("Azimuth"),
                        );
                        ui.add(
                            egui::Slider::new(&mut camera.altitude_deg, -85.0..=85.0)
                                .text("Altitude"),
                        );
                        ui.add(
                            egui::Slider::new(&mut camera.distance, 2.0..=60.0).text("Distance"),
                        );
                    });

                    ui.collapsing("Ray tracing", |ui| {
                        ui.add(
                            egui::Slider::new(&mut max_ray_depth, 1..=MAX_RAY_DEPTH)
                                .text("Max depth"),
                        );
                        ui.checkbox(&mut limit_samples, "Limit samples");
                        if limit_samples {
                            ui.add(
                                egui::Slider::new(&mut max_samples, 1..=1000)
                                    .text("Max samples"),
                            );
                        }
                        if ui.button("Restart accumulation").clicked() {
                            reset_requested = true;
                        }
                    });

                    ui.separator();
                    ui.label(format!("Frame time: {delta_time_ms:.2} ms ({fps:.1} FPS)"));
                    if use_raytracer {
                        ui.label(format!("Accumulated samples: {sample_count}"));
                    }
                });
        });

        self.clear_color = clear_color;
        self.use_raytracer = use_raytracer;
        self.light = light;
        self.camera = camera;
        self.max_ray_depth = max_ray_depth;
        self.limit_samples = limit_samples;
        self.max_samples = max_samples;
        self.reset_requested = reset_requested;

        self.renderer.set_max_frames(if self.limit_samples {
            Some(self.max_samples)
        } else {
            None
        });

        let settings = FrameSettings {
            camera: self.camera.matrices(),
            light: self.light,
            mode: if self.use_raytracer {
                RenderMode::RayTrace
            } else {
                RenderMode::Raster
            },
            clear_color: [clear_color[0], clear_color[1], clear_color[2], 1.0],
            max_ray_depth: self.max_ray_depth,
            reset_requested: std::mem::take(&mut self.reset_requested),
        };

        self.renderer.render_frame(
            &self.window,
            &self.window_size,
            &mut self.scene,
            &settings,
            egui_output,
        )
    }
}

/// A floor, a mirror sphere, a few cubes and a scattered field of small
/// cubes; enough structure to exercise every hit group and the instanced
/// top-level rebuild path.
fn build_demo_scene() -> Result<(Scene, Vec<HitGroupDesc>), RenderError> {
    let hit_groups = vec![
        HitGroupDesc {
            base_color: [0.75, 0.75, 0.78, 1.0],
            reflectance: 0.0,
        },
        HitGroupDesc {
            base_color: [0.82, 0.33, 0.18, 1.0],
            reflectance: 0.0,
        },
        HitGroupDesc {
            base_color: [0.92, 0.92, 0.95, 1.0],
            reflectance: 0.65,
        },
    ];

    let mut scene = Scene::new();

    let (floor_vertices, floor_indices) = shapes::plane(14.0);
    let floor = scene.add_model(floor_vertices, floor_indices, None)?;
    scene.add_instance_with_hit_group(floor, Mat4::IDENTITY, HIT_GROUP_FLOOR)?;

    let (sphere_vertices, sphere_indices) = shapes::sphere(1.0, 24, 32);
    let sphere = scene.add_model(sphere_vertices, sphere_indices, None)?;
    scene.add_instance_with_hit_group(
        sphere,
        Mat4::from_translation(Vec3::new(0.0, 1.5, 0.0)) * Mat4::from_scale(Vec3::splat(1.5)),
        HIT_GROUP_MIRROR,
    )?;

    let (cube_vertices, cube_indices) = shapes::cube(0.5);
    let cube = scene.add_model(cube_vertices, cube_indices, None)?;
    scene.add_instance_with_hit_group(
        cube,
        Mat4::from_translation(Vec3::new(3.0, 0.5, -1.0)),
        HIT_GROUP_BODY,
    )?;
    scene.add_instance_with_hit_group(
        cube,
        Mat4::from_translation(Vec3::new(-2.5, 0.75, 1.0))
            * Mat4::from_rotation_y(0.6)
            * Mat4::from_scale(Vec3::splat(1.5)),
        HIT_GROUP_BODY,
    )?;

    for transform in shapes::scatter_transforms(SCATTER_COUNT, SCATTER_SEED) {
        scene.add_instance_with_hit_group(cube, transform, HIT_GROUP_BODY)?;
    }

    Ok((scene, hit_groups))
}

pub struct EngineStatistics {
    pub last_frame_time: Instant,
    pub delta_time: f32,
}

impl Default for EngineStatistics {
    fn default() -> Self {
        Self {
            last_frame_time: Instant::now(),
            delta_time: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_scene_places_the_scattered_field() {
        let (scene, hit_groups) = build_demo_scene().unwrap();
        assert_eq!(scene.models().len(), 3);
        assert_eq!(scene.instance_count() as usize, 4 + SCATTER_COUNT);
        assert!(scene
            .instances()
            .iter()
            .all(|instance| (instance.hit_group as usize) < hit_groups.len()));
    }
}
