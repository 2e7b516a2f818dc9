use crate::{
    error::RenderError,
    rendering::{
        raytracer::sbt::HitGroupDesc,
        settings::{FrameSettings, LightSettings},
        wgpu::{compile_scope, render_pass, CameraBuffers, LightBuffers, Texture, WgpuExt,
            WgpuResources},
    },
    camera::CameraMatrices,
    mesh::Vertex,
    scene::Scene,
};

/// GPU-side instance entry for the raster path: world matrix plus the
/// resolved hit-group color.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct RasterInstance {
    world: [[f32; 4]; 4],
    color: [f32; 4],
}

impl Default for RasterInstance {
    fn default() -> Self {
        Self {
            world: maths::Mat4::IDENTITY.to_cols_array_2d(),
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

struct ModelBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

/// One instanced draw: all placed copies of one model, contiguous in the
/// instance buffer.
struct DrawBatch {
    model: usize,
    first_instance: u32,
    instance_count: u32,
}

/// Depth-tested scene pass into the shared offscreen target. Always
/// full-resolution single-sample; accumulation never applies here.
pub struct Rasterizer {
    camera_buffers: CameraBuffers,
    light_buffers: LightBuffers,
    frame_bind_group: wgpu::BindGroup,
    instance_bind_group_layout: wgpu::BindGroupLayout,
    instance_bind_group: wgpu::BindGroup,
    depth_texture: Texture,
    pipeline: wgpu::RenderPipeline,
    model_buffers: Vec<ModelBuffers>,
    draws: Vec<DrawBatch>,
}

impl Rasterizer {
    pub fn new(wgpu: &WgpuResources) -> Result<Self, RenderError> {
        let device = &wgpu.device;

        let frame_bind_group_layout = device
            .bind_group_layout()
            .label("Rasterizer Frame Bind Group Layout")
            .uniform(0, wgpu::ShaderStages::VERTEX)
            .uniform(1, wgpu::ShaderStages::FRAGMENT)
            .build();
        let instance_bind_group_layout = device
            .bind_group_layout()
            .label("Rasterizer Instance Bind Group Layout")
            .storage(0, wgpu::ShaderStages::VERTEX, true)
            .build();

        let pipeline_layout = device
            .pipeline_layout()
            .label("Rasterizer Pipeline Layout")
            .bind_group_layouts(&[&frame_bind_group_layout, &instance_bind_group_layout])
            .build();

        let pipeline = compile_scope(device, "raster", || {
            let shader = device
                .shader()
                .label("Rasterizer Shader")
                .wgsl(include_str!("../shaders/raster.wgsl"));
            device
                .render_pipeline()
                .label("Rasterizer Pipeline")
                .layout(&pipeline_layout)
                .vertex_shader(&shader, "vs_main")
                .fragment_shader(&shader, "fs_main")
                .vertex_buffer(Vertex::desc())
                .color_target_replace(Texture::SCENE_FORMAT)
                .cull_mode(Some(wgpu::Face::Back))
                .depth_test_less(Texture::DEPTH_FORMAT)
                .build()
                .expect("rasterizer pipeline is fully specified")
        })?;

        let camera_buffers = CameraBuffers::new(device, "Rasterizer");
        let light_buffers = LightBuffers::new(device, "Rasterizer");
        let frame_bind_group = device
            .bind_group(&frame_bind_group_layout)
            .label("Rasterizer Frame Bind Group")
            .buffer(0, &camera_buffers.view_projection)
            .buffer(1, &light_buffers.light)
            .build();

        let instance_buffer = device
            .buffer()
            .label("Rasterizer Instance Buffer")
            .storage(&[RasterInstance::default()]);
        let instance_bind_group = device
            .bind_group(&instance_bind_group_layout)
            .label("Rasterizer Instance Bind Group")
            .buffer(0, &instance_buffer)
            .build();

        let depth_texture =
            Texture::create_depth_texture(device, &wgpu.surface_config, "Rasterizer Depth Texture");

        Ok(Self {
            camera_buffers,
            light_buffers,
            frame_bind_group,
            instance_bind_group_layout,
            instance_bind_group,
            depth_texture,
            pipeline,
            model_buffers: Vec::new(),
            draws: Vec::new(),
        })
    }

    /// Mirrors the scene into GPU buffers: per-model vertex/index data for
    /// models seen for the first time, and a fresh instance buffer grouped by
    /// model so each batch draws one contiguous instance range.
    pub fn update_scene(
        &mut self,
        device: &wgpu::Device,
        scene: &Scene,
        hit_groups: &[HitGroupDesc],
    ) {
        for model in &scene.models()[self.model_buffers.len()..] {
            self.model_buffers.push(ModelBuffers {
                vertex: device
                    .buffer()
                    .label("Rasterizer Model Vertex Buffer")
                    .vertex(model.vertices()),
                index: device
                    .buffer()
                    .label("Rasterizer Model Index Buffer")
                    .index(model.indices()),
                index_count: model.indices().len() as u32,
            });
        }

        let mut instances = Vec::with_capacity(scene.instances().len());
        self.draws.clear();
        for model_index in 0..scene.models().len() {
            let first_instance = instances.len() as u32;
            for instance in scene.instances() {
                if instance.model.index() == model_index {
                    let color = hit_groups
                        .get(instance.hit_group as usize)
                        .map_or([1.0, 1.0, 1.0, 1.0], |group| group.base_color);
                    instances.push(RasterInstance {
                        world: instance.transform.to_cols_array_2d(),
                        color,
                    });
                }
            }

            let instance_count = instances.len() as u32 - first_instance;
            if instance_count > 0 {
                self.draws.push(DrawBatch {
                    model: model_index,
                    first_instance,
                    instance_count,
                });
            }
        }

        if instances.is_empty() {
            instances.push(RasterInstance::default());
        }
        let instance_buffer = device
            .buffer()
            .label("Rasterizer Instance Buffer")
            .storage(&instances);
        self.instance_bind_group = device
            .bind_group(&self.instance_bind_group_layout)
            .label("Rasterizer Instance Bind Group")
            .buffer(0, &instance_buffer)
            .build();
    }

    pub fn update_frame(&self, queue: &wgpu::Queue, settings: &FrameSettings) {
        self.update_camera(queue, &settings.camera);
        self.update_light(queue, &settings.light);
    }

    pub fn update_camera(&self, queue: &wgpu::Queue, matrices: &CameraMatrices) {
        self.camera_buffers.update(queue, matrices);
    }

    pub fn update_light(&self, queue: &wgpu::Queue, light: &LightSettings) {
        self.light_buffers.update(queue, light);
    }

    pub fn resize(&mut self, wgpu: &WgpuResources) {
        self.depth_texture = Texture::create_depth_texture(
            &wgpu.device,
            &wgpu.surface_config,
            "Rasterizer Depth Texture",
        );
    }

    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        scene_target: &wgpu::TextureView,
        clear_color: [f32; 4],
    ) {
        let mut rpass = render_pass(encoder)
            .label("Rasterizer Scene Pass")
            .color_attachment(
                scene_target,
                Some(wgpu::Color {
                    r: clear_color[0] as f64,
                    g: clear_color[1] as f64,
                    b: clear_color[2] as f64,
                    a: clear_color[3] as f64,
                }),
            )
            .depth_attachment(&self.depth_texture.view, Some(1.0))
            .begin();

        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.frame_bind_group, &[]);
        rpass.set_bind_group(1, &self.instance_bind_group, &[]);

        for batch in &self.draws {
            let model = &self.model_buffers[batch.model];
            rpass.set_vertex_buffer(0, model.vertex.slice(..));
            rpass.set_index_buffer(model.index.slice(..), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(
                0..model.index_count,
                0,
                batch.first_instance..batch.first_instance + batch.instance_count,
            );
        }
    }
}
