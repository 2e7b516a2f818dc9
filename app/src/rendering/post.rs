use crate::{
    error::RenderError,
    rendering::wgpu::{compile_scope, render_pass, QueueExt, WgpuExt, WgpuResources},
};

/// Tonemapping pass: fullscreen triangle reading the offscreen scene target
/// into the swapchain image. The UI layer composites on top of the same
/// target afterwards.
pub struct PostPass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    params: wgpu::Buffer,
}

impl PostPass {
    pub fn new(
        wgpu: &WgpuResources,
        scene_target: &wgpu::TextureView,
    ) -> Result<Self, RenderError> {
        let device = &wgpu.device;

        let bind_group_layout = device
            .bind_group_layout()
            .label("Post Bind Group Layout")
            .texture_2d(0, wgpu::ShaderStages::FRAGMENT)
            .sampler(1, wgpu::ShaderStages::FRAGMENT)
            .uniform(2, wgpu::ShaderStages::FRAGMENT)
            .build();
        let pipeline_layout = device
            .pipeline_layout()
            .label("Post Pipeline Layout")
            .bind_group_layout(&bind_group_layout)
            .build();

        let pipeline = compile_scope(device, "post", || {
            let shader = device
                .shader()
                .label("Post Shader")
                .wgsl(include_str!("../shaders/post.wgsl"));
            device
                .render_pipeline()
                .label("Post Pipeline")
                .layout(&pipeline_layout)
                .vertex_shader(&shader, "vs_main")
                .fragment_shader(&shader, "fs_main")
                .color_target_replace(wgpu.surface_format())
                .build()
                .expect("post pipeline is fully specified")
        })?;

        // An sRGB swapchain applies the transfer function; anything else gets
        // shader-side gamma.
        let inv_gamma: [f32; 4] = if wgpu.surface_format().is_srgb() {
            [1.0, 0.0, 0.0, 0.0]
        } else {
            [1.0 / 2.2, 0.0, 0.0, 0.0]
        };
        let params = device
            .buffer()
            .label("Post Params Buffer")
            .uniform(&inv_gamma);

        let sampler = device
            .sampler()
            .label("Post Sampler")
            .clamp()
            .filter(wgpu::FilterMode::Linear)
            .build();

        let bind_group = Self::create_bind_group(
            device,
            &bind_group_layout,
            scene_target,
            &sampler,
            &params,
        );

        Ok(Self {
            pipeline,
            bind_group_layout,
            bind_group,
            sampler,
            params,
        })
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        scene_target: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        params: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device
            .bind_group(layout)
            .label("Post Bind Group")
            .texture(0, scene_target)
            .sampler(1, sampler)
            .buffer(2, params)
            .build()
    }

    /// Rebinds after the offscreen target was recreated on resize.
    pub fn rebind(&mut self, device: &wgpu::Device, scene_target: &wgpu::TextureView) {
        self.bind_group = Self::create_bind_group(
            device,
            &self.bind_group_layout,
            scene_target,
            &self.sampler,
            &self.params,
        );
    }

    pub fn set_inv_gamma(&self, queue: &wgpu::Queue, inv_gamma: f32) {
        queue.write_buffer_data(&self.params, 0, &[inv_gamma, 0.0, 0.0, 0.0]);
    }

    pub fn render(&self, encoder: &mut wgpu::CommandEncoder, surface_view: &wgpu::TextureView) {
        let mut rpass = render_pass(encoder)
            .label("Post Pass")
            .color_attachment(surface_view, Some(wgpu::Color::BLACK))
            .begin();

        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
}
