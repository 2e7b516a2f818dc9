use std::sync::Arc;
use winit::window::Window;

use super::WgpuExt;

/// Everything the renderer needs from the GPU device layer.
pub struct WgpuResources {
    pub instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface_config: wgpu::SurfaceConfiguration,
}

impl WgpuResources {
    pub async fn new(window: Arc<Window>, window_size: &winit::dpi::PhysicalSize<u32>) -> Self {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).unwrap();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                // Request an adapter which can render to our surface
                compatible_surface: Some(&surface),
            })
            .await
            .expect("Failed to find an appropriate adapter");

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::FLOAT32_FILTERABLE,
                // Use the adapter's resolution limits so offscreen targets can
                // match the swapchain at any window size; the two-level
                // traversal binds more storage buffers than the default cap.
                required_limits: {
                    let mut limits = wgpu::Limits::default().using_resolution(adapter.limits());
                    limits.max_storage_buffers_per_shader_stage =
                        limits.max_storage_buffers_per_shader_stage.max(12);
                    limits
                },
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::default(),
            })
            .await
            .expect("Failed to create device");

        let surface_config = surface
            .get_default_config(&adapter, window_size.width.max(1), window_size.height.max(1))
            .expect("Failed to get default surface configuration");
        surface.configure(&device, &surface_config);

        Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
        }
    }

    pub fn resize(&mut self, new_size: &winit::dpi::PhysicalSize<u32>) {
        self.surface_config.width = new_size.width.max(1);
        self.surface_config.height = new_size.height.max(1);
        self.surface.configure(&self.device, &self.surface_config);
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }
}

pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl Texture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
    pub const SCENE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

    pub fn create_depth_texture(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        label: &str,
    ) -> Self {
        let texture = device
            .texture()
            .label(label)
            .size_2d(config.width.max(1), config.height.max(1))
            .depth_buffer()
            .build();
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self { texture, view }
    }

    /// The shared offscreen color target both scene paths write into and the
    /// post pass reads from.
    pub fn create_scene_target(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        label: &str,
    ) -> Self {
        let texture = device
            .texture()
            .label(label)
            .size_2d(config.width.max(1), config.height.max(1))
            .scene_target()
            .build();
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self { texture, view }
    }
}
