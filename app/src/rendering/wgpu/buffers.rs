use crate::{camera::CameraMatrices, rendering::settings::LightSettings};

use super::{QueueExt, WgpuExt};

const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Per-frame camera uniforms. The raster path consumes the view-projection,
/// the ray dispatch reconstructs rays from camera-to-world and the inverse
/// projection.
pub struct CameraBuffers {
    pub view_projection: wgpu::Buffer,
    pub camera_to_world: wgpu::Buffer,
    pub camera_inverse_projection: wgpu::Buffer,
}

impl CameraBuffers {
    pub fn new(device: &wgpu::Device, label_prefix: &str) -> Self {
        let view_projection = device
            .buffer()
            .label(&format!("{label_prefix} View Projection Buffer"))
            .uniform(&IDENTITY);
        let camera_to_world = device
            .buffer()
            .label(&format!("{label_prefix} Camera To World Buffer"))
            .uniform(&IDENTITY);
        let camera_inverse_projection = device
            .buffer()
            .label(&format!("{label_prefix} Camera Inverse Projection Buffer"))
            .uniform(&IDENTITY);

        Self {
            view_projection,
            camera_to_world,
            camera_inverse_projection,
        }
    }

    pub fn update(&self, queue: &wgpu::Queue, matrices: &CameraMatrices) {
        queue.write_buffer_data(
            &self.view_projection,
            0,
            &matrices.view_projection.to_cols_array_2d(),
        );
        queue.write_buffer_data(
            &self.camera_to_world,
            0,
            &matrices.camera_to_world.to_cols_array_2d(),
        );
        queue.write_buffer_data(
            &self.camera_inverse_projection,
            0,
            &matrices.camera_inverse_projection.to_cols_array_2d(),
        );
    }
}

/// GPU mirror of `LightSettings`; one light, point or infinite.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    pub position: [f32; 3],
    pub intensity: f32,
    pub kind: u32,
    pub _padding: [u32; 3],
}

impl From<&LightSettings> for LightUniform {
    fn from(light: &LightSettings) -> Self {
        Self {
            position: light.position.to_array(),
            intensity: light.intensity,
            kind: light.kind.as_index(),
            _padding: [0; 3],
        }
    }
}

pub struct LightBuffers {
    pub light: wgpu::Buffer,
}

impl LightBuffers {
    pub fn new(device: &wgpu::Device, label_prefix: &str) -> Self {
        let light = device
            .buffer()
            .label(&format!("{label_prefix} Light Buffer"))
            .uniform(&LightUniform::from(&LightSettings::default()));

        Self { light }
    }

    pub fn update(&self, queue: &wgpu::Queue, settings: &LightSettings) {
        queue.write_buffer_data(&self.light, 0, &LightUniform::from(settings));
    }
}
