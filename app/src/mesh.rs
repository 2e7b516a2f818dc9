use std::mem::size_of;

use maths::{Aabb, Vec3};

use crate::error::RenderError;

/// Interleaved vertex as loaders hand it to the geometry store.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2
    ];

    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv,
        }
    }

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }

    pub fn position_vec3(&self) -> Vec3 {
        Vec3::from_array(&self.position)
    }
}

/// Immutable triangle geometry. Created once at load time, owned by the
/// scene, never mutated afterwards.
#[derive(Debug)]
pub struct Model {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    bounds: Aabb,
}

impl Model {
    /// Validates the raw buffers; rejects anything that would index out of
    /// range before it ever reaches the GPU layer.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Result<Self, RenderError> {
        if vertices.is_empty() {
            return Err(RenderError::InvalidGeometry(
                "model has no vertices".to_string(),
            ));
        }
        if indices.is_empty() {
            return Err(RenderError::InvalidGeometry(
                "model has no indices".to_string(),
            ));
        }
        if indices.len() % 3 != 0 {
            return Err(RenderError::InvalidGeometry(format!(
                "index count {} is not a multiple of 3",
                indices.len()
            )));
        }
        if let Some(&out_of_range) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(RenderError::InvalidGeometry(format!(
                "index {out_of_range} out of range for {} vertices",
                vertices.len()
            )));
        }

        let bounds = Aabb::from_points(vertices.iter().map(Vertex::position_vec3));

        Ok(Self {
            vertices,
            indices,
            bounds,
        })
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri_vertices() -> Vec<Vertex> {
        vec![
            Vertex::new(Vec3::ZERO, Vec3::Y, [0.0, 0.0]),
            Vertex::new(Vec3::X, Vec3::Y, [1.0, 0.0]),
            Vertex::new(Vec3::Z, Vec3::Y, [0.0, 1.0]),
        ]
    }

    #[test]
    fn valid_model_reports_bounds_and_triangles() {
        let model = Model::new(tri_vertices(), vec![0, 1, 2]).unwrap();
        assert_eq!(model.triangle_count(), 1);
        assert_eq!(model.bounds().min, Vec3::ZERO);
        assert_eq!(model.bounds().max, Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn rejects_empty_buffers() {
        assert!(matches!(
            Model::new(Vec::new(), vec![0, 1, 2]),
            Err(RenderError::InvalidGeometry(_))
        ));
        assert!(matches!(
            Model::new(tri_vertices(), Vec::new()),
            Err(RenderError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn rejects_partial_triangles_and_bad_indices() {
        assert!(matches!(
            Model::new(tri_vertices(), vec![0, 1]),
            Err(RenderError::InvalidGeometry(_))
        ));
        assert!(matches!(
            Model::new(tri_vertices(), vec![0, 1, 3]),
            Err(RenderError::InvalidGeometry(_))
        ));
    }
}
