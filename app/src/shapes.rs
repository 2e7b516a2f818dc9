use maths::{Mat4, Vec3};

use crate::mesh::Vertex;

/// Horizontal quad in the XZ plane at y = 0, facing +Y, `half_extent` from
/// center to edge.
pub fn plane(half_extent: f32) -> (Vec<Vertex>, Vec<u32>) {
    let e = half_extent;
    let vertices = vec![
        Vertex::new(Vec3::new(-e, 0.0, -e), Vec3::Y, [0.0, 0.0]),
        Vertex::new(Vec3::new(e, 0.0, -e), Vec3::Y, [1.0, 0.0]),
        Vertex::new(Vec3::new(e, 0.0, e), Vec3::Y, [1.0, 1.0]),
        Vertex::new(Vec3::new(-e, 0.0, e), Vec3::Y, [0.0, 1.0]),
    ];
    let indices = vec![0, 2, 1, 0, 3, 2];

    (vertices, indices)
}

/// Axis-aligned cube with per-face normals, `half_extent` from center to
/// face.
pub fn cube(half_extent: f32) -> (Vec<Vertex>, Vec<u32>) {
    let e = half_extent;
    // (normal, four corners counter-clockwise seen from outside)
    let faces: [(Vec3, [Vec3; 4]); 6] = [
        (
            Vec3::X,
            [
                Vec3::new(e, -e, -e),
                Vec3::new(e, e, -e),
                Vec3::new(e, e, e),
                Vec3::new(e, -e, e),
            ],
        ),
        (
            -Vec3::X,
            [
                Vec3::new(-e, -e, e),
                Vec3::new(-e, e, e),
                Vec3::new(-e, e, -e),
                Vec3::new(-e, -e, -e),
            ],
        ),
        (
            Vec3::Y,
            [
                Vec3::new(-e, e, -e),
                Vec3::new(-e, e, e),
                Vec3::new(e, e, e),
                Vec3::new(e, e, -e),
            ],
        ),
        (
            -Vec3::Y,
            [
                Vec3::new(-e, -e, e),
                Vec3::new(-e, -e, -e),
                Vec3::new(e, -e, -e),
                Vec3::new(e, -e, e),
            ],
        ),
        (
            Vec3::Z,
            [
                Vec3::new(-e, -e, e),
                Vec3::new(e, -e, e),
                Vec3::new(e, e, e),
                Vec3::new(-e, e, e),
            ],
        ),
        (
            -Vec3::Z,
            [
                Vec3::new(e, -e, -e),
                Vec3::new(-e, -e, -e),
                Vec3::new(-e, e, -e),
                Vec3::new(e, e, -e),
            ],
        ),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, corners) in faces {
        let base = vertices.len() as u32;
        let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        for (corner, uv) in corners.into_iter().zip(uvs) {
            vertices.push(Vertex::new(corner, normal, uv));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (vertices, indices)
}

/// Latitude/longitude sphere.
pub fn sphere(radius: f32, stacks: u32, slices: u32) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for stack in 0..=stacks {
        let v = stack as f32 / stacks as f32;
        let phi = v * std::f32::consts::PI;
        for slice in 0..=slices {
            let u = slice as f32 / slices as f32;
            let theta = u * std::f32::consts::TAU;

            let normal = Vec3::new(
                phi.sin() * theta.cos(),
                phi.cos(),
                phi.sin() * theta.sin(),
            );
            vertices.push(Vertex::new(normal * radius, normal, [u, v]));
        }
    }

    let ring = slices + 1;
    for stack in 0..stacks {
        for slice in 0..slices {
            let a = stack * ring + slice;
            let b = a + ring;
            indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
        }
    }

    (vertices, indices)
}

/// Small deterministic PRNG for scene scattering; keeps the demo
/// reproducible without pulling in a random number crate.
pub struct XorShift {
    state: u64,
}

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Approximately normal via the sum of twelve uniforms.
    pub fn normal(&mut self, mean: f32, std_dev: f32) -> f32 {
        let mut sum = 0.0;
        for _ in 0..12 {
            sum += self.next_f32();
        }
        mean + (sum - 6.0) * std_dev
    }
}

/// World transforms for a field of scattered instances, loosely clustered
/// around the origin with randomized uniform scale.
pub fn scatter_transforms(count: usize, seed: u64) -> Vec<Mat4> {
    let mut rng = XorShift::new(seed);
    let mut transforms = Vec::with_capacity(count);
    for _ in 0..count {
        let translation = Vec3::new(rng.normal(2.0, 2.0), 0.5, rng.normal(2.0, 2.0) + 6.0);
        let scale = rng.normal(0.5, 0.2).abs().max(0.05);
        let rotation = rng.next_f32() * std::f32::consts::TAU;
        transforms.push(
            Mat4::from_translation(translation)
                * Mat4::from_rotation_y(rotation)
                * Mat4::from_scale(Vec3::splat(scale)),
        );
    }

    transforms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Model;

    #[test]
    fn shapes_produce_valid_models() {
        for (vertices, indices) in [plane(0.5), cube(0.5), sphere(1.0, 8, 12)] {
            Model::new(vertices, indices).expect("shape should validate");
        }
    }

    #[test]
    fn sphere_vertices_sit_on_the_radius() {
        let (vertices, _) = sphere(2.0, 6, 6);
        for vertex in vertices {
            assert!((vertex.position_vec3().length() - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn scatter_is_deterministic_per_seed() {
        let a = scatter_transforms(16, 7);
        let b = scatter_transforms(16, 7);
        let c = scatter_transforms(16, 8);
        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn xorshift_stays_in_unit_interval() {
        let mut rng = XorShift::new(42);
        for _ in 0..1000 {
            let x = rng.next_f32();
            assert!((0.0..1.0).contains(&x));
        }
    }
}
