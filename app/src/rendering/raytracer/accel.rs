use std::mem::size_of;

use maths::Aabb;

use crate::{
    error::RenderError,
    mesh::Model,
    scene::Instance,
};

use super::bvh::{self, Bvh, BvhNode};

/// Vertex layout the tracer consumes: positions and normals in object space,
/// padded to vec4 for storage-buffer alignment.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RtVertex {
    pub position: [f32; 4],
    pub normal: [f32; 4],
}

impl RtVertex {
    fn from_mesh_vertex(vertex: &crate::mesh::Vertex) -> Self {
        Self {
            position: [vertex.position[0], vertex.position[1], vertex.position[2], 1.0],
            normal: [vertex.normal[0], vertex.normal[1], vertex.normal[2], 0.0],
        }
    }
}

/// Where one bottom-level structure lives inside the aggregated buffers.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlasInfo {
    pub node_offset: u32,
    pub node_count: u32,
    pub primitive_offset: u32,
    pub primitive_count: u32,
    pub vertex_offset: u32,
    pub index_offset: u32,
    pub _padding: [u32; 2],
}

/// Per-instance entry of the top-level structure. `sbt_record_offset` is the
/// hit-group index the binding table resolves against its hit region.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRecord {
    pub world: [[f32; 4]; 4],
    pub inverse_world: [[f32; 4]; 4],
    pub blas_index: u32,
    pub sbt_record_offset: u32,
    pub _padding: [u32; 2],
}

impl Default for InstanceRecord {
    fn default() -> Self {
        let identity = maths::Mat4::IDENTITY.to_cols_array_2d();
        Self {
            world: identity,
            inverse_world: identity,
            blas_index: 0,
            sbt_record_offset: 0,
            _padding: [0; 2],
        }
    }
}

/// Bottom-level structure: a triangle BVH over one model, in object space.
/// Immutable after build; reused by every instance of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct BlasData {
    pub bvh: Bvh,
    pub vertices: Vec<RtVertex>,
    pub indices: Vec<u32>,
    pub bounds: Aabb,
}

/// Top-level structure: a BVH over world-space instance bounds plus the
/// instance records its leaves resolve to.
#[derive(Debug, Clone, PartialEq)]
pub struct TlasData {
    pub bvh: Bvh,
    pub records: Vec<InstanceRecord>,
}

impl TlasData {
    pub fn instance_count(&self) -> u32 {
        self.records.len() as u32
    }
}

/// All bottom-level structures packed into contiguous arrays, addressed
/// through `BlasInfo` records, ready for upload as storage buffers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GeometryPack {
    pub vertices: Vec<RtVertex>,
    pub indices: Vec<u32>,
    pub nodes: Vec<BvhNode>,
    pub primitive_indices: Vec<u32>,
    pub infos: Vec<BlasInfo>,
}

/// The slice of device limits the builder validates against.
#[derive(Debug, Clone, Copy)]
pub struct BuildLimits {
    pub max_buffer_size: u64,
}

impl From<&wgpu::Limits> for BuildLimits {
    fn from(limits: &wgpu::Limits) -> Self {
        Self {
            max_buffer_size: limits.max_buffer_size,
        }
    }
}

pub struct AccelerationStructureBuilder {
    limits: BuildLimits,
}

impl AccelerationStructureBuilder {
    pub fn new(limits: BuildLimits) -> Self {
        Self { limits }
    }

    /// One build per unique model; independent of every other model.
    pub fn build_bottom_level(&self, model: &Model) -> Result<BlasData, RenderError> {
        let vertices: Vec<RtVertex> = model.vertices().iter().map(RtVertex::from_mesh_vertex).collect();
        let indices = model.indices().to_vec();

        let triangle_bounds: Vec<Aabb> = (0..model.triangle_count() as usize)
            .map(|triangle| {
                let base = triangle * 3;
                Aabb::from_points([
                    vertex_position(&vertices, indices[base]),
                    vertex_position(&vertices, indices[base + 1]),
                    vertex_position(&vertices, indices[base + 2]),
                ])
            })
            .collect();

        let bvh = bvh::build(&triangle_bounds);

        self.check_size("bottom-level nodes", byte_len::<BvhNode>(bvh.nodes.len()))?;
        self.check_size("bottom-level vertices", byte_len::<RtVertex>(vertices.len()))?;

        Ok(BlasData {
            bvh,
            vertices,
            indices,
            bounds: model.bounds(),
        })
    }

    /// Combines each instance's transform with its model's bottom-level
    /// structure. Every referenced bottom level must already be built; the
    /// instance order of the records matches the input order.
    pub fn build_top_level(
        &self,
        instances: &[Instance],
        bottom_levels: &[BlasData],
        hit_group_count: u32,
    ) -> Result<TlasData, RenderError> {
        let mut world_bounds = Vec::with_capacity(instances.len());
        let mut records = Vec::with_capacity(instances.len());

        for instance in instances {
            let blas_index = instance.model.index();
            let blas = bottom_levels.get(blas_index).ok_or_else(|| {
                RenderError::BuildFailed(format!(
                    "top-level references model {blas_index} with no bottom-level structure"
                ))
            })?;
            if instance.hit_group >= hit_group_count {
                return Err(RenderError::InvalidGeometry(format!(
                    "instance hit group {} out of range ({hit_group_count} groups)",
                    instance.hit_group
                )));
            }

            world_bounds.push(blas.bounds.transform(instance.transform));
            records.push(InstanceRecord {
                world: instance.transform.to_cols_array_2d(),
                inverse_world: instance.transform.inverse().to_cols_array_2d(),
                blas_index: blas_index as u32,
                sbt_record_offset: instance.hit_group,
                _padding: [0; 2],
            });
        }

        let bvh = bvh::build(&world_bounds);
        self.check_size("top-level nodes", byte_len::<BvhNode>(bvh.nodes.len()))?;
        self.check_size("top-level instances", byte_len::<InstanceRecord>(records.len()))?;

        Ok(TlasData { bvh, records })
    }

    /// Aggregates every bottom level into the offset-addressed arrays the
    /// dispatch consumes.
    pub fn pack_geometry(&self, bottom_levels: &[BlasData]) -> Result<GeometryPack, RenderError> {
        let mut pack = GeometryPack::default();
        for blas in bottom_levels {
            pack.infos.push(BlasInfo {
                node_offset: pack.nodes.len() as u32,
                node_count: blas.bvh.nodes.len() as u32,
                primitive_offset: pack.primitive_indices.len() as u32,
                primitive_count: blas.bvh.primitive_indices.len() as u32,
                vertex_offset: pack.vertices.len() as u32,
                index_offset: pack.indices.len() as u32,
                _padding: [0; 2],
            });
            pack.nodes.extend_from_slice(&blas.bvh.nodes);
            pack.primitive_indices.extend_from_slice(&blas.bvh.primitive_indices);
            pack.vertices.extend_from_slice(&blas.vertices);
            pack.indices.extend_from_slice(&blas.indices);
        }

        self.check_size("packed nodes", byte_len::<BvhNode>(pack.nodes.len()))?;
        self.check_size("packed vertices", byte_len::<RtVertex>(pack.vertices.len()))?;
        self.check_size("packed indices", byte_len::<u32>(pack.indices.len()))?;

        Ok(pack)
    }

    fn check_size(&self, what: &str, bytes: u64) -> Result<(), RenderError> {
        if bytes > self.limits.max_buffer_size {
            return Err(RenderError::BuildFailed(format!(
                "{what} need {bytes} bytes, device limit is {}",
                self.limits.max_buffer_size
            )));
        }
        Ok(())
    }
}

fn byte_len<T>(count: usize) -> u64 {
    (count * size_of::<T>()) as u64
}

fn vertex_position(vertices: &[RtVertex], index: u32) -> maths::Vec3 {
    let p = vertices[index as usize].position;
    maths::Vec3::new(p[0], p[1], p[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        scene::Scene,
        shapes,
    };
    use maths::{Mat4, Vec3};

    fn big_limits() -> BuildLimits {
        BuildLimits {
            max_buffer_size: 256 << 20,
        }
    }

    fn quad_scene() -> (Scene, crate::scene::ModelHandle) {
        let mut scene = Scene::new();
        let (vertices, indices) = shapes::plane(0.5);
        let model = scene.add_model(vertices, indices, None).unwrap();
        (scene, model)
    }

    #[test]
    fn single_identity_instance_counts_one() {
        let (mut scene, model) = quad_scene();
        scene.add_instance(model, Mat4::IDENTITY).unwrap();

        let builder = AccelerationStructureBuilder::new(big_limits());
        let blas = builder.build_bottom_level(scene.model(model)).unwrap();
        let tlas = builder
            .build_top_level(scene.instances(), &[blas], 1)
            .unwrap();

        assert_eq!(tlas.instance_count(), 1);
        assert_eq!(tlas.records[0].blas_index, 0);
    }

    #[test]
    fn scattered_field_counts_all_instances() {
        let (mut scene, model) = quad_scene();
        scene.add_instance(model, Mat4::IDENTITY).unwrap();
        for transform in shapes::scatter_transforms(2000, 11) {
            scene.add_instance(model, transform).unwrap();
        }

        let builder = AccelerationStructureBuilder::new(big_limits());
        let blas = builder.build_bottom_level(scene.model(model)).unwrap();
        let blases = vec![blas];
        let tlas = builder
            .build_top_level(scene.instances(), &blases, 1)
            .unwrap();

        assert_eq!(tlas.instance_count(), 2001);
        // Top-level growth stays linear in the instance count; no
        // per-instance bottom-level work is repeated.
        assert!(tlas.bvh.nodes.len() <= 2 * 2001);
        assert_eq!(blases.len(), 1);
    }

    #[test]
    fn rebuild_with_same_input_is_idempotent() {
        let (mut scene, model) = quad_scene();
        for transform in shapes::scatter_transforms(50, 3) {
            scene.add_instance(model, transform).unwrap();
        }

        let builder = AccelerationStructureBuilder::new(big_limits());
        let blas = builder.build_bottom_level(scene.model(model)).unwrap();
        let first = builder
            .build_top_level(scene.instances(), std::slice::from_ref(&blas), 1)
            .unwrap();
        let second = builder
            .build_top_level(scene.instances(), std::slice::from_ref(&blas), 1)
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn rebuild_tracks_instance_list_changes() {
        let (mut scene, model) = quad_scene();
        scene.add_instance(model, Mat4::IDENTITY).unwrap();

        let builder = AccelerationStructureBuilder::new(big_limits());
        let blas = builder.build_bottom_level(scene.model(model)).unwrap();
        let before = builder
            .build_top_level(scene.instances(), std::slice::from_ref(&blas), 1)
            .unwrap();
        assert_eq!(before.instance_count(), 1);

        scene
            .add_instance(model, Mat4::from_translation(Vec3::X))
            .unwrap();
        let after = builder
            .build_top_level(scene.instances(), std::slice::from_ref(&blas), 1)
            .unwrap();
        assert_eq!(after.instance_count(), 2);
    }

    #[test]
    fn device_limit_overflow_is_build_failed() {
        let (mut scene, model) = quad_scene();
        scene.add_instance(model, Mat4::IDENTITY).unwrap();

        let builder = AccelerationStructureBuilder::new(BuildLimits { max_buffer_size: 16 });
        assert!(matches!(
            builder.build_bottom_level(scene.model(model)),
            Err(RenderError::BuildFailed(_))
        ));
    }

    #[test]
    fn missing_bottom_level_is_build_failed() {
        let (mut scene, model) = quad_scene();
        scene.add_instance(model, Mat4::IDENTITY).unwrap();

        let builder = AccelerationStructureBuilder::new(big_limits());
        assert!(matches!(
            builder.build_top_level(scene.instances(), &[], 1),
            Err(RenderError::BuildFailed(_))
        ));
    }

    #[test]
    fn out_of_range_hit_group_is_rejected() {
        let (mut scene, model) = quad_scene();
        scene
            .add_instance_with_hit_group(model, Mat4::IDENTITY, 3)
            .unwrap();

        let builder = AccelerationStructureBuilder::new(big_limits());
        let blas = builder.build_bottom_level(scene.model(model)).unwrap();
        assert!(matches!(
            builder.build_top_level(scene.instances(), &[blas], 1),
            Err(RenderError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn pack_offsets_chain_across_models() {
        let mut scene = Scene::new();
        let (pv, pi) = shapes::plane(1.0);
        let plane = scene.add_model(pv, pi, None).unwrap();
        let (cv, ci) = shapes::cube(0.5);
        let cube = scene.add_model(cv, ci, None).unwrap();

        let builder = AccelerationStructureBuilder::new(big_limits());
        let blases = vec![
            builder.build_bottom_level(scene.model(plane)).unwrap(),
            builder.build_bottom_level(scene.model(cube)).unwrap(),
        ];
        let pack = builder.pack_geometry(&blases).unwrap();

        assert_eq!(pack.infos.len(), 2);
        assert_eq!(pack.infos[0].vertex_offset, 0);
        assert_eq!(pack.infos[1].vertex_offset, blases[0].vertices.len() as u32);
        assert_eq!(pack.infos[1].node_offset, blases[0].bvh.nodes.len() as u32);
        assert_eq!(
            pack.vertices.len(),
            blases[0].vertices.len() + blases[1].vertices.len()
        );
    }
}
