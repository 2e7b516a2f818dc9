use crate::{
    camera::CameraMatrices,
    error::RenderError,
    rendering::{
        retire::RetireQueue,
        settings::LightSettings,
        wgpu::{compile_scope, compute_pass, CameraBuffers, LightBuffers, QueueExt, Texture,
            WgpuExt, WgpuResources},
    },
    scene::Scene,
};

use self::{
    accel::{AccelerationStructureBuilder, BlasData, InstanceRecord, TlasData},
    bvh::BvhNode,
    sbt::{HitGroupDesc, ShaderBindingTable},
};

pub mod accel;
pub mod bvh;
pub mod sbt;

/// Hard bounce ceiling; the per-frame value is clamped into `1..=MAX` before
/// upload, and the shader loop counter enforces it.
pub const MAX_RAY_DEPTH: u32 = 31;

const WORKGROUP_SIZE: u32 = 8;

/// Per-dispatch uniform block.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct TraceParams {
    clear_color: [f32; 4],
    sample_index: u32,
    max_depth: u32,
    width: u32,
    height: u32,
}

/// Host-side recursion bound; the uploaded value is what the shader loop
/// counts against.
pub fn clamped_ray_depth(max_depth: u32) -> u32 {
    max_depth.clamp(1, MAX_RAY_DEPTH)
}

fn require_top_level(top_level: Option<&TlasData>) -> Result<&TlasData, RenderError> {
    top_level.ok_or(RenderError::AccelerationStructureMissing)
}

/// The ray-tracing pipeline: a compute dispatch over the two-level
/// acceleration structure, shading through the binding table, writing the
/// offscreen target and the accumulation buffer.
pub struct Raytracer {
    pipeline: wgpu::ComputePipeline,
    buffers: RaytracerBuffers,
    bind_group_layouts: RaytracerBindGroupLayouts,
    bind_groups: RaytracerBindGroups,
    builder: AccelerationStructureBuilder,
    bottom_levels: Vec<BlasData>,
    top_level: Option<TlasData>,
    binding_table: Option<ShaderBindingTable>,
}

impl Raytracer {
    pub fn new(
        wgpu: &WgpuResources,
        window_size: &winit::dpi::PhysicalSize<u32>,
        scene_target: &wgpu::TextureView,
    ) -> Result<Self, RenderError> {
        let device = &wgpu.device;

        let buffers = RaytracerBuffers::new(device, window_size);
        let bind_group_layouts = RaytracerBindGroupLayouts::new(device);

        let pipeline_layout = device
            .pipeline_layout()
            .label("Raytracer Pipeline Layout")
            .bind_group_layouts(&[
                &bind_group_layouts.scene,
                &bind_group_layouts.binding_table,
                &bind_group_layouts.light,
                &bind_group_layouts.output,
            ])
            .build();

        // Compilation failures are fatal at startup; no partial pipeline is
        // usable.
        let pipeline = compile_scope(device, "ray-tracing compute", || {
            let shader = device
                .shader()
                .label("Raytracer Shader")
                .wgsl(include_str!("../../shaders/trace.wgsl"));
            device
                .compute_pipeline()
                .label("Raytracer Pipeline")
                .layout(&pipeline_layout)
                .shader(&shader, "main")
                .build()
                .expect("raytracer pipeline is fully specified")
        })?;

        let bind_groups =
            RaytracerBindGroups::new(device, &bind_group_layouts, &buffers, scene_target);

        Ok(Self {
            pipeline,
            buffers,
            bind_group_layouts,
            bind_groups,
            builder: AccelerationStructureBuilder::new((&device.limits()).into()),
            bottom_levels: Vec::new(),
            top_level: None,
            binding_table: None,
        })
    }

    pub fn has_top_level(&self) -> bool {
        self.top_level.is_some()
    }

    pub fn instance_count(&self) -> Option<u32> {
        self.top_level.as_ref().map(TlasData::instance_count)
    }

    /// Rebuilds acceleration structures and the binding table from the
    /// current scene snapshot. Bottom levels are built once per model; the
    /// top level is rebuilt wholesale and swapped in atomically, with the
    /// superseded buffers parked in the retire queue instead of destroyed.
    pub fn rebuild_scene(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene: &Scene,
        hit_groups: &[HitGroupDesc],
        frame_index: u64,
        retire: &mut RetireQueue<wgpu::Buffer>,
        scene_target: &wgpu::TextureView,
    ) -> Result<(), RenderError> {
        for model in &scene.models()[self.bottom_levels.len()..] {
            self.bottom_levels.push(self.builder.build_bottom_level(model)?);
        }

        let table_stale = self
            .binding_table
            .as_ref()
            .is_none_or(|table| table.needs_rebuild(hit_groups));
        if table_stale {
            let table = ShaderBindingTable::build(
                hit_groups,
                scene.instances().iter().map(|instance| instance.hit_group),
            )?;
            let records = device
                .buffer()
                .label("Raytracer Binding Table Buffer")
                .storage(table.records());
            retire.retire(
                frame_index,
                std::mem::replace(&mut self.buffers.binding_table, records),
            );
            queue.write_buffer_data(&self.buffers.sbt_layout, 0, &table.layout());
            self.binding_table = Some(table);
        }

        let top_level =
            self.builder
                .build_top_level(scene.instances(), &self.bottom_levels, hit_groups.len() as u32)?;
        let pack = self.builder.pack_geometry(&self.bottom_levels)?;

        let mut replace = |slot: &mut wgpu::Buffer, buffer: wgpu::Buffer| {
            retire.retire(frame_index, std::mem::replace(slot, buffer));
        };

        replace(
            &mut self.buffers.vertices,
            device.buffer().label("Raytracer Vertices Buffer").storage(&pack.vertices),
        );
        replace(
            &mut self.buffers.indices,
            device.buffer().label("Raytracer Indices Buffer").storage(&pack.indices),
        );
        replace(
            &mut self.buffers.blas_nodes,
            device.buffer().label("Raytracer BLAS Node Buffer").storage(&pack.nodes),
        );
        replace(
            &mut self.buffers.blas_primitive_indices,
            device
                .buffer()
                .label("Raytracer BLAS Primitive Indices Buffer")
                .storage(&pack.primitive_indices),
        );
        replace(
            &mut self.buffers.blas_infos,
            device.buffer().label("Raytracer BLAS Info Buffer").storage(&pack.infos),
        );

        let placeholder_nodes = [BvhNode::placeholder()];
        let tlas_nodes: &[BvhNode] = if top_level.bvh.nodes.is_empty() {
            &placeholder_nodes
        } else {
            &top_level.bvh.nodes
        };
        replace(
            &mut self.buffers.tlas_nodes,
            device.buffer().label("Raytracer TLAS Node Buffer").storage(tlas_nodes),
        );

        let tlas_instance_indices: &[u32] = if top_level.bvh.primitive_indices.is_empty() {
            &[0]
        } else {
            &top_level.bvh.primitive_indices
        };
        replace(
            &mut self.buffers.tlas_instance_indices,
            device
                .buffer()
                .label("Raytracer TLAS Instance Indices Buffer")
                .storage(tlas_instance_indices),
        );

        let placeholder_records = [InstanceRecord::default()];
        let records: &[InstanceRecord] = if top_level.records.is_empty() {
            &placeholder_records
        } else {
            &top_level.records
        };
        replace(
            &mut self.buffers.instances,
            device.buffer().label("Raytracer Instance Buffer").storage(records),
        );

        // Readers see either the old structure (already encoded frames) or
        // the fully-new one; bind group creation is the swap point.
        self.bind_groups = RaytracerBindGroups::new(
            device,
            &self.bind_group_layouts,
            &self.buffers,
            scene_target,
        );
        self.top_level = Some(top_level);

        Ok(())
    }

    pub fn update_camera(&self, queue: &wgpu::Queue, matrices: &CameraMatrices) {
        self.buffers.camera.update(queue, matrices);
    }

    pub fn update_light(&self, queue: &wgpu::Queue, light: &LightSettings) {
        self.buffers.light.update(queue, light);
    }

    /// Uploads the per-dispatch uniform block. The bounce cap is clamped
    /// here; the counter carried through the shader loop is authoritative.
    pub fn update_params(
        &self,
        queue: &wgpu::Queue,
        clear_color: [f32; 4],
        sample_index: u32,
        max_depth: u32,
        width: u32,
        height: u32,
    ) {
        let params = TraceParams {
            clear_color,
            sample_index,
            max_depth: clamped_ray_depth(max_depth),
            width,
            height,
        };
        queue.write_buffer_data(&self.buffers.params, 0, &params);
    }

    /// Recreates the size-dependent accumulation buffer and rebinds the
    /// output group against the new offscreen target.
    pub fn resize(
        &mut self,
        wgpu: &WgpuResources,
        new_size: &winit::dpi::PhysicalSize<u32>,
        scene_target: &wgpu::TextureView,
        frame_index: u64,
        retire: &mut RetireQueue<wgpu::Buffer>,
    ) {
        let accumulation = RaytracerBuffers::create_accumulation_buffer(&wgpu.device, new_size);
        retire.retire(
            frame_index,
            std::mem::replace(&mut self.buffers.accumulation, accumulation),
        );
        self.bind_groups.output = RaytracerBindGroups::create_output_group(
            &wgpu.device,
            &self.bind_group_layouts,
            &self.buffers,
            scene_target,
        );
    }

    /// Issues one ray per pixel. Precondition: a top-level structure exists;
    /// dispatching before any build is a defined error, not undefined
    /// behavior.
    pub fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        require_top_level(self.top_level.as_ref())?;

        let mut cpass = compute_pass(encoder).label("Raytracer Dispatch").begin();
        cpass.set_pipeline(&self.pipeline);
        cpass.set_bind_group(0, &self.bind_groups.scene, &[]);
        cpass.set_bind_group(1, &self.bind_groups.binding_table, &[]);
        cpass.set_bind_group(2, &self.bind_groups.light, &[]);
        cpass.set_bind_group(3, &self.bind_groups.output, &[]);
        cpass.dispatch_workgroups(
            width.div_ceil(WORKGROUP_SIZE),
            height.div_ceil(WORKGROUP_SIZE),
            1,
        );

        Ok(())
    }
}

struct RaytracerBuffers {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    blas_nodes: wgpu::Buffer,
    blas_primitive_indices: wgpu::Buffer,
    blas_infos: wgpu::Buffer,
    tlas_nodes: wgpu::Buffer,
    tlas_instance_indices: wgpu::Buffer,
    instances: wgpu::Buffer,

    binding_table: wgpu::Buffer,
    sbt_layout: wgpu::Buffer,

    light: LightBuffers,
    camera: CameraBuffers,
    params: wgpu::Buffer,
    accumulation: wgpu::Buffer,
}

impl RaytracerBuffers {
    fn new(device: &wgpu::Device, window_size: &winit::dpi::PhysicalSize<u32>) -> Self {
        // Placeholders keep every binding non-empty until the first rebuild.
        let vertices = device
            .buffer()
            .label("Raytracer Vertices Buffer")
            .storage(&[accel::RtVertex {
                position: [0.0, 0.0, 0.0, 1.0],
                normal: [0.0, 1.0, 0.0, 0.0],
            }]);
        let indices = device
            .buffer()
            .label("Raytracer Indices Buffer")
            .storage(&[0u32]);
        let blas_nodes = device
            .buffer()
            .label("Raytracer BLAS Node Buffer")
            .storage(&[BvhNode::placeholder()]);
        let blas_primitive_indices = device
            .buffer()
            .label("Raytracer BLAS Primitive Indices Buffer")
            .storage(&[0u32]);
        let blas_infos = device
            .buffer()
            .label("Raytracer BLAS Info Buffer")
            .storage(&[accel::BlasInfo::default()]);
        let tlas_nodes = device
            .buffer()
            .label("Raytracer TLAS Node Buffer")
            .storage(&[BvhNode::placeholder()]);
        let tlas_instance_indices = device
            .buffer()
            .label("Raytracer TLAS Instance Indices Buffer")
            .storage(&[0u32]);
        let instances = device
            .buffer()
            .label("Raytracer Instance Buffer")
            .storage(&[InstanceRecord::default()]);

        let binding_table = device
            .buffer()
            .label("Raytracer Binding Table Buffer")
            .storage(&[sbt::ShaderRecord::default()]);
        let sbt_layout = device
            .buffer()
            .label("Raytracer Binding Table Layout Buffer")
            .uniform(&sbt::SbtLayout {
                ray_generation_offset: 0,
                miss_offset: 0,
                hit_group_offset: 0,
                hit_group_count: 0,
            });

        let light = LightBuffers::new(device, "Raytracer");
        let camera = CameraBuffers::new(device, "Raytracer");
        let params = device
            .buffer()
            .label("Raytracer Params Buffer")
            .uniform(&TraceParams {
                clear_color: [1.0, 1.0, 1.0, 1.0],
                sample_index: 0,
                max_depth: 1,
                width: window_size.width.max(1),
                height: window_size.height.max(1),
            });
        let accumulation = Self::create_accumulation_buffer(device, window_size);

        Self {
            vertices,
            indices,
            blas_nodes,
            blas_primitive_indices,
            blas_infos,
            tlas_nodes,
            tlas_instance_indices,
            instances,
            binding_table,
            sbt_layout,
            light,
            camera,
            params,
            accumulation,
        }
    }

    fn create_accumulation_buffer(
        device: &wgpu::Device,
        size: &winit::dpi::PhysicalSize<u32>,
    ) -> wgpu::Buffer {
        let pixels = u64::from(size.width.max(1)) * u64::from(size.height.max(1));
        device
            .buffer()
            .label("Raytracer Accumulation Buffer")
            .empty_storage(pixels * 16)
    }
}

struct RaytracerBindGroupLayouts {
    scene: wgpu::BindGroupLayout,
    binding_table: wgpu::BindGroupLayout,
    light: wgpu::BindGroupLayout,
    output: wgpu::BindGroupLayout,
}

impl RaytracerBindGroupLayouts {
    fn new(device: &wgpu::Device) -> Self {
        let scene = device
            .bind_group_layout()
            .label("Raytracer Scene Bind Group Layout")
            .storage(0, wgpu::ShaderStages::COMPUTE, true)
            .storage(1, wgpu::ShaderStages::COMPUTE, true)
            .storage(2, wgpu::ShaderStages::COMPUTE, true)
            .storage(3, wgpu::ShaderStages::COMPUTE, true)
            .storage(4, wgpu::ShaderStages::COMPUTE, true)
            .storage(5, wgpu::ShaderStages::COMPUTE, true)
            .storage(6, wgpu::ShaderStages::COMPUTE, true)
            .storage(7, wgpu::ShaderStages::COMPUTE, true)
            .build();
        let binding_table = device
            .bind_group_layout()
            .label("Raytracer Binding Table Bind Group Layout")
            .storage(0, wgpu::ShaderStages::COMPUTE, true)
            .uniform(1, wgpu::ShaderStages::COMPUTE)
            .build();
        let light = device
            .bind_group_layout()
            .label("Raytracer Light Bind Group Layout")
            .uniform(0, wgpu::ShaderStages::COMPUTE)
            .build();
        let output = device
            .bind_group_layout()
            .label("Raytracer Output Bind Group Layout")
            .storage_texture_2d(
                0,
                wgpu::ShaderStages::COMPUTE,
                wgpu::StorageTextureAccess::WriteOnly,
                Texture::SCENE_FORMAT,
            )
            .storage(1, wgpu::ShaderStages::COMPUTE, false)
            .uniform(2, wgpu::ShaderStages::COMPUTE)
            .uniform(3, wgpu::ShaderStages::COMPUTE)
            .uniform(4, wgpu::ShaderStages::COMPUTE)
            .build();

        Self {
            scene,
            binding_table,
            light,
            output,
        }
    }
}

struct RaytracerBindGroups {
    scene: wgpu::BindGroup,
    binding_table: wgpu::BindGroup,
    light: wgpu::BindGroup,
    output: wgpu::BindGroup,
}

impl RaytracerBindGroups {
    fn new(
        device: &wgpu::Device,
        layouts: &RaytracerBindGroupLayouts,
        buffers: &RaytracerBuffers,
        scene_target: &wgpu::TextureView,
    ) -> Self {
        let scene = device
            .bind_group(&layouts.scene)
            .label("Raytracer Scene Bind Group")
            .buffer(0, &buffers.vertices)
            .buffer(1, &buffers.indices)
            .buffer(2, &buffers.blas_nodes)
            .buffer(3, &buffers.blas_primitive_indices)
            .buffer(4, &buffers.blas_infos)
            .buffer(5, &buffers.tlas_nodes)
            .buffer(6, &buffers.tlas_instance_indices)
            .buffer(7, &buffers.instances)
            .build();
        let binding_table = device
            .bind_group(&layouts.binding_table)
            .label("Raytracer Binding Table Bind Group")
            .buffer(0, &buffers.binding_table)
            .buffer(1, &buffers.sbt_layout)
            .build();
        let light = device
            .bind_group(&layouts.light)
            .label("Raytracer Light Bind Group")
            .buffer(0, &buffers.light.light)
            .build();
        let output = Self::create_output_group(device, layouts, buffers, scene_target);

        Self {
            scene,
            binding_table,
            light,
            output,
        }
    }

    fn create_output_group(
        device: &wgpu::Device,
        layouts: &RaytracerBindGroupLayouts,
        buffers: &RaytracerBuffers,
        scene_target: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device
            .bind_group(&layouts.output)
            .label("Raytracer Output Bind Group")
            .texture(0, scene_target)
            .buffer(1, &buffers.accumulation)
            .buffer(2, &buffers.camera.camera_to_world)
            .buffer(3, &buffers.camera.camera_inverse_projection)
            .buffer(4, &buffers.params)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::raytracer::bvh::Bvh;

    #[test]
    fn depth_bound_is_clamped_host_side() {
        assert_eq!(clamped_ray_depth(0), 1);
        assert_eq!(clamped_ray_depth(1), 1);
        assert_eq!(clamped_ray_depth(8), 8);
        assert_eq!(clamped_ray_depth(1000), MAX_RAY_DEPTH);
    }

    #[test]
    fn dispatch_without_top_level_is_a_defined_error() {
        assert!(matches!(
            require_top_level(None),
            Err(RenderError::AccelerationStructureMissing)
        ));

        let built = TlasData {
            bvh: Bvh::default(),
            records: Vec::new(),
        };
        assert!(require_top_level(Some(&built)).is_ok());
    }
}
