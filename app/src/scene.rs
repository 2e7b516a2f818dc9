use maths::Mat4;

use crate::{
    error::RenderError,
    mesh::{Model, Vertex},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(u32);

impl ModelHandle {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(u32);

impl InstanceHandle {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One placed copy of a model: a handle into the model list, a world
/// transform and the hit-group this instance shades with.
#[derive(Debug, Clone, Copy)]
pub struct Instance {
    pub model: ModelHandle,
    pub transform: Mat4,
    pub hit_group: u32,
}

/// Flat geometry store: models plus an append-only instance list. Every
/// mutation that can change the rendered image marks the store dirty; the
/// compositor converts that into an accumulation reset and a top-level
/// rebuild.
#[derive(Default)]
pub struct Scene {
    models: Vec<Model>,
    instances: Vec<Instance>,
    geometry_dirty: bool,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers immutable geometry. With `initial_transform` set, an
    /// instance at that transform is created alongside, the way model
    /// loaders typically want a first placement.
    pub fn add_model(
        &mut self,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        initial_transform: Option<Mat4>,
    ) -> Result<ModelHandle, RenderError> {
        let model = Model::new(vertices, indices)?;
        let handle = ModelHandle(self.models.len() as u32);
        self.models.push(model);

        if let Some(transform) = initial_transform {
            self.add_instance(handle, transform)?;
        }

        Ok(handle)
    }

    pub fn add_instance(
        &mut self,
        model: ModelHandle,
        transform: Mat4,
    ) -> Result<InstanceHandle, RenderError> {
        self.add_instance_with_hit_group(model, transform, 0)
    }

    pub fn add_instance_with_hit_group(
        &mut self,
        model: ModelHandle,
        transform: Mat4,
        hit_group: u32,
    ) -> Result<InstanceHandle, RenderError> {
        if model.index() >= self.models.len() {
            return Err(RenderError::InvalidGeometry(format!(
                "instance references unknown model {}",
                model.index()
            )));
        }

        let handle = InstanceHandle(self.instances.len() as u32);
        self.instances.push(Instance {
            model,
            transform,
            hit_group,
        });
        self.geometry_dirty = true;

        Ok(handle)
    }

    /// Transform edit; the only supported instance mutation.
    pub fn set_instance_transform(
        &mut self,
        instance: InstanceHandle,
        transform: Mat4,
    ) -> Result<(), RenderError> {
        let entry = self.instances.get_mut(instance.index()).ok_or_else(|| {
            RenderError::InvalidGeometry(format!("unknown instance {}", instance.index()))
        })?;
        entry.transform = transform;
        self.geometry_dirty = true;

        Ok(())
    }

    pub fn model(&self, handle: ModelHandle) -> &Model {
        &self.models[handle.index()]
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn instance_count(&self) -> u32 {
        self.instances.len() as u32
    }

    /// Returns and clears the dirty flag. The caller owns the consequences
    /// (accumulation reset, acceleration rebuild).
    pub fn take_geometry_dirty(&mut self) -> bool {
        std::mem::take(&mut self.geometry_dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes;
    use maths::Vec3;

    fn scene_with_quad() -> (Scene, ModelHandle) {
        let mut scene = Scene::new();
        let (vertices, indices) = shapes::plane(0.5);
        let handle = scene.add_model(vertices, indices, None).unwrap();
        (scene, handle)
    }

    #[test]
    fn add_model_without_transform_creates_no_instance() {
        let (mut scene, _) = scene_with_quad();
        assert_eq!(scene.instance_count(), 0);
        assert!(!scene.take_geometry_dirty());
    }

    #[test]
    fn initial_transform_places_an_instance() {
        let mut scene = Scene::new();
        let (vertices, indices) = shapes::plane(0.5);
        scene
            .add_model(vertices, indices, Some(Mat4::IDENTITY))
            .unwrap();
        assert_eq!(scene.instance_count(), 1);
        assert!(scene.take_geometry_dirty());
    }

    #[test]
    fn appending_instances_marks_dirty_each_time() {
        let (mut scene, model) = scene_with_quad();

        scene.add_instance(model, Mat4::IDENTITY).unwrap();
        assert!(scene.take_geometry_dirty());
        assert!(!scene.take_geometry_dirty());

        scene
            .add_instance(model, Mat4::from_translation(Vec3::X))
            .unwrap();
        assert!(scene.take_geometry_dirty());
        assert_eq!(scene.instance_count(), 2);
    }

    #[test]
    fn transform_edit_marks_dirty() {
        let (mut scene, model) = scene_with_quad();
        let instance = scene.add_instance(model, Mat4::IDENTITY).unwrap();
        scene.take_geometry_dirty();

        scene
            .set_instance_transform(instance, Mat4::from_translation(Vec3::Y))
            .unwrap();
        assert!(scene.take_geometry_dirty());
    }

    #[test]
    fn stale_handles_are_rejected() {
        let (mut scene, model) = scene_with_quad();
        let bogus_model = ModelHandle(17);
        assert!(matches!(
            scene.add_instance(bogus_model, Mat4::IDENTITY),
            Err(RenderError::InvalidGeometry(_))
        ));

        let _ = scene.add_instance(model, Mat4::IDENTITY).unwrap();
        let bogus_instance = InstanceHandle(9);
        assert!(matches!(
            scene.set_instance_transform(bogus_instance, Mat4::IDENTITY),
            Err(RenderError::InvalidGeometry(_))
        ));
    }
}
