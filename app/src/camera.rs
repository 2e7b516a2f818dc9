use maths::{Mat4, Vec3, Vec4};

/// Everything the renderer needs from the camera for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMatrices {
    pub view_projection: Mat4,
    pub camera_to_world: Mat4,
    pub camera_inverse_projection: Mat4,
}

/// Orbit camera around a fixed target. Camera manipulation stays outside the
/// renderer core; the compositor only ever sees the derived matrices.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub azimuth_deg: f32,
    pub altitude_deg: f32,
    pub distance: f32,
    pub fov_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl OrbitCamera {
    pub fn new(target: Vec3, distance: f32, aspect: f32) -> Self {
        Self {
            target,
            azimuth_deg: 45.0,
            altitude_deg: 30.0,
            distance,
            fov_deg: 45.0,
            aspect,
            near: 0.1,
            far: 10000.0,
        }
    }

    pub fn eye(&self) -> Vec3 {
        let azimuth = self.azimuth_deg.to_radians();
        let altitude = self.altitude_deg.to_radians();
        let offset = Vec3::new(
            altitude.cos() * azimuth.cos(),
            altitude.sin(),
            altitude.cos() * azimuth.sin(),
        ) * self.distance;

        self.target + offset
    }

    pub fn matrices(&self) -> CameraMatrices {
        let eye = self.eye();
        let forward = (self.target - eye).normalized();
        let right = forward.cross(Vec3::Y).normalized();
        let up = right.cross(forward).normalized();

        let world_to_camera = Mat4::from_cols(
            Vec4::new(right.x, up.x, -forward.x, 0.0),
            Vec4::new(right.y, up.y, -forward.y, 0.0),
            Vec4::new(right.z, up.z, -forward.z, 0.0),
            Vec4::new(-right.dot(eye), -up.dot(eye), forward.dot(eye), 1.0),
        );
        let camera_to_world = world_to_camera.inverse();

        // Right-handed perspective with the 0..1 depth range wgpu clips to.
        let top = self.near * (self.fov_deg.to_radians() / 2.0).tan();
        let right_extent = top * self.aspect;
        let projection = Mat4::from_cols(
            Vec4::new(self.near / right_extent, 0.0, 0.0, 0.0),
            Vec4::new(0.0, self.near / top, 0.0, 0.0),
            Vec4::new(0.0, 0.0, self.far / (self.near - self.far), -1.0),
            Vec4::new(
                0.0,
                0.0,
                self.near * self.far / (self.near - self.far),
                0.0,
            ),
        );

        CameraMatrices {
            view_projection: projection * world_to_camera,
            camera_to_world,
            camera_inverse_projection: projection.inverse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eye_sits_at_the_configured_distance() {
        let camera = OrbitCamera::new(Vec3::ZERO, 8.0, 16.0 / 9.0);
        assert!((camera.eye().length() - 8.0).abs() < 1e-4);
    }

    #[test]
    fn view_moves_the_eye_to_the_origin() {
        let camera = OrbitCamera::new(Vec3::new(1.0, 2.0, 3.0), 5.0, 1.0);
        let matrices = camera.matrices();
        // camera_to_world maps the camera origin back to the eye position
        let eye = matrices.camera_to_world.transform_point(Vec3::ZERO);
        let expected = camera.eye();
        assert!((eye - expected).length() < 1e-3);
    }

    #[test]
    fn azimuth_change_changes_the_matrices() {
        let mut camera = OrbitCamera::new(Vec3::ZERO, 8.0, 1.0);
        let before = camera.matrices();
        camera.azimuth_deg += 10.0;
        assert_ne!(before, camera.matrices());
    }
}
