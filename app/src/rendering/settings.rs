use crate::camera::CameraMatrices;
use maths::Vec3;

/// Which path fills the offscreen target this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Raster,
    RayTrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Infinite,
}

impl LightKind {
    pub fn as_index(&self) -> u32 {
        match self {
            LightKind::Point => 0,
            LightKind::Infinite => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSettings {
    pub position: Vec3,
    pub intensity: f32,
    pub kind: LightKind,
}

impl Default for LightSettings {
    fn default() -> Self {
        Self {
            position: Vec3::new(10.0, 15.0, 8.0),
            intensity: 100.0,
            kind: LightKind::Point,
        }
    }
}

/// Everything UI-linked the compositor needs for one frame, passed in
/// explicitly instead of read from shared globals so the core stays testable
/// without a GUI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSettings {
    pub camera: CameraMatrices,
    pub light: LightSettings,
    pub mode: RenderMode,
    pub clear_color: [f32; 4],
    /// Bounce cap for the ray dispatch; clamped host-side before upload.
    pub max_ray_depth: u32,
    /// Explicit user reset.
    pub reset_requested: bool,
}

impl FrameSettings {
    /// True when a parameter that feeds the accumulated image changed.
    /// The bounce cap is deliberately absent: depth edits refine the running
    /// average in place rather than restarting it.
    fn image_delta(&self, previous: &FrameSettings) -> bool {
        self.camera != previous.camera
            || self.light != previous.light
            || self.clear_color != previous.clear_color
    }
}

/// Central reset decision: any image-affecting delta, a mode switch in either
/// direction, a geometry change, or an explicit request restarts
/// accumulation.
pub fn needs_accumulation_reset(
    previous: Option<&FrameSettings>,
    next: &FrameSettings,
    geometry_dirty: bool,
) -> bool {
    if next.reset_requested || geometry_dirty {
        return true;
    }

    match previous {
        None => false,
        Some(previous) => next.mode != previous.mode || next.image_delta(previous),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::OrbitCamera;

    fn base_settings() -> FrameSettings {
        FrameSettings {
            camera: OrbitCamera::new(Vec3::ZERO, 8.0, 1.0).matrices(),
            light: LightSettings::default(),
            mode: RenderMode::RayTrace,
            clear_color: [1.0, 1.0, 1.0, 1.0],
            max_ray_depth: 8,
            reset_requested: false,
        }
    }

    #[test]
    fn unchanged_settings_do_not_reset() {
        let settings = base_settings();
        assert!(!needs_accumulation_reset(Some(&settings), &settings, false));
    }

    #[test]
    fn first_frame_does_not_reset() {
        assert!(!needs_accumulation_reset(None, &base_settings(), false));
    }

    #[test]
    fn camera_light_and_clear_color_deltas_reset() {
        let previous = base_settings();

        let mut camera = OrbitCamera::new(Vec3::ZERO, 8.0, 1.0);
        camera.azimuth_deg += 1.0;
        let moved = FrameSettings {
            camera: camera.matrices(),
            ..previous
        };
        assert!(needs_accumulation_reset(Some(&previous), &moved, false));

        let mut lit = previous;
        lit.light.intensity += 5.0;
        assert!(needs_accumulation_reset(Some(&previous), &lit, false));

        let mut tinted = previous;
        tinted.clear_color = [0.0, 0.0, 0.0, 1.0];
        assert!(needs_accumulation_reset(Some(&previous), &tinted, false));
    }

    #[test]
    fn depth_edits_do_not_reset() {
        let previous = base_settings();
        let mut deeper = previous;
        deeper.max_ray_depth = 31;
        assert!(!needs_accumulation_reset(Some(&previous), &deeper, false));
    }

    #[test]
    fn geometry_dirt_and_explicit_request_reset() {
        let settings = base_settings();
        assert!(needs_accumulation_reset(Some(&settings), &settings, true));

        let mut requested = settings;
        requested.reset_requested = true;
        assert!(needs_accumulation_reset(Some(&settings), &requested, false));
    }

    #[test]
    fn mode_round_trip_resets_on_both_switches() {
        let ray = base_settings();
        let mut raster = ray;
        raster.mode = RenderMode::Raster;

        // RayTrace -> Raster -> RayTrace: one reset per switch, so no stale
        // samples survive the round trip.
        assert!(needs_accumulation_reset(Some(&ray), &raster, false));
        assert!(needs_accumulation_reset(Some(&raster), &ray, false));
    }
}
