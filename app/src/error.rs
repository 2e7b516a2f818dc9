/// Failure taxonomy for the renderer.
///
/// Build-time errors (`InvalidGeometry`, `ShaderCompile`) abort startup.
/// `BuildFailed` is per-frame recoverable: the compositor falls back to the
/// raster path and retries the build on the next frame. `DeviceLost` is never
/// recovered locally; it unwinds to the application driver.
#[derive(Debug)]
pub enum RenderError {
    InvalidGeometry(String),
    BuildFailed(String),
    ShaderCompile {
        stage: &'static str,
        diagnostic: String,
    },
    AccelerationStructureMissing,
    DeviceLost,
}

impl RenderError {
    /// True for conditions the frame loop cannot degrade around.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::ShaderCompile { .. } | RenderError::DeviceLost
        )
    }
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::InvalidGeometry(msg) => write!(f, "invalid geometry: {msg}"),
            RenderError::BuildFailed(msg) => {
                write!(f, "acceleration structure build failed: {msg}")
            }
            RenderError::ShaderCompile { stage, diagnostic } => {
                write!(f, "shader compilation failed in {stage}: {diagnostic}")
            }
            RenderError::AccelerationStructureMissing => {
                write!(f, "ray dispatch requested before a top-level structure was built")
            }
            RenderError::DeviceLost => write!(f, "GPU device lost"),
        }
    }
}

impl std::error::Error for RenderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_classification() {
        assert!(RenderError::DeviceLost.is_fatal());
        assert!(RenderError::ShaderCompile {
            stage: "compute",
            diagnostic: "oops".to_string()
        }
        .is_fatal());
        assert!(!RenderError::BuildFailed("too big".to_string()).is_fatal());
        assert!(!RenderError::AccelerationStructureMissing.is_fatal());
    }
}
