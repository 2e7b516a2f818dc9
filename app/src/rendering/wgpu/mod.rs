mod buffers;
mod builders;
mod resources;

pub use buffers::{CameraBuffers, LightBuffers, LightUniform};
pub use builders::{compile_scope, compute_pass, render_pass, QueueExt, WgpuExt};
pub use resources::{Texture, WgpuResources};
