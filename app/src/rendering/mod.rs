pub mod accumulator;
pub mod post;
pub mod rasterizer;
pub mod raytracer;
pub mod renderer;
pub mod retire;
pub mod settings;
pub mod wgpu;

pub use renderer::Renderer;
pub use settings::{FrameSettings, LightKind, LightSettings, RenderMode};
