//! Interactive first-person viewer for a small scene of flat-shaded cones.
//!
//! The camera model, geometry and per-frame composition are plain Rust and
//! run against the [`render::GraphicsApi`] trait, so everything except the
//! window and the wgpu device can be exercised headlessly.

pub mod app;
pub mod camera;
pub mod clock;
pub mod config;
pub mod error;
pub mod input;
pub mod mesh;
pub mod render;
pub mod scene;
pub mod shader;

pub use app::{AppPhase, Viewer};
pub use camera::{Camera, CameraMovement};
pub use clock::FrameClock;
pub use config::ViewerConfig;
pub use error::{MeshError, RenderError, ShaderError, ShaderStage};
pub use input::{InputState, KeyCode, MouseTracker, NamedKey};
pub use mesh::{Mesh, MeshData, Vertex};
pub use render::{GraphicsApi, HeadlessBackend, WgpuBackend};
pub use scene::{Light, LightFactors};
pub use shader::{Shader, ShaderFailurePolicy};
