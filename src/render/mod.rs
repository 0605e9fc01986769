//! Graphics collaborator seam.
//!
//! The viewer talks to the GPU through [`GraphicsApi`], a small command
//! surface shaped like a classic immediate-mode API: compile stages, link a
//! program, set uniforms by name, draw indexed meshes, present. The native
//! implementation lives in [`wgpu_backend`]; [`headless`] records the same
//! commands without a device.

pub mod headless;
pub mod wgpu_backend;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

use crate::error::{RenderError, ShaderError, ShaderStage};
use crate::mesh::Vertex;

pub use headless::{HeadlessBackend, RecordedDraw};
pub use wgpu_backend::WgpuBackend;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            pub fn new(index: usize) -> Self {
                Self(index as u32)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

handle!(
    /// Compiled shader stage owned by a backend.
    StageId
);
handle!(
    /// Linked program (pipeline) owned by a backend.
    ProgramId
);
handle!(
    /// Uploaded vertex/index buffer pair owned by a backend.
    MeshId
);

/// Operations the viewer needs from a graphics device.
pub trait GraphicsApi {
    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageId, ShaderError>;

    fn link_program(&mut self, vertex: StageId, fragment: StageId)
        -> Result<ProgramId, ShaderError>;

    fn use_program(&mut self, program: ProgramId);

    /// Resolves a uniform by name, e.g. `"model"` or `"light.position"`.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u32])
        -> Result<MeshId, RenderError>;

    /// Draws `index_count` indices of `mesh` with the active program and the
    /// uniform values set so far.
    fn draw_indexed(&mut self, mesh: MeshId, index_count: u32);

    /// Starts a new frame cleared to `color`; depth is cleared to the far plane.
    fn clear(&mut self, color: [f32; 4]);

    fn present(&mut self) -> Result<(), RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec3(Vec3),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec3,
    Mat4,
}

/// Byte offset of a uniform inside [`UniformBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    offset: usize,
    kind: UniformKind,
}

impl UniformLocation {
    pub fn offset(self) -> usize {
        self.offset
    }

    pub fn kind(self) -> UniformKind {
        self.kind
    }
}

struct UniformSlot {
    name: &'static str,
    offset: usize,
    kind: UniformKind,
}

const fn slot(name: &'static str, offset: usize, kind: UniformKind) -> UniformSlot {
    UniformSlot { name, offset, kind }
}

// Offsets follow the WGSL `Uniforms` struct in `shader.rs`.
const UNIFORM_SLOTS: &[UniformSlot] = &[
    slot("model", 0, UniformKind::Mat4),
    slot("view", 64, UniformKind::Mat4),
    slot("projection", 128, UniformKind::Mat4),
    slot("viewPos", 256, UniformKind::Vec3),
    slot("material.shininess", 268, UniformKind::Float),
    slot("objectColor", 272, UniformKind::Vec3),
    slot("light.position", 288, UniformKind::Vec3),
    slot("light.ambient", 304, UniformKind::Vec3),
    slot("light.diffuse", 320, UniformKind::Vec3),
    slot("light.specular", 336, UniformKind::Vec3),
];

/// Looks a uniform up in the shared program layout. Linear scan, no cache.
pub fn lookup_uniform(name: &str) -> Option<UniformLocation> {
    UNIFORM_SLOTS
        .iter()
        .find(|slot| slot.name == name)
        .map(|slot| UniformLocation {
            offset: slot.offset,
            kind: slot.kind,
        })
}

/// CPU mirror of the uniform buffer bound at `@group(0) @binding(0)`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBlock {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    pub view_pos: [f32; 3],
    pub shininess: f32,
    pub object_color: [f32; 3],
    _pad0: f32,
    pub light_position: [f32; 3],
    _pad1: f32,
    pub light_ambient: [f32; 3],
    _pad2: f32,
    pub light_diffuse: [f32; 3],
    _pad3: f32,
    pub light_specular: [f32; 3],
    _pad4: f32,
}

impl Default for UniformBlock {
    fn default() -> Self {
        let identity = Mat4::IDENTITY.to_cols_array_2d();
        Self {
            model: identity,
            view: identity,
            projection: identity,
            normal_matrix: identity,
            ..Self::zeroed()
        }
    }
}

impl UniformBlock {
    pub const SIZE: usize = std::mem::size_of::<UniformBlock>();

    /// Writes `value` at `location`. Returns `false` when the value does not
    /// match the declared type of the slot.
    pub fn write(&mut self, location: UniformLocation, value: UniformValue) -> bool {
        if location.kind != value.kind() {
            return false;
        }
        let mut scratch = [0.0f32; 16];
        let len = match value {
            UniformValue::Float(v) => {
                scratch[0] = v;
                1
            }
            UniformValue::Vec3(v) => {
                scratch[..3].copy_from_slice(&v.to_array());
                3
            }
            UniformValue::Mat4(m) => {
                scratch.copy_from_slice(&m.to_cols_array());
                16
            }
        };
        let source: &[u8] = bytemuck::cast_slice(&scratch[..len]);
        let end = location.offset + source.len();
        bytemuck::bytes_of_mut(self)[location.offset..end].copy_from_slice(source);
        true
    }

    /// Snapshot for one draw, with the normal matrix derived from `model`.
    pub fn for_draw(&self) -> Self {
        let model = Mat4::from_cols_array_2d(&self.model);
        let normal = Mat3::from_mat4(model).inverse().transpose();
        Self {
            normal_matrix: Mat4::from_mat3(normal).to_cols_array_2d(),
            ..*self
        }
    }

    pub fn model(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.projection)
    }
}
