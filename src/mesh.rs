use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use log::{debug, warn};

use crate::error::{MeshError, RenderError};
use crate::render::{GraphicsApi, MeshId};
use crate::shader::Shader;

/// Interleaved vertex consumed by the viewer pipeline.
///
/// Position is bound to attribute slot 0 and the normal to slot 1.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    pub const STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;
    pub const POSITION_OFFSET: u64 = 0;
    pub const NORMAL_OFFSET: u64 = std::mem::size_of::<[f32; 3]>() as u64;

    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
        }
    }
}

const CONE_CORNERS: [Vec3; 4] = [
    Vec3::new(0.0, 0.0, 0.0),
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
];

/// Corner indices and the flat normal of each cone face.
const CONE_FACES: [([usize; 3], Vec3); 4] = [
    ([1, 2, 3], Vec3::new(0.577, 0.577, 0.577)),
    ([0, 2, 1], Vec3::new(0.0, 0.0, -1.0)),
    ([0, 3, 2], Vec3::new(-1.0, 0.0, 0.0)),
    ([1, 3, 0], Vec3::new(0.0, -1.0, 0.0)),
];

/// Triangle-list geometry that has passed index validation.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Result<Self, MeshError> {
        if indices.is_empty() {
            return Err(MeshError::Empty);
        }
        if indices.len() % 3 != 0 {
            return Err(MeshError::NotTriangles {
                count: indices.len(),
            });
        }
        if let Some((position, &index)) = indices
            .iter()
            .enumerate()
            .find(|&(_, &index)| index as usize >= vertices.len())
        {
            return Err(MeshError::IndexOutOfRange {
                index,
                position,
                vertex_count: vertices.len(),
            });
        }
        Ok(Self { vertices, indices })
    }

    /// Tetrahedral cone with one flat normal per face.
    pub fn cone() -> Self {
        let vertices: Vec<Vertex> = CONE_FACES
            .iter()
            .flat_map(|(corners, normal)| {
                corners
                    .iter()
                    .map(move |&corner| Vertex::new(CONE_CORNERS[corner], *normal))
            })
            .collect();
        let indices = (0..vertices.len() as u32).collect();
        Self { vertices, indices }
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Geometry resident on the GPU, addressed through a backend handle.
#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    index_count: u32,
}

impl Mesh {
    /// Uploads vertex and index buffers exactly once.
    pub fn upload<G: GraphicsApi + ?Sized>(
        gfx: &mut G,
        data: &MeshData,
    ) -> Result<Self, RenderError> {
        let id = gfx.upload_mesh(data.vertices(), data.indices())?;
        debug!(
            "uploaded mesh {id:?}: {} vertices, {} triangles",
            data.vertices().len(),
            data.triangle_count()
        );
        Ok(Self {
            id,
            index_count: data.indices().len() as u32,
        })
    }

    /// Issues one indexed draw over the full index range with the uniforms
    /// currently set on `shader`.
    pub fn draw<G: GraphicsApi + ?Sized>(&self, gfx: &mut G, shader: &Shader) {
        if !shader.is_usable() {
            warn!("draw of {:?} skipped: shader program is unusable", self.id);
            return;
        }
        gfx.draw_indexed(self.id, self.index_count);
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}
