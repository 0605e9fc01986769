use std::cell::Cell;

use log::warn;

use super::{
    lookup_uniform, GraphicsApi, MeshId, ProgramId, StageId, UniformBlock, UniformLocation,
    UniformValue,
};
use crate::error::{RenderError, ShaderError, ShaderStage};
use crate::mesh::{MeshData, Vertex};

/// One draw captured by [`HeadlessBackend`], with the uniforms it saw.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub program: ProgramId,
    pub mesh: MeshId,
    pub index_count: u32,
    pub uniforms: UniformBlock,
}

/// Graphics backend that keeps every command in memory instead of
/// submitting it to a device.
///
/// Stage "compilation" only checks that the source defines the stage's
/// entry point.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    stages: Vec<ShaderStage>,
    programs: usize,
    meshes: Vec<MeshData>,
    active_program: Option<ProgramId>,
    uniforms: UniformBlock,
    uniform_lookups: Cell<usize>,
    clear_color: Option<[f32; 4]>,
    frame_draws: Vec<RecordedDraw>,
    draws: Vec<RecordedDraw>,
    skipped_draws: usize,
    presented_frames: usize,
    surface_failure: Option<wgpu::SurfaceError>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compiled_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn linked_programs(&self) -> usize {
        self.programs
    }

    pub fn uploaded_meshes(&self) -> &[MeshData] {
        &self.meshes
    }

    pub fn active_program(&self) -> Option<ProgramId> {
        self.active_program
    }

    /// Current uniform values, as the next draw would see them.
    pub fn uniforms(&self) -> &UniformBlock {
        &self.uniforms
    }

    pub fn uniform_lookups(&self) -> usize {
        self.uniform_lookups.get()
    }

    pub fn clear_color(&self) -> Option<[f32; 4]> {
        self.clear_color
    }

    /// Draws of the most recently presented frame.
    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    pub fn skipped_draws(&self) -> usize {
        self.skipped_draws
    }

    pub fn presented_frames(&self) -> usize {
        self.presented_frames
    }

    /// Makes the next `present` fail with `error`, the way a lost device
    /// surfaces through a real swap chain.
    pub fn fail_next_present(&mut self, error: wgpu::SurfaceError) {
        self.surface_failure = Some(error);
    }
}

impl GraphicsApi for HeadlessBackend {
    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageId, ShaderError> {
        if !source.contains(stage.entry_point()) {
            return Err(ShaderError::Compile {
                stage,
                log: format!("missing entry point `{}`", stage.entry_point()),
            });
        }
        self.stages.push(stage);
        Ok(StageId::new(self.stages.len() - 1))
    }

    fn link_program(
        &mut self,
        vertex: StageId,
        fragment: StageId,
    ) -> Result<ProgramId, ShaderError> {
        let check_stage = |id: StageId, stage: ShaderStage| match self.stages.get(id.index()) {
            Some(found) if *found == stage => Ok(()),
            _ => Err(ShaderError::Link {
                log: format!("{id:?} is not a compiled {stage} stage"),
            }),
        };
        check_stage(vertex, ShaderStage::Vertex)?;
        check_stage(fragment, ShaderStage::Fragment)?;
        self.programs += 1;
        Ok(ProgramId::new(self.programs - 1))
    }

    fn use_program(&mut self, program: ProgramId) {
        self.active_program = Some(program);
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.uniform_lookups.set(self.uniform_lookups.get() + 1);
        if program.index() >= self.programs {
            return None;
        }
        lookup_uniform(name)
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        if !self.uniforms.write(location, value) {
            warn!("uniform at offset {} rejected {value:?}", location.offset());
        }
    }

    fn upload_mesh(
        &mut self,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<MeshId, RenderError> {
        let data = MeshData::new(vertices.to_vec(), indices.to_vec())?;
        self.meshes.push(data);
        Ok(MeshId::new(self.meshes.len() - 1))
    }

    fn draw_indexed(&mut self, mesh: MeshId, index_count: u32) {
        let Some(program) = self.active_program else {
            warn!("draw of {mesh:?} skipped: no active program");
            self.skipped_draws += 1;
            return;
        };
        let known = self
            .meshes
            .get(mesh.index())
            .is_some_and(|data| index_count as usize <= data.indices().len());
        if !known {
            warn!("draw of {mesh:?} skipped: unknown mesh or index range");
            self.skipped_draws += 1;
            return;
        }
        self.frame_draws.push(RecordedDraw {
            program,
            mesh,
            index_count,
            uniforms: self.uniforms.for_draw(),
        });
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.clear_color = Some(color);
        self.frame_draws.clear();
    }

    fn present(&mut self) -> Result<(), RenderError> {
        if let Some(error) = self.surface_failure.take() {
            self.frame_draws.clear();
            return Err(RenderError::Surface(error));
        }
        self.draws = std::mem::take(&mut self.frame_draws);
        self.presented_frames += 1;
        Ok(())
    }
}
