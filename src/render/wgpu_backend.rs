use std::num::NonZeroU64;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use pollster::block_on;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use super::{
    lookup_uniform, GraphicsApi, MeshId, ProgramId, StageId, UniformBlock, UniformLocation,
    UniformValue,
};
use crate::error::{RenderError, ShaderError, ShaderStage};
use crate::mesh::{MeshData, Vertex};

const INITIAL_DRAW_CAPACITY: u64 = 8;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: Vertex::POSITION_OFFSET,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: Vertex::NORMAL_OFFSET,
        shader_location: 1,
    },
];

/// [`GraphicsApi`] implementation on top of wgpu.
///
/// Uniform writes go to a CPU-side [`UniformBlock`]. Every draw snapshots
/// that block, and `present` uploads all snapshots of the frame into one
/// buffer addressed with dynamic offsets before recording a single pass.
pub struct WgpuBackend {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: DepthBuffer,
    uniform_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniforms: UniformArena,
    stages: Vec<CompiledStage>,
    programs: Vec<wgpu::RenderPipeline>,
    meshes: Vec<MeshBuffers>,
    active_program: Option<ProgramId>,
    current: UniformBlock,
    clear_color: wgpu::Color,
    frame: Vec<DrawCall>,
}

impl WgpuBackend {
    /// Initializes the GPU device and surface for the provided window.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            anyhow::bail!("window has zero area");
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("failed to create window surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("viewer-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let (Some(&first_format), Some(&alpha_mode)) =
            (surface_caps.formats.first(), surface_caps.alpha_modes.first())
        else {
            anyhow::bail!("surface is not supported by the adapter");
        };
        // Linear formats keep the clear and object colors as authored.
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| !format.is_srgb())
            .copied()
            .unwrap_or(first_format);
        info!("surface format {surface_format:?}");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform-bind-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(UniformBlock::SIZE as u64),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("viewer-pipeline-layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });

        let uniforms = UniformArena::new(&device, &uniform_layout, INITIAL_DRAW_CAPACITY);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth,
            uniform_layout,
            pipeline_layout,
            uniforms,
            stages: Vec::new(),
            programs: Vec::new(),
            meshes: Vec::new(),
            active_program: None,
            current: UniformBlock::default(),
            clear_color: wgpu::Color::BLACK,
            frame: Vec::new(),
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    fn checked<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let error = block_on(self.device.pop_error_scope());
        (value, error)
    }
}

impl GraphicsApi for WgpuBackend {
    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageId, ShaderError> {
        let label = format!("{stage}-stage");
        let (module, error) = self.checked(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        if let Some(error) = error {
            return Err(ShaderError::Compile {
                stage,
                log: error.to_string(),
            });
        }
        self.stages.push(CompiledStage { stage, module });
        debug!("compiled {stage} stage");
        Ok(StageId::new(self.stages.len() - 1))
    }

    fn link_program(
        &mut self,
        vertex: StageId,
        fragment: StageId,
    ) -> Result<ProgramId, ShaderError> {
        let vertex_module = stage_module(&self.stages, vertex, ShaderStage::Vertex)?;
        let fragment_module = stage_module(&self.stages, fragment, ShaderStage::Fragment)?;
        let (pipeline, error) = self.checked(|device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("viewer-pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex_module,
                    entry_point: ShaderStage::Vertex.entry_point(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: Vertex::STRIDE,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &VERTEX_ATTRIBUTES,
                    }],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DepthBuffer::FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: fragment_module,
                    entry_point: ShaderStage::Fragment.entry_point(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
            })
        });
        if let Some(error) = error {
            return Err(ShaderError::Link {
                log: error.to_string(),
            });
        }
        self.programs.push(pipeline);
        Ok(ProgramId::new(self.programs.len() - 1))
    }

    fn use_program(&mut self, program: ProgramId) {
        self.active_program = Some(program);
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        if program.index() >= self.programs.len() {
            return None;
        }
        lookup_uniform(name)
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        if !self.current.write(location, value) {
            warn!("uniform at offset {} rejected {value:?}", location.offset());
        }
    }

    fn upload_mesh(
        &mut self,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<MeshId, RenderError> {
        let data = MeshData::new(vertices.to_vec(), indices.to_vec())?;
        let label = format!("mesh-{}", self.meshes.len());
        let (buffers, error) = self.checked(|device| MeshBuffers::from_mesh(device, &data, &label));
        if let Some(error) = error {
            return Err(RenderError::Device {
                what: "mesh buffers",
                log: error.to_string(),
            });
        }
        self.meshes.push(buffers);
        Ok(MeshId::new(self.meshes.len() - 1))
    }

    fn draw_indexed(&mut self, mesh: MeshId, index_count: u32) {
        let Some(program) = self.active_program else {
            warn!("draw of {mesh:?} skipped: no active program");
            return;
        };
        match self.meshes.get(mesh.index()) {
            Some(buffers) if index_count <= buffers.index_count => {
                self.frame.push(DrawCall {
                    program,
                    mesh,
                    index_count,
                    uniforms: self.current.for_draw(),
                });
            }
            _ => warn!("draw of {mesh:?} skipped: unknown mesh or index range"),
        }
    }

    fn clear(&mut self, color: [f32; 4]) {
        let [r, g, b, a] = color.map(f64::from);
        self.clear_color = wgpu::Color { r, g, b, a };
        self.frame.clear();
    }

    fn present(&mut self) -> Result<(), RenderError> {
        let draws = std::mem::take(&mut self.frame);

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = self.window.inner_size();
                self.resize(size);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                info!("Surface timeout; retrying next frame");
                return Ok(());
            }
            Err(err) => return Err(RenderError::Surface(err)),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.uniforms
            .upload(&self.device, &self.queue, &self.uniform_layout, &draws);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("viewer-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for (slot, draw) in draws.iter().enumerate() {
                let (Some(pipeline), Some(mesh)) = (
                    self.programs.get(draw.program.index()),
                    self.meshes.get(draw.mesh.index()),
                ) else {
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.uniforms.bind_group, &[self.uniforms.offset(slot)]);
                pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn stage_module(
    stages: &[CompiledStage],
    id: StageId,
    expected: ShaderStage,
) -> Result<&wgpu::ShaderModule, ShaderError> {
    match stages.get(id.index()) {
        Some(compiled) if compiled.stage == expected => Ok(&compiled.module),
        _ => Err(ShaderError::Link {
            log: format!("{id:?} is not a compiled {expected} stage"),
        }),
    }
}

struct CompiledStage {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
}

struct DrawCall {
    program: ProgramId,
    mesh: MeshId,
    index_count: u32,
    uniforms: UniformBlock,
}

/// Dynamic-offset uniform buffer holding one [`UniformBlock`] per draw.
struct UniformArena {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    stride: u64,
    capacity: u64,
}

impl UniformArena {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: u64) -> Self {
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let stride = wgpu::util::align_to(UniformBlock::SIZE as u64, alignment);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("draw-uniforms"),
            size: stride * capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw-uniforms-bind-group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(UniformBlock::SIZE as u64),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            stride,
            capacity,
        }
    }

    fn offset(&self, slot: usize) -> u32 {
        (slot as u64 * self.stride) as u32
    }

    fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        draws: &[DrawCall],
    ) {
        if draws.is_empty() {
            return;
        }
        let needed = draws.len() as u64;
        if needed > self.capacity {
            debug!("growing draw uniform buffer to {} slots", needed.next_power_of_two());
            *self = Self::new(device, layout, needed.next_power_of_two());
        }
        let stride = self.stride as usize;
        let mut bytes = vec![0u8; stride * draws.len()];
        for (chunk, draw) in bytes.chunks_exact_mut(stride).zip(draws) {
            chunk[..UniformBlock::SIZE].copy_from_slice(bytemuck::bytes_of(&draw.uniforms));
        }
        queue.write_buffer(&self.buffer, 0, &bytes);
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(mesh.vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(mesh.indices()),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices().len() as u32,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_attributes_follow_vertex_layout() {
        assert_eq!(VERTEX_ATTRIBUTES[0].shader_location, 0);
        assert_eq!(VERTEX_ATTRIBUTES[0].offset, 0);
        assert_eq!(VERTEX_ATTRIBUTES[1].shader_location, 1);
        assert_eq!(VERTEX_ATTRIBUTES[1].offset, 12);
        let end = VERTEX_ATTRIBUTES[1].offset + VERTEX_ATTRIBUTES[1].format.size();
        assert_eq!(end, Vertex::STRIDE);
    }

    #[test]
    fn uniform_stride_respects_default_alignment() {
        let alignment = u64::from(wgpu::Limits::default().min_uniform_buffer_offset_alignment);
        let stride = wgpu::util::align_to(UniformBlock::SIZE as u64, alignment);
        assert_eq!(stride % alignment, 0);
        assert!(stride >= UniformBlock::SIZE as u64);
    }
}
