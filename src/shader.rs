use glam::{Mat4, Vec3};
use log::{debug, error, warn};

use crate::error::{ShaderError, ShaderStage};
use crate::render::{GraphicsApi, ProgramId, UniformValue};

/// What to do when a stage fails to compile or the program fails to link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderFailurePolicy {
    /// Return the error to the caller.
    #[default]
    Strict,
    /// Log the error and keep running with an unusable shader; draws
    /// through it are skipped.
    Continue,
}

/// Linked vertex + fragment program with by-name uniform setters.
#[derive(Debug)]
pub struct Shader {
    program: Option<ProgramId>,
}

impl Shader {
    pub fn new<G: GraphicsApi + ?Sized>(
        gfx: &mut G,
        vertex_source: &str,
        fragment_source: &str,
        policy: ShaderFailurePolicy,
    ) -> Result<Self, ShaderError> {
        match build_program(gfx, vertex_source, fragment_source) {
            Ok(program) => {
                debug!("linked shader program {program:?}");
                Ok(Self {
                    program: Some(program),
                })
            }
            Err(err) => match policy {
                ShaderFailurePolicy::Strict => Err(err),
                ShaderFailurePolicy::Continue => {
                    error!("{err}");
                    Ok(Self { program: None })
                }
            },
        }
    }

    pub fn is_usable(&self) -> bool {
        self.program.is_some()
    }

    /// Activates the program for subsequent draws.
    pub fn use_program<G: GraphicsApi + ?Sized>(&self, gfx: &mut G) {
        if let Some(program) = self.program {
            gfx.use_program(program);
        }
    }

    pub fn set_f32<G: GraphicsApi + ?Sized>(&self, gfx: &mut G, name: &str, value: f32) {
        self.set(gfx, name, UniformValue::Float(value));
    }

    pub fn set_vec3<G: GraphicsApi + ?Sized>(&self, gfx: &mut G, name: &str, value: Vec3) {
        self.set(gfx, name, UniformValue::Vec3(value));
    }

    pub fn set_mat4<G: GraphicsApi + ?Sized>(&self, gfx: &mut G, name: &str, value: Mat4) {
        self.set(gfx, name, UniformValue::Mat4(value));
    }

    fn set<G: GraphicsApi + ?Sized>(&self, gfx: &mut G, name: &str, value: UniformValue) {
        let Some(program) = self.program else {
            return;
        };
        match gfx.uniform_location(program, name) {
            Some(location) => gfx.set_uniform(location, value),
            None => {
                warn!("shader program {program:?} has no uniform named {name}");
                debug_assert!(false, "unknown uniform {name}");
            }
        }
    }
}

fn build_program<G: GraphicsApi + ?Sized>(
    gfx: &mut G,
    vertex_source: &str,
    fragment_source: &str,
) -> Result<ProgramId, ShaderError> {
    let vertex = gfx.compile_stage(ShaderStage::Vertex, vertex_source)?;
    let fragment = gfx.compile_stage(ShaderStage::Fragment, fragment_source)?;
    gfx.link_program(vertex, fragment)
}

pub const VERTEX_SHADER: &str = r#"
struct Light {
    position: vec3<f32>,
    ambient: vec3<f32>,
    diffuse: vec3<f32>,
    specular: vec3<f32>,
}

struct Uniforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    view_pos: vec3<f32>,
    shininess: f32,
    object_color: vec3<f32>,
    light: Light,
}

@group(0) @binding(0)
var<uniform> u: Uniforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) frag_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = u.model * vec4<f32>(input.position, 1.0);
    out.clip_position = u.projection * u.view * world;
    out.frag_pos = world.xyz;
    let normal_matrix = mat3x3<f32>(
        u.normal_matrix[0].xyz,
        u.normal_matrix[1].xyz,
        u.normal_matrix[2].xyz
    );
    out.normal = normal_matrix * input.normal;
    return out;
}
"#;

pub const FRAGMENT_SHADER: &str = r#"
struct Light {
    position: vec3<f32>,
    ambient: vec3<f32>,
    diffuse: vec3<f32>,
    specular: vec3<f32>,
}

struct Uniforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    view_pos: vec3<f32>,
    shininess: f32,
    object_color: vec3<f32>,
    light: Light,
}

@group(0) @binding(0)
var<uniform> u: Uniforms;

struct FragmentInput {
    @location(0) frag_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@fragment
fn fs_main(input: FragmentInput) -> @location(0) vec4<f32> {
    let ambient = u.light.ambient;

    let norm = normalize(input.normal);
    let light_dir = normalize(u.light.position - input.frag_pos);
    let diff = max(dot(norm, light_dir), 0.0);
    let diffuse = u.light.diffuse * diff;

    let view_dir = normalize(u.view_pos - input.frag_pos);
    let reflect_dir = reflect(-light_dir, norm);
    let spec = pow(max(dot(view_dir, reflect_dir), 0.0), u.shininess);
    let specular = u.light.specular * spec;

    let result = (ambient + diffuse + specular) * u.object_color;
    return vec4<f32>(result, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;

    #[test]
    fn builds_program_from_both_stages() {
        let mut gfx = HeadlessBackend::new();
        let shader = Shader::new(
            &mut gfx,
            VERTEX_SHADER,
            FRAGMENT_SHADER,
            ShaderFailurePolicy::Strict,
        )
        .unwrap();
        assert!(shader.is_usable());
        assert_eq!(gfx.compiled_stages(), 2);
        assert_eq!(gfx.linked_programs(), 1);
    }

    #[test]
    fn strict_policy_reports_stage() {
        let mut gfx = HeadlessBackend::new();
        let err = Shader::new(&mut gfx, VERTEX_SHADER, "", ShaderFailurePolicy::Strict)
            .unwrap_err();
        assert!(matches!(
            err,
            ShaderError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
    }

    #[test]
    fn continue_policy_yields_unusable_shader() {
        let mut gfx = HeadlessBackend::new();
        let shader = Shader::new(&mut gfx, "", FRAGMENT_SHADER, ShaderFailurePolicy::Continue)
            .unwrap();
        assert!(!shader.is_usable());

        shader.use_program(&mut gfx);
        shader.set_vec3(&mut gfx, "objectColor", Vec3::ONE);
        assert_eq!(gfx.active_program(), None);
        assert_eq!(gfx.uniforms().object_color, [0.0; 3]);
    }

    #[test]
    fn setters_resolve_names_every_call() {
        let mut gfx = HeadlessBackend::new();
        let shader = Shader::new(
            &mut gfx,
            VERTEX_SHADER,
            FRAGMENT_SHADER,
            ShaderFailurePolicy::Strict,
        )
        .unwrap();
        shader.use_program(&mut gfx);
        shader.set_vec3(&mut gfx, "light.diffuse", Vec3::splat(0.75));
        shader.set_f32(&mut gfx, "material.shininess", 32.0);
        shader.set_f32(&mut gfx, "material.shininess", 16.0);
        assert_eq!(gfx.uniform_lookups(), 3);
        assert_eq!(gfx.uniforms().light_diffuse, [0.75; 3]);
        assert_eq!(gfx.uniforms().shininess, 16.0);
    }

    #[test]
    fn both_stages_declare_the_same_uniform_block() {
        let block = |source: &str| {
            let start = source.find("struct Light").unwrap();
            let end = source.find("var<uniform> u: Uniforms;").unwrap();
            source[start..end].to_string()
        };
        assert_eq!(block(VERTEX_SHADER), block(FRAGMENT_SHADER));
        assert!(VERTEX_SHADER.contains(ShaderStage::Vertex.entry_point()));
        assert!(FRAGMENT_SHADER.contains(ShaderStage::Fragment.entry_point()));
    }
}
