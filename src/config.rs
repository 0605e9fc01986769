use glam::Vec3;

use crate::scene::{LightFactors, OBJECT_POSITIONS, ROTATION_AXIS, ROTATION_STEP_DEGREES};
use crate::shader::ShaderFailurePolicy;

/// Fixed runtime settings of the viewer. `Default` holds the shipped scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub camera_position: Vec3,
    pub object_positions: Vec<Vec3>,
    pub rotation_axis: Vec3,
    pub rotation_step_degrees: f32,
    pub object_color: Vec3,
    pub shininess: f32,
    pub light_position: Vec3,
    pub light_color: Vec3,
    pub light_factors: LightFactors,
    pub clear_color: [f32; 4],
    pub shader_policy: ShaderFailurePolicy,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "Cone Viewer".to_string(),
            width: 1200,
            height: 900,
            camera_position: Vec3::new(0.0, 0.0, 5.0),
            object_positions: OBJECT_POSITIONS.to_vec(),
            rotation_axis: ROTATION_AXIS,
            rotation_step_degrees: ROTATION_STEP_DEGREES,
            object_color: Vec3::new(1.0, 0.5, 0.5),
            shininess: 32.0,
            light_position: Vec3::ONE,
            light_color: Vec3::ONE,
            light_factors: LightFactors::default(),
            clear_color: [0.3, 0.3, 0.3, 1.0],
            shader_policy: ShaderFailurePolicy::Strict,
        }
    }
}

impl ViewerConfig {
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}
