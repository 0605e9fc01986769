use glam::{Mat4, Vec3};

/// World-space positions of the cones, in draw order.
pub const OBJECT_POSITIONS: [Vec3; 6] = [
    Vec3::new(0.0, 0.0, 0.0),
    Vec3::new(2.0, 5.0, -15.0),
    Vec3::new(-1.5, -2.2, -2.5),
    Vec3::new(2.4, -0.4, -3.5),
    Vec3::new(1.5, 2.0, -2.5),
    Vec3::new(-1.3, 1.0, -1.5),
];

pub const ROTATION_AXIS: Vec3 = Vec3::new(1.0, 0.3, 0.5);
pub const ROTATION_STEP_DEGREES: f32 = 20.0;

/// Model matrix of the `index`-th instance: translate to `position`, then
/// rotate `index * step` degrees about `axis`.
pub fn model_matrix(position: Vec3, index: usize, axis: Vec3, step_degrees: f32) -> Mat4 {
    let angle = (step_degrees * index as f32).to_radians();
    Mat4::from_translation(position) * Mat4::from_axis_angle(axis.normalize(), angle)
}

/// Point light with Phong coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
}

/// Scale factors applied to a light's base color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightFactors {
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
}

impl Default for LightFactors {
    fn default() -> Self {
        Self {
            ambient: 0.375,
            diffuse: 0.75,
            specular: 1.0,
        }
    }
}

impl Light {
    pub fn from_base_color(position: Vec3, base: Vec3, factors: LightFactors) -> Self {
        Self {
            position,
            ambient: base * factors.ambient,
            diffuse: base * factors.diffuse,
            specular: base * factors.specular,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn translation_column_is_the_position() {
        for (index, position) in OBJECT_POSITIONS.iter().enumerate() {
            let model = model_matrix(*position, index, ROTATION_AXIS, ROTATION_STEP_DEGREES);
            assert_eq!(model.w_axis.truncate(), *position);
        }
    }

    #[test]
    fn rotation_angle_grows_with_index() {
        for (index, position) in OBJECT_POSITIONS.iter().enumerate() {
            let model = model_matrix(*position, index, ROTATION_AXIS, ROTATION_STEP_DEGREES);
            let (_, rotation, _) = model.to_scale_rotation_translation();
            let expected = Quat::from_axis_angle(
                ROTATION_AXIS.normalize(),
                (20.0 * index as f32).to_radians(),
            );
            assert!(
                rotation.abs_diff_eq(expected, 1e-5) || rotation.abs_diff_eq(-expected, 1e-5),
                "instance {index}: {rotation:?} vs {expected:?}"
            );
        }
    }

    #[test]
    fn instances_have_distinct_models() {
        let models: Vec<Mat4> = OBJECT_POSITIONS
            .iter()
            .enumerate()
            .map(|(i, p)| model_matrix(*p, i, ROTATION_AXIS, ROTATION_STEP_DEGREES))
            .collect();
        for (i, a) in models.iter().enumerate() {
            for b in &models[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn light_coefficients_scale_base_color() {
        let light = Light::from_base_color(Vec3::ONE, Vec3::ONE, LightFactors::default());
        assert_eq!(light.ambient, Vec3::splat(0.375));
        assert_eq!(light.diffuse, Vec3::splat(0.75));
        assert_eq!(light.specular, Vec3::ONE);
    }
}
