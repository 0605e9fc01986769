use anyhow::{Context, Result};
use glam::Vec2;
use log::{error, info};

use crate::camera::{Camera, CameraMovement};
use crate::config::ViewerConfig;
use crate::error::RenderError;
use crate::input::{InputState, KeyCode, MouseTracker, NamedKey};
use crate::mesh::{Mesh, MeshData};
use crate::render::GraphicsApi;
use crate::scene::{model_matrix, Light};
use crate::shader::{Shader, FRAGMENT_SHADER, VERTEX_SHADER};

/// Lifecycle of the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPhase {
    Initializing,
    Running,
    ShuttingDown,
}

const MOVEMENT_KEYS: [(char, CameraMovement); 4] = [
    ('W', CameraMovement::Forward),
    ('S', CameraMovement::Backward),
    ('A', CameraMovement::Left),
    ('D', CameraMovement::Right),
];

/// Application state: owns the graphics backend, camera, mesh, shader and
/// input tracking. Window callbacks are forwarded to its `handle_*` methods.
pub struct Viewer<G: GraphicsApi> {
    gfx: G,
    config: ViewerConfig,
    phase: AppPhase,
    camera: Camera,
    mesh: Mesh,
    shader: Shader,
    input: InputState,
    mouse: MouseTracker,
    aspect: f32,
    close_requested: bool,
}

impl<G: GraphicsApi> Viewer<G> {
    /// Compiles the shader, uploads the cone and seeds the camera.
    pub fn new(gfx: G, config: ViewerConfig) -> Result<Self> {
        Self::with_shader_sources(gfx, config, VERTEX_SHADER, FRAGMENT_SHADER)
    }

    pub fn with_shader_sources(
        mut gfx: G,
        config: ViewerConfig,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self> {
        info!("viewer phase: {:?}", AppPhase::Initializing);
        let shader = Shader::new(&mut gfx, vertex_source, fragment_source, config.shader_policy)
            .context("failed to build shader program")?;
        let mesh =
            Mesh::upload(&mut gfx, &MeshData::cone()).context("failed to upload cone mesh")?;
        let camera = Camera::new(config.camera_position);
        let center = Vec2::new(config.width as f32, config.height as f32) / 2.0;

        info!("viewer phase: {:?}", AppPhase::Running);
        Ok(Self {
            gfx,
            aspect: config.aspect_ratio(),
            config,
            phase: AppPhase::Running,
            camera,
            mesh,
            shader,
            input: InputState::new(),
            mouse: MouseTracker::new(center),
            close_requested: false,
        })
    }

    pub fn phase(&self) -> AppPhase {
        self.phase
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn graphics(&self) -> &G {
        &self.gfx
    }

    pub fn graphics_mut(&mut self) -> &mut G {
        &mut self.gfx
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            if key == KeyCode::Named(NamedKey::Escape) {
                self.request_close();
            }
            self.input.set_key_down(key);
        } else {
            self.input.set_key_up(key);
        }
    }

    pub fn handle_cursor_moved(&mut self, x: f32, y: f32) {
        let offset = self.mouse.offset(Vec2::new(x, y));
        self.camera.process_mouse_movement(offset.x, offset.y, true);
    }

    pub fn handle_scroll(&mut self, y_offset: f32) {
        self.camera.process_mouse_scroll(y_offset);
    }

    /// Drops held keys and re-arms the first-mouse latch.
    pub fn handle_focus_lost(&mut self) {
        self.input.release_all();
        self.mouse.rearm();
    }

    pub fn handle_resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Advances the camera by `delta_time` seconds and renders one frame.
    pub fn frame(&mut self, delta_time: f32) -> Result<(), RenderError> {
        if self.phase != AppPhase::Running {
            return Ok(());
        }
        self.apply_movement(delta_time);
        self.render()
    }

    /// Runs one frame. A render failure is logged and ends the session
    /// through the normal close path.
    pub fn step(&mut self, delta_time: f32) {
        if let Err(err) = self.frame(delta_time) {
            error!("frame failed, closing viewer: {err}");
            self.request_close();
        }
    }

    pub fn shutdown(&mut self) {
        if self.phase == AppPhase::ShuttingDown {
            return;
        }
        self.phase = AppPhase::ShuttingDown;
        let position = self.camera.position();
        info!(
            "viewer phase: {:?}; camera at ({:.2}, {:.2}, {:.2}) yaw {:.1} pitch {:.1}",
            self.phase,
            position.x,
            position.y,
            position.z,
            self.camera.yaw(),
            self.camera.pitch()
        );
    }

    fn apply_movement(&mut self, delta_time: f32) {
        for (key, direction) in MOVEMENT_KEYS {
            if self.input.is_key_down(KeyCode::Character(key)) {
                self.camera.process_keyboard(direction, delta_time);
            }
        }
    }

    fn render(&mut self) -> Result<(), RenderError> {
        let config = &self.config;
        let gfx = &mut self.gfx;
        let shader = &self.shader;
        let light = Light::from_base_color(
            config.light_position,
            config.light_color,
            config.light_factors,
        );

        gfx.clear(config.clear_color);
        shader.use_program(gfx);
        shader.set_vec3(gfx, "objectColor", config.object_color);
        shader.set_vec3(gfx, "light.position", light.position);
        shader.set_vec3(gfx, "viewPos", self.camera.position());
        shader.set_vec3(gfx, "light.ambient", light.ambient);
        shader.set_vec3(gfx, "light.diffuse", light.diffuse);
        shader.set_vec3(gfx, "light.specular", light.specular);
        shader.set_f32(gfx, "material.shininess", config.shininess);
        shader.set_mat4(gfx, "view", self.camera.view_matrix());
        shader.set_mat4(gfx, "projection", self.camera.projection_matrix(self.aspect));

        for (index, position) in config.object_positions.iter().enumerate() {
            let model = model_matrix(
                *position,
                index,
                config.rotation_axis,
                config.rotation_step_degrees,
            );
            shader.set_mat4(gfx, "model", model);
            self.mesh.draw(gfx, shader);
        }

        gfx.present()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;
    use crate::shader::ShaderFailurePolicy;
    use glam::Vec3;

    fn viewer() -> Viewer<HeadlessBackend> {
        Viewer::new(HeadlessBackend::new(), ViewerConfig::default()).unwrap()
    }

    #[test]
    fn starts_running_with_seeded_camera() {
        let viewer = viewer();
        assert_eq!(viewer.phase(), AppPhase::Running);
        assert_eq!(viewer.camera().position(), Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(viewer.graphics().uploaded_meshes().len(), 1);
    }

    #[test]
    fn escape_requests_close() {
        let mut viewer = viewer();
        viewer.handle_key(KeyCode::Character('W'), true);
        assert!(!viewer.should_close());
        viewer.handle_key(KeyCode::Named(NamedKey::Escape), true);
        assert!(viewer.should_close());
    }

    #[test]
    fn opposite_keys_cancel_out() {
        let mut viewer = viewer();
        viewer.handle_key(KeyCode::Character('W'), true);
        viewer.handle_key(KeyCode::Character('S'), true);
        viewer.frame(0.5).unwrap();
        assert!(viewer
            .camera()
            .position()
            .abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-6));
    }

    #[test]
    fn focus_loss_stops_movement() {
        let mut viewer = viewer();
        viewer.handle_key(KeyCode::Character('D'), true);
        viewer.handle_focus_lost();
        viewer.frame(1.0).unwrap();
        assert_eq!(viewer.camera().position(), Vec3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn focus_loss_rearms_the_mouse_latch() {
        let mut viewer = viewer();
        viewer.handle_cursor_moved(600.0, 450.0);
        viewer.handle_cursor_moved(650.0, 430.0);
        let (yaw, pitch) = (viewer.camera().yaw(), viewer.camera().pitch());
        assert_ne!((yaw, pitch), (-90.0, 0.0));

        viewer.handle_focus_lost();
        viewer.handle_cursor_moved(-4000.0, 9000.0);
        assert_eq!(viewer.camera().yaw(), yaw);
        assert_eq!(viewer.camera().pitch(), pitch);

        viewer.handle_cursor_moved(-3990.0, 9000.0);
        assert!((viewer.camera().yaw() - (yaw + 1.0)).abs() < 1e-4);
    }

    #[test]
    fn render_failure_closes_without_aborting() {
        let mut viewer = viewer();
        viewer.step(0.016);
        assert!(!viewer.should_close());

        viewer
            .graphics_mut()
            .fail_next_present(wgpu::SurfaceError::OutOfMemory);
        assert!(matches!(
            viewer.frame(0.016),
            Err(RenderError::Surface(wgpu::SurfaceError::OutOfMemory))
        ));

        viewer
            .graphics_mut()
            .fail_next_present(wgpu::SurfaceError::OutOfMemory);
        viewer.step(0.016);
        assert!(viewer.should_close());
        assert_eq!(viewer.phase(), AppPhase::Running);
        assert_eq!(viewer.graphics().presented_frames(), 1);
        viewer.shutdown();
        assert_eq!(viewer.phase(), AppPhase::ShuttingDown);
    }

    #[test]
    fn strict_shader_failure_aborts_startup() {
        let result = Viewer::with_shader_sources(
            HeadlessBackend::new(),
            ViewerConfig::default(),
            VERTEX_SHADER,
            "",
        );
        let err = result.err().expect("startup should fail");
        assert!(format!("{err:#}").contains("fragment shader failed to compile"));
    }

    #[test]
    fn permissive_shader_failure_keeps_running_without_draws() {
        let config = ViewerConfig {
            shader_policy: ShaderFailurePolicy::Continue,
            ..ViewerConfig::default()
        };
        let mut viewer =
            Viewer::with_shader_sources(HeadlessBackend::new(), config, "", FRAGMENT_SHADER)
                .unwrap();
        viewer.frame(0.016).unwrap();
        assert_eq!(viewer.phase(), AppPhase::Running);
        assert_eq!(viewer.graphics().presented_frames(), 1);
        assert!(viewer.graphics().draws().is_empty());
    }

    #[test]
    fn shutdown_is_terminal() {
        let mut viewer = viewer();
        viewer.shutdown();
        assert_eq!(viewer.phase(), AppPhase::ShuttingDown);
        let frames = viewer.graphics().presented_frames();
        viewer.frame(0.016).unwrap();
        assert_eq!(viewer.graphics().presented_frames(), frames);
    }
}
