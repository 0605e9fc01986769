use cone_viewer::scene::OBJECT_POSITIONS;
use cone_viewer::{HeadlessBackend, KeyCode, NamedKey, Viewer, ViewerConfig};
use glam::{Mat4, Vec3};

fn viewer() -> Viewer<HeadlessBackend> {
    Viewer::new(HeadlessBackend::new(), ViewerConfig::default()).expect("viewer starts")
}

#[test]
fn frame_draws_six_cones_with_twelve_indices() {
    let mut viewer = viewer();
    viewer.frame(0.016).expect("frame renders");

    let gfx = viewer.graphics();
    assert_eq!(gfx.presented_frames(), 1);
    assert_eq!(gfx.clear_color(), Some([0.3, 0.3, 0.3, 1.0]));
    assert_eq!(gfx.draws().len(), 6);
    for draw in gfx.draws() {
        assert_eq!(draw.index_count, 12);
        assert_eq!(Some(draw.program), gfx.active_program());
    }
}

#[test]
fn each_cone_sits_at_its_own_position_and_rotation() {
    let mut viewer = viewer();
    viewer.frame(0.016).unwrap();

    let models: Vec<Mat4> = viewer
        .graphics()
        .draws()
        .iter()
        .map(|draw| draw.uniforms.model())
        .collect();
    for (model, position) in models.iter().zip(OBJECT_POSITIONS) {
        assert!(model.w_axis.truncate().abs_diff_eq(position, 1e-5));
    }
    for (i, a) in models.iter().enumerate() {
        for b in &models[i + 1..] {
            assert!(!a.abs_diff_eq(*b, 1e-4));
        }
    }
    // The first cone is not rotated.
    assert!(models[0].abs_diff_eq(Mat4::from_translation(OBJECT_POSITIONS[0]), 1e-6));
}

#[test]
fn frame_uniforms_carry_material_light_and_camera() {
    let mut viewer = viewer();
    viewer.frame(0.016).unwrap();

    let uniforms = &viewer.graphics().draws()[0].uniforms;
    assert_eq!(uniforms.object_color, [1.0, 0.5, 0.5]);
    assert_eq!(uniforms.shininess, 32.0);
    assert_eq!(uniforms.view_pos, [0.0, 0.0, 5.0]);
    assert_eq!(uniforms.light_position, [1.0, 1.0, 1.0]);
    assert_eq!(uniforms.light_ambient, [0.375; 3]);
    assert_eq!(uniforms.light_diffuse, [0.75; 3]);
    assert_eq!(uniforms.light_specular, [1.0; 3]);
    assert!(uniforms
        .view()
        .abs_diff_eq(viewer.camera().view_matrix(), 1e-6));
}

#[test]
fn holding_w_for_one_second_moves_forward() {
    let mut viewer = viewer();
    viewer.handle_key(KeyCode::Character('W'), true);
    viewer.frame(1.0).unwrap();
    assert!(viewer
        .camera()
        .position()
        .abs_diff_eq(Vec3::new(0.0, 0.0, 2.5), 1e-5));

    viewer.handle_key(KeyCode::Character('W'), false);
    viewer.frame(1.0).unwrap();
    assert!(viewer
        .camera()
        .position()
        .abs_diff_eq(Vec3::new(0.0, 0.0, 2.5), 1e-5));
}

#[test]
fn first_cursor_event_does_not_jump() {
    let mut viewer = viewer();
    viewer.handle_cursor_moved(5000.0, -3000.0);
    assert_eq!(viewer.camera().yaw(), -90.0);
    assert_eq!(viewer.camera().pitch(), 0.0);

    viewer.handle_cursor_moved(5100.0, -3050.0);
    assert!((viewer.camera().yaw() - -80.0).abs() < 1e-4);
    assert!((viewer.camera().pitch() - 5.0).abs() < 1e-4);
}

#[test]
fn pitch_stays_clamped_under_large_mouse_motion() {
    let mut viewer = viewer();
    viewer.handle_cursor_moved(0.0, 0.0);
    viewer.handle_cursor_moved(0.0, -10_000.0);
    assert_eq!(viewer.camera().pitch(), 89.0);
    viewer.handle_cursor_moved(0.0, 10_000.0);
    assert_eq!(viewer.camera().pitch(), -89.0);
}

#[test]
fn scroll_zoom_saturates() {
    let mut viewer = viewer();
    viewer.handle_scroll(100.0);
    assert_eq!(viewer.camera().zoom(), 1.0);
    viewer.frame(0.016).unwrap();
    let projection = viewer.graphics().draws()[0].uniforms.projection();
    let expected = viewer.camera().projection_matrix(1200.0 / 900.0);
    assert!(projection.abs_diff_eq(expected, 1e-6));

    viewer.handle_scroll(-100.0);
    assert_eq!(viewer.camera().zoom(), 45.0);
}

#[test]
fn escape_ends_the_session() {
    let mut viewer = viewer();
    viewer.handle_key(KeyCode::Named(NamedKey::Escape), true);
    assert!(viewer.should_close());
    viewer.shutdown();
    viewer.frame(0.016).unwrap();
    assert_eq!(viewer.graphics().presented_frames(), 0);
}
