use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{Context, Result};
use glam::Vec2;
use log::{info, warn};
use pollster::block_on;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, Event, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowBuilder};

use cone_viewer::{FrameClock, KeyCode, NamedKey, Viewer, ViewerConfig, WgpuBackend};

/// Pixels per scroll line for touchpads that report pixel deltas.
const PIXELS_PER_LINE: f64 = 20.0;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        if err.downcast_ref::<WindowInitError>().is_some() {
            eprintln!("Set DISPLAY or WAYLAND_DISPLAY to a running display server.");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = ViewerConfig::default();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(false)
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );
    capture_cursor(&window);

    let backend = block_on(WgpuBackend::new(Arc::clone(&window)))?;
    let mut app = AppState {
        viewer: Viewer::new(backend, config)?,
        clock: FrameClock::new(),
        cursor: Vec2::ZERO,
        focused: true,
    };

    event_loop
        .run(|event, target| {
            target.set_control_flow(ControlFlow::Poll);
            app.process_event(event);
            if app.viewer.should_close() {
                target.exit();
            }
        })
        .context("event loop failed")?;

    app.viewer.shutdown();
    Ok(())
}

struct AppState {
    viewer: Viewer<WgpuBackend>,
    clock: FrameClock,
    /// Unbounded cursor position accumulated from raw mouse motion.
    cursor: Vec2,
    focused: bool,
}

impl AppState {
    fn process_event(&mut self, event: Event<()>) {
        match event {
            Event::WindowEvent { event, window_id }
                if window_id == self.viewer.graphics().window_id() =>
            {
                match event {
                    WindowEvent::CloseRequested => self.viewer.request_close(),
                    WindowEvent::Resized(size) => {
                        self.viewer.graphics_mut().resize(size);
                        self.viewer.handle_resize(size.width, size.height);
                    }
                    WindowEvent::Focused(focused) => {
                        self.focused = focused;
                        if focused {
                            capture_cursor(self.viewer.graphics().window());
                        } else {
                            self.viewer.handle_focus_lost();
                        }
                    }
                    WindowEvent::KeyboardInput { event, .. } => self.handle_keyboard(&event),
                    WindowEvent::MouseWheel { delta, .. } => {
                        let lines = match delta {
                            MouseScrollDelta::LineDelta(_, y) => y,
                            MouseScrollDelta::PixelDelta(position) => {
                                (position.y / PIXELS_PER_LINE) as f32
                            }
                        };
                        self.viewer.handle_scroll(lines);
                    }
                    WindowEvent::RedrawRequested => {
                        let delta_time = self.clock.tick();
                        self.viewer.step(delta_time);
                    }
                    _ => {}
                }
            }
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta },
                ..
            } if self.focused => {
                self.cursor += Vec2::new(delta.0 as f32, delta.1 as f32);
                self.viewer.handle_cursor_moved(self.cursor.x, self.cursor.y);
            }
            Event::AboutToWait => {
                self.viewer.graphics().window().request_redraw();
            }
            _ => {}
        }
    }

    fn handle_keyboard(&mut self, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let Some(key) = map_keycode(code) else {
            return;
        };
        self.viewer.handle_key(key, event.state == ElementState::Pressed);
    }
}

/// Hides the cursor and keeps it inside the window, like a disabled cursor
/// in a first-person camera.
fn capture_cursor(window: &Window) {
    let grabbed = window
        .set_cursor_grab(CursorGrabMode::Locked)
        .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
    match grabbed {
        Ok(()) => info!("cursor captured"),
        Err(err) => warn!("unable to capture cursor: {err}"),
    }
    window.set_cursor_visible(false);
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

fn map_keycode(code: WinitKeyCode) -> Option<KeyCode> {
    Some(match code {
        WinitKeyCode::Escape => KeyCode::Named(NamedKey::Escape),
        WinitKeyCode::KeyA => KeyCode::Character('A'),
        WinitKeyCode::KeyD => KeyCode::Character('D'),
        WinitKeyCode::KeyS => KeyCode::Character('S'),
        WinitKeyCode::KeyW => KeyCode::Character('W'),
        _ => return None,
    })
}
