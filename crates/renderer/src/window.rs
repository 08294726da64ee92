use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Sender};
use tracing::{debug, error, info, warn};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use waveform::Capture;

use crate::frame::WaveformArea;
use crate::gpu::GpuState;
use crate::mapping::CoordinateMapper;
use crate::scene::{ChannelId, CursorMode};
use crate::types::RendererConfig;

/// Zoom applied per wheel line.
const ZOOM_STEP: f64 = 1.25;
/// Wheel pixels treated as one line on touchpads.
const PIXELS_PER_LINE: f64 = 40.0;
/// Vertical distance from the trigger arrow that still starts a drag.
const TRIGGER_GRAB: f32 = 8.0;

#[derive(Debug, Clone)]
enum WindowCommand {
    ReplaceCapture {
        channel: ChannelId,
        capture: Arc<Capture>,
    },
    Shutdown,
}

/// Interactive preview window running on its own thread.
pub struct WindowRuntime {
    proxy: EventLoopProxy<WindowCommand>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl WindowRuntime {
    pub fn spawn(config: RendererConfig, area: WaveformArea) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("scopeview-window".into())
            .spawn(move || run_window_thread(config, area, ready_tx))
            .map_err(|err| anyhow!("failed to spawn window thread: {err}"))?;

        let proxy = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread failed to initialise: {err}"))??;

        Ok(Self {
            proxy,
            join_handle: Some(handle),
        })
    }

    /// Hands a new capture to `channel`; the window redraws once it arrives.
    pub fn replace_capture(&self, channel: ChannelId, capture: Arc<Capture>) -> Result<()> {
        self.proxy
            .send_event(WindowCommand::ReplaceCapture { channel, capture })
            .map_err(|_| anyhow!("window has closed"))
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Blocks until the user closes the window.
    pub fn wait(mut self) -> Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))?,
            None => Ok(()),
        }
    }

    pub fn shutdown(mut self) -> Result<()> {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(WindowCommand::Shutdown);
            handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))??;
        }
        Ok(())
    }
}

impl Drop for WindowRuntime {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(WindowCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run_window_thread(
    config: RendererConfig,
    mut area: WaveformArea,
    ready_tx: Sender<Result<EventLoopProxy<WindowCommand>>>,
) -> Result<()> {
    let mut builder = EventLoopBuilder::<WindowCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }
    let event_loop = match builder.build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            let _ = ready_tx.send(Err(anyhow!("failed to create event loop: {err}")));
            return Err(anyhow!("failed to create event loop: {err}"));
        }
    };
    let proxy = event_loop.create_proxy();

    let window = WindowBuilder::new()
        .with_title("scopeview")
        .with_inner_size(PhysicalSize::new(config.surface_size.0, config.surface_size.1))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"));
    let window = match window {
        Ok(window) => Arc::new(window),
        Err(err) => {
            let _ = ready_tx.send(Err(anyhow!("{err}")));
            return Err(err);
        }
    };

    let size = window.inner_size();
    let gpu = match GpuState::windowed(window.as_ref(), (size.width, size.height)) {
        Ok(gpu) => gpu,
        Err(err) => {
            let wrapped = anyhow!("failed to initialise window renderer: {err}");
            let _ = ready_tx.send(Err(anyhow!(wrapped.to_string())));
            return Err(wrapped);
        }
    };

    let _ = ready_tx.send(Ok(proxy));
    info!(width = size.width, height = size.height, "preview window ready");

    // Field order drops the surface before the window it was created from.
    let mut preview = Preview { gpu, window };

    let mut input = PlotInput::default();
    let run_result = event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);
        match event {
            Event::UserEvent(WindowCommand::ReplaceCapture { channel, capture }) => {
                if area.replace_capture(channel, capture) {
                    preview.window.request_redraw();
                } else {
                    warn!(channel = channel.0, "capture for unknown channel dropped");
                }
            }
            Event::UserEvent(WindowCommand::Shutdown) => elwt.exit(),
            Event::WindowEvent { window_id, event } if window_id == preview.window.id() => {
                let size = preview.gpu.size();
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                    WindowEvent::Resized(new_size) => {
                        preview.gpu.resize((new_size.width, new_size.height));
                        preview.window.request_redraw();
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        if input.cursor_moved(&mut area, position, size) {
                            preview.window.request_redraw();
                        }
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        let lines = match delta {
                            MouseScrollDelta::LineDelta(_, y) => f64::from(y),
                            MouseScrollDelta::PixelDelta(pos) => pos.y / PIXELS_PER_LINE,
                        };
                        if input.wheel(&mut area, lines) {
                            preview.window.request_redraw();
                        }
                    }
                    WindowEvent::MouseInput {
                        state: button_state,
                        button,
                        ..
                    } => {
                        if input.button(&mut area, button, button_state, size) {
                            preview.window.request_redraw();
                        }
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.state == ElementState::Pressed && !event.repeat {
                            match event.logical_key {
                                Key::Named(NamedKey::Escape) => elwt.exit(),
                                Key::Character(ref value) if value.as_str() == "c" => {
                                    cycle_cursor_mode(&mut area);
                                    preview.window.request_redraw();
                                }
                                _ => {}
                            }
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(err) = area.render(&mut preview.gpu, size) {
                            warn!(error = %err, "frame skipped");
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    });

    run_result.map_err(|err| {
        error!(error = %err, "window event loop failed");
        anyhow!("window event loop error: {err}")
    })
}

struct Preview {
    gpu: GpuState,
    window: Arc<Window>,
}

fn cycle_cursor_mode(area: &mut WaveformArea) {
    let cursors = &mut area.view_mut().cursors;
    cursors.mode = match cursors.mode {
        CursorMode::None => CursorMode::Single,
        CursorMode::Single => CursorMode::Dual,
        CursorMode::Dual => CursorMode::None,
    };
    debug!(mode = ?cursors.mode, "cursor mode");
}

/// Pointer state for cursor placement, zoom and trigger dragging.
#[derive(Debug, Default)]
struct PlotInput {
    position: Option<PhysicalPosition<f64>>,
}

impl PlotInput {
    fn cursor_moved(
        &mut self,
        area: &mut WaveformArea,
        position: PhysicalPosition<f64>,
        size: (u32, u32),
    ) -> bool {
        self.position = Some(position);
        let dragging = area.view().trigger.is_some_and(|trigger| trigger.dragging);
        if !dragging {
            return false;
        }
        let Some(mapper) = trigger_mapper(area, size) else {
            return false;
        };
        let y = size.1 as f32 - position.y as f32;
        if let Some(trigger) = area.view_mut().trigger.as_mut() {
            trigger.level = mapper.pixel_y_to_volts(y);
        }
        true
    }

    fn wheel(&mut self, area: &mut WaveformArea, lines: f64) -> bool {
        let Some(position) = self.position else {
            return false;
        };
        if lines == 0.0 {
            return false;
        }
        area.view_mut().zoom_about(position.x, ZOOM_STEP.powf(lines));
        true
    }

    fn button(
        &mut self,
        area: &mut WaveformArea,
        button: MouseButton,
        state: ElementState,
        size: (u32, u32),
    ) -> bool {
        let Some(position) = self.position else {
            return false;
        };
        let plot_right = f64::from(area.plot_right(size.0));

        if state == ElementState::Released {
            if let Some(trigger) = area.view_mut().trigger.as_mut() {
                if trigger.dragging {
                    trigger.dragging = false;
                    return true;
                }
            }
            return false;
        }

        if position.x >= plot_right {
            return self.grab_trigger(area, position, size);
        }

        let timebase = area.view().timebase();
        let at = timebase.pixel_to_x_units(position.x).round() as i64;
        let cursors = &mut area.view_mut().cursors;
        match button {
            MouseButton::Left => {
                cursors.positions[0] = at;
                if cursors.mode == CursorMode::None {
                    cursors.mode = CursorMode::Single;
                }
                true
            }
            MouseButton::Right => {
                cursors.positions[1] = at;
                cursors.mode = CursorMode::Dual;
                true
            }
            _ => false,
        }
    }

    fn grab_trigger(
        &mut self,
        area: &mut WaveformArea,
        position: PhysicalPosition<f64>,
        size: (u32, u32),
    ) -> bool {
        let Some(mapper) = trigger_mapper(area, size) else {
            return false;
        };
        let y = size.1 as f32 - position.y as f32;
        match area.view_mut().trigger.as_mut() {
            Some(trigger) if (mapper.volts_to_pixel_y(trigger.level) - y).abs() <= TRIGGER_GRAB => {
                trigger.dragging = true;
                true
            }
            _ => false,
        }
    }
}

/// Vertical mapping of the channel the trigger marker belongs to.
fn trigger_mapper(area: &WaveformArea, size: (u32, u32)) -> Option<CoordinateMapper> {
    let trigger = area.view().trigger?;
    let channel = area.channels().iter().find(|c| c.id == trigger.channel)?;
    Some(CoordinateMapper::new(
        area.view().timebase(),
        size.1 as f32,
        channel.range,
        channel.offset,
        area.display().padding,
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::font::BitmapFont;
    use crate::mapping::Timebase;
    use crate::scene::{Channel, TriggerMarker, ViewGroup};
    use crate::types::DisplaySettings;

    fn area() -> WaveformArea {
        let mut channel = Channel::new(ChannelId(1), "CH1");
        channel.range = 2.0;
        let mut view = ViewGroup::new(Timebase::new(1.0, 0));
        view.trigger = Some(TriggerMarker {
            channel: ChannelId(1),
            level: 0.0,
            dragging: false,
        });
        WaveformArea::new(
            vec![channel],
            Vec::new(),
            view,
            DisplaySettings::default(),
            Box::new(BitmapFont::default()),
            Duration::ZERO,
        )
    }

    #[test]
    fn clicks_place_cursors_in_time_units() {
        let mut area = area();
        area.view_mut().set_timebase(Timebase::new(2.0, 100));
        let mut input = PlotInput::default();
        input.cursor_moved(&mut area, PhysicalPosition::new(40.0, 10.0), (400, 100));
        assert!(input.button(&mut area, MouseButton::Left, ElementState::Pressed, (400, 100)));
        assert_eq!(area.view().cursors.positions[0], 120);
        assert_eq!(area.view().cursors.mode, CursorMode::Single);

        input.cursor_moved(&mut area, PhysicalPosition::new(60.0, 10.0), (400, 100));
        input.button(&mut area, MouseButton::Right, ElementState::Pressed, (400, 100));
        assert_eq!(area.view().cursors.positions, [120, 130]);
        assert_eq!(area.view().cursors.mode, CursorMode::Dual);
    }

    #[test]
    fn wheel_zooms_about_pointer() {
        let mut area = area();
        let mut input = PlotInput::default();
        assert!(!input.wheel(&mut area, 1.0));
        input.cursor_moved(&mut area, PhysicalPosition::new(50.0, 10.0), (400, 100));
        let before = area.view().revision();
        assert!(input.wheel(&mut area, 1.0));
        let timebase = area.view().timebase();
        assert!(area.view().revision() > before);
        assert!((timebase.pixels_per_x_unit - 1.25).abs() < 1e-9);
        assert!((timebase.pixel_to_x_units(50.0) - 50.0).abs() <= 1.0);
    }

    #[test]
    fn trigger_drags_from_the_gutter() {
        let mut area = area();
        let size = (400, 100);
        let gutter = f64::from(area.plot_right(size.0)) + 4.0;
        let mut input = PlotInput::default();

        input.cursor_moved(&mut area, PhysicalPosition::new(gutter, 50.0), size);
        assert!(input.button(&mut area, MouseButton::Left, ElementState::Pressed, size));
        assert!(area.view().trigger.unwrap().dragging);

        assert!(input.cursor_moved(&mut area, PhysicalPosition::new(gutter, 25.0), size));
        let level = area.view().trigger.unwrap().level;
        assert!(level > 0.0, "dragging up raises the level: {level}");

        assert!(input.button(&mut area, MouseButton::Left, ElementState::Released, size));
        assert!(!area.view().trigger.unwrap().dragging);
        assert!(!input.cursor_moved(&mut area, PhysicalPosition::new(gutter, 10.0), size));
    }

    #[test]
    fn cursor_mode_cycles() {
        let mut area = area();
        cycle_cursor_mode(&mut area);
        assert_eq!(area.view().cursors.mode, CursorMode::Single);
        cycle_cursor_mode(&mut area);
        cycle_cursor_mode(&mut area);
        assert_eq!(area.view().cursors.mode, CursorMode::None);
    }
}
