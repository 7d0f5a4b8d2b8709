//! Station window: canvas display and operator key input.

use std::collections::HashSet;

use image::RgbImage;
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use rollcall_store::RosterEntry;
use thiserror::Error;

use crate::render::{FaceOverlay, Renderer};
use crate::session::FeedEntry;

const WINDOW_TITLE: &str = "Rollcall Attendance Station";
const TARGET_FPS: usize = 60;

#[derive(Error, Debug)]
pub enum UiError {
    #[error("window error: {0}")]
    Window(String),
}

/// Operator input relevant to the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UiEvent {
    Quit,
    EnterFullscreen,
    ExitFullscreen,
}

/// Everything the display needs to draw one frame.
pub struct FrameView<'a> {
    pub frame: &'a RgbImage,
    pub overlays: &'a [FaceOverlay],
    pub feed: &'a [FeedEntry],
    pub roster: &'a [RosterEntry],
    pub present: &'a HashSet<i64>,
}

/// Display seam for the recognition loop. The production implementation is
/// a minifb window; tests substitute a scripted fake.
pub trait Ui {
    fn present(&mut self, view: &FrameView) -> Result<Vec<UiEvent>, UiError>;
    fn set_fullscreen(&mut self, enabled: bool) -> Result<(), UiError>;
}

/// minifb-backed station window owning the overlay renderer.
pub struct StationWindow {
    window: Window,
    renderer: Renderer,
    buffer: Vec<u32>,
    fullscreen: bool,
}

impl StationWindow {
    pub fn new(renderer: Renderer) -> Result<Self, UiError> {
        let layout = renderer.layout();
        let window = open_window(layout.width as usize, layout.height as usize, false)?;
        Ok(Self {
            window,
            renderer,
            buffer: Vec::new(),
            fullscreen: false,
        })
    }
}

fn open_window(width: usize, height: usize, borderless: bool) -> Result<Window, UiError> {
    let mut window = Window::new(
        WINDOW_TITLE,
        width,
        height,
        WindowOptions {
            resize: true,
            borderless,
            topmost: borderless,
            ..WindowOptions::default()
        },
    )
    .map_err(|e| UiError::Window(e.to_string()))?;
    window.set_target_fps(TARGET_FPS);
    Ok(window)
}

impl Ui for StationWindow {
    fn present(&mut self, view: &FrameView) -> Result<Vec<UiEvent>, UiError> {
        let canvas = self.renderer.compose(
            view.frame,
            view.overlays,
            view.feed,
            view.roster,
            view.present,
        );
        rgb_to_argb(&canvas, &mut self.buffer);
        self.window
            .update_with_buffer(
                &self.buffer,
                canvas.width() as usize,
                canvas.height() as usize,
            )
            .map_err(|e| UiError::Window(e.to_string()))?;

        let mut events = Vec::new();
        if !self.window.is_open() || self.window.is_key_pressed(Key::Q, KeyRepeat::No) {
            events.push(UiEvent::Quit);
        }
        if self.window.is_key_pressed(Key::F, KeyRepeat::No) {
            events.push(UiEvent::EnterFullscreen);
        }
        if self.window.is_key_pressed(Key::N, KeyRepeat::No) {
            events.push(UiEvent::ExitFullscreen);
        }
        Ok(events)
    }

    /// minifb has no native fullscreen; kiosk mode is emulated by recreating
    /// the window borderless and topmost.
    fn set_fullscreen(&mut self, enabled: bool) -> Result<(), UiError> {
        if self.fullscreen == enabled {
            return Ok(());
        }
        let layout = self.renderer.layout();
        self.window = open_window(layout.width as usize, layout.height as usize, enabled)?;
        self.fullscreen = enabled;
        Ok(())
    }
}

/// Pack RGB8 pixels into the 0RGB u32 layout minifb expects.
fn rgb_to_argb(canvas: &RgbImage, out: &mut Vec<u32>) {
    out.clear();
    out.reserve(canvas.width() as usize * canvas.height() as usize);
    for pixel in canvas.pixels() {
        let [r, g, b] = pixel.0;
        out.push(((r as u32) << 16) | ((g as u32) << 8) | b as u32);
    }
}
