//! Overlay canvas composition.
//!
//! The station canvas is the scaled video area, a bottom panel listing
//! recent check-ins, and a side panel with the full roster marked
//! present/absent. Face boxes are color-coded: green for recorded students,
//! yellow while the blink check is pending (with a live EAR readout), red
//! for unknown faces.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rollcall_core::types::BoundingBox;
use rollcall_store::RosterEntry;
use thiserror::Error;

use crate::session::FeedEntry;

const COLOR_PANEL_BG: Rgb<u8> = Rgb([40, 40, 40]);
const COLOR_HEADER: Rgb<u8> = Rgb([255, 255, 255]);
const COLOR_PRESENT: Rgb<u8> = Rgb([0, 255, 0]);
const COLOR_ABSENT: Rgb<u8> = Rgb([200, 200, 200]);
const COLOR_BOX_PRESENT: Rgb<u8> = Rgb([0, 255, 0]);
const COLOR_BOX_LIVENESS: Rgb<u8> = Rgb([255, 255, 0]);
const COLOR_BOX_UNKNOWN: Rgb<u8> = Rgb([255, 0, 0]);
const COLOR_EAR_TEXT: Rgb<u8> = Rgb([0, 255, 255]);
const COLOR_LABEL_TEXT: Rgb<u8> = Rgb([0, 0, 0]);

const LABEL_STRIP_HEIGHT: i32 = 22;
const LINE_HEIGHT: i32 = 22;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayKind {
    Unknown,
    PendingLiveness,
    Present,
}

/// One face box to draw this frame.
pub struct FaceOverlay {
    pub bbox: BoundingBox,
    pub label: String,
    pub kind: OverlayKind,
    /// Shown above the box while the blink check is running.
    pub ear: Option<f32>,
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to read font {path}: {source}")]
    FontRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font data in {path}")]
    FontParse { path: PathBuf },
}

/// Pixel layout of the station canvas.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub roster_panel_width: u32,
    pub feed_panel_height: u32,
}

impl Layout {
    /// Video area: everything left of the roster panel and above the feed
    /// panel.
    pub fn video_size(&self) -> (u32, u32) {
        (
            self.width.saturating_sub(self.roster_panel_width).max(1),
            self.height.saturating_sub(self.feed_panel_height).max(1),
        )
    }

    /// Map a frame-space box into video-area pixels, clamped to the area.
    pub fn map_box(
        &self,
        bbox: &BoundingBox,
        frame_w: u32,
        frame_h: u32,
    ) -> (i32, i32, i32, i32) {
        let (vw, vh) = self.video_size();
        let sx = vw as f32 / frame_w.max(1) as f32;
        let sy = vh as f32 / frame_h.max(1) as f32;
        (
            ((bbox.left * sx).round() as i32).clamp(0, vw as i32),
            ((bbox.top * sy).round() as i32).clamp(0, vh as i32),
            ((bbox.right * sx).round() as i32).clamp(0, vw as i32),
            ((bbox.bottom * sy).round() as i32).clamp(0, vh as i32),
        )
    }
}

pub struct Renderer {
    font: FontVec,
    layout: Layout,
}

impl Renderer {
    pub fn new(font_path: &Path, layout: Layout) -> Result<Self, RenderError> {
        let bytes = std::fs::read(font_path).map_err(|source| RenderError::FontRead {
            path: font_path.to_path_buf(),
            source,
        })?;
        let font = FontVec::try_from_vec(bytes).map_err(|_| RenderError::FontParse {
            path: font_path.to_path_buf(),
        })?;
        Ok(Self { font, layout })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Compose the full station canvas for one frame.
    pub fn compose(
        &self,
        frame: &RgbImage,
        overlays: &[FaceOverlay],
        feed: &[FeedEntry],
        roster: &[RosterEntry],
        present: &HashSet<i64>,
    ) -> RgbImage {
        let mut canvas = RgbImage::new(self.layout.width, self.layout.height);
        let (vw, vh) = self.layout.video_size();

        let scaled =
            image::imageops::resize(frame, vw, vh, image::imageops::FilterType::Triangle);
        image::imageops::replace(&mut canvas, &scaled, 0, 0);

        for overlay in overlays {
            self.draw_face(&mut canvas, overlay, frame.width(), frame.height());
        }

        self.draw_feed_panel(&mut canvas, feed);
        self.draw_roster_panel(&mut canvas, roster, present);
        canvas
    }

    fn draw_face(&self, canvas: &mut RgbImage, overlay: &FaceOverlay, fw: u32, fh: u32) {
        let (l, t, r, b) = self.layout.map_box(&overlay.bbox, fw, fh);
        if r <= l || b <= t {
            return;
        }

        let color = match overlay.kind {
            OverlayKind::Unknown => COLOR_BOX_UNKNOWN,
            OverlayKind::PendingLiveness => COLOR_BOX_LIVENESS,
            OverlayKind::Present => COLOR_BOX_PRESENT,
        };

        let w = (r - l) as u32;
        let h = (b - t) as u32;
        draw_hollow_rect_mut(canvas, Rect::at(l, t).of_size(w, h), color);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(canvas, Rect::at(l + 1, t + 1).of_size(w - 2, h - 2), color);
        }

        let strip_t = (b - LABEL_STRIP_HEIGHT).max(t);
        draw_filled_rect_mut(
            canvas,
            Rect::at(l, strip_t).of_size(w, (b - strip_t).max(1) as u32),
            color,
        );
        draw_text_mut(
            canvas,
            COLOR_LABEL_TEXT,
            l + 6,
            strip_t + 3,
            PxScale::from(16.0),
            &self.font,
            &overlay.label,
        );

        if let Some(ear) = overlay.ear {
            draw_text_mut(
                canvas,
                COLOR_EAR_TEXT,
                l,
                (t - 18).max(0),
                PxScale::from(16.0),
                &self.font,
                &format!("EAR: {ear:.2}"),
            );
        }
    }

    fn draw_feed_panel(&self, canvas: &mut RgbImage, feed: &[FeedEntry]) {
        let (vw, vh) = self.layout.video_size();
        let y0 = vh as i32;
        draw_filled_rect_mut(
            canvas,
            Rect::at(0, y0).of_size(vw, self.layout.feed_panel_height.max(1)),
            COLOR_PANEL_BG,
        );
        draw_text_mut(
            canvas,
            COLOR_HEADER,
            10,
            y0 + 8,
            PxScale::from(22.0),
            &self.font,
            "RECENT CHECK-INS",
        );

        let mut y = y0 + 44;
        for entry in feed {
            let text = format!("{} ({}) - {}", entry.name, entry.matric_no, entry.time);
            draw_text_mut(canvas, COLOR_PRESENT, 10, y, PxScale::from(17.0), &self.font, &text);
            y += LINE_HEIGHT;
        }
    }

    fn draw_roster_panel(
        &self,
        canvas: &mut RgbImage,
        roster: &[RosterEntry],
        present: &HashSet<i64>,
    ) {
        let x0 = self.layout.width.saturating_sub(self.layout.roster_panel_width) as i32;
        draw_filled_rect_mut(
            canvas,
            Rect::at(x0, 0).of_size(self.layout.roster_panel_width.max(1), self.layout.height),
            COLOR_PANEL_BG,
        );
        draw_text_mut(
            canvas,
            COLOR_HEADER,
            x0 + 10,
            10,
            PxScale::from(22.0),
            &self.font,
            "STUDENT ROSTER",
        );

        let mut y = 48;
        for (i, student) in roster.iter().enumerate() {
            let is_present = present.contains(&student.student_id);
            let (mark, color) = if is_present {
                ("[IN]", COLOR_PRESENT)
            } else {
                ("[--]", COLOR_ABSENT)
            };
            draw_text_mut(
                canvas,
                color,
                x0 + 10,
                y,
                PxScale::from(17.0),
                &self.font,
                &format!("{mark} {}", student.name),
            );
            y += LINE_HEIGHT;
            if y > self.layout.height as i32 - LINE_HEIGHT {
                if i + 1 < roster.len() {
                    draw_text_mut(
                        canvas,
                        COLOR_HEADER,
                        x0 + 10,
                        y,
                        PxScale::from(17.0),
                        &self.font,
                        "...",
                    );
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout {
            width: 1600,
            height: 900,
            roster_panel_width: 500,
            feed_panel_height: 200,
        }
    }

    #[test]
    fn test_video_size() {
        assert_eq!(layout().video_size(), (1100, 700));
    }

    #[test]
    fn test_video_size_never_zero() {
        let l = Layout { width: 100, height: 100, roster_panel_width: 200, feed_panel_height: 200 };
        assert_eq!(l.video_size(), (1, 1));
    }

    #[test]
    fn test_map_box_scales_into_video_area() {
        // 550x350 frame into a 1100x700 video area: everything doubles
        let bbox = BoundingBox { top: 10.0, right: 100.0, bottom: 60.0, left: 20.0 };
        let (l, t, r, b) = layout().map_box(&bbox, 550, 350);
        assert_eq!((l, t, r, b), (40, 20, 200, 120));
    }

    #[test]
    fn test_map_box_clamps_to_video_area() {
        let bbox = BoundingBox { top: -50.0, right: 2000.0, bottom: 5000.0, left: -10.0 };
        let (l, t, r, b) = layout().map_box(&bbox, 550, 350);
        assert_eq!((l, t), (0, 0));
        assert_eq!((r, b), (1100, 700));
    }

    #[test]
    fn test_map_box_degenerate_frame() {
        let bbox = BoundingBox { top: 0.0, right: 10.0, bottom: 10.0, left: 0.0 };
        // A zero-sized frame must not divide by zero
        let (l, t, _, _) = layout().map_box(&bbox, 0, 0);
        assert!(l >= 0 && t >= 0);
    }
}
