//! Layout geometry shared by the compositor and the preview.
//!
//! Everything here is pure math on canvas/source sizes; the compositor turns
//! the results into tiny-skia transforms and clip paths.

use tiny_skia::{Path, PathBuilder, Rect};

use crate::models::config::{CompositionConfig, Layout};

/// Cubic bezier control distance for a quarter circle.
pub const BEZIER_K: f32 = 0.552_284_8;

/// Integer overlay placement on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl OverlayRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn to_fit_rect(self) -> FitRect {
        FitRect {
            x: self.x as f32,
            y: self.y as f32,
            width: self.width as f32,
            height: self.height as f32,
        }
    }
}

/// Floating-point destination rectangle for a scaled source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Overlay rectangle for the configured anchor.
///
/// Padding is applied on the two edges the anchor touches. On canvases too
/// small for the scaled overlay, padding is capped at half the axis and the
/// overlay shrinks to fit, so the result always lies inside the canvas.
pub fn overlay_rect(config: &CompositionConfig) -> OverlayRect {
    let (cw, ch) = (config.canvas_width, config.canvas_height);
    let pad_x = config.padding.min(cw / 2);
    let pad_y = config.padding.min(ch / 2);

    let mut width = config.overlay_width.min(cw - 2 * pad_x);
    let mut height = config.overlay_height.min(ch - 2 * pad_y);
    if config.layout == Layout::Circle {
        let side = width.min(height);
        width = side;
        height = side;
    }

    let anchor = config.overlay_anchor;
    let x = if anchor.is_left() { pad_x } else { cw - width - pad_x };
    let y = if anchor.is_top() { pad_y } else { ch - height - pad_y };

    OverlayRect { x, y, width, height }
}

/// Scale `src` into `dst` preserving aspect ratio, centered (letterboxed).
pub fn contain_fit(src_width: u32, src_height: u32, dst: FitRect) -> FitRect {
    fit(src_width, src_height, dst, f32::min)
}

/// Scale `src` to cover `dst` preserving aspect ratio, centered (cropped).
///
/// For a square `dst` this is the largest centered square of the source,
/// scaled to the square.
pub fn cover_fit(src_width: u32, src_height: u32, dst: FitRect) -> FitRect {
    fit(src_width, src_height, dst, f32::max)
}

fn fit(src_width: u32, src_height: u32, dst: FitRect, pick: fn(f32, f32) -> f32) -> FitRect {
    if src_width == 0 || src_height == 0 {
        return dst;
    }
    let scale = pick(dst.width / src_width as f32, dst.height / src_height as f32);
    let width = src_width as f32 * scale;
    let height = src_height as f32 * scale;
    FitRect {
        x: dst.x + (dst.width - width) / 2.0,
        y: dst.y + (dst.height - height) / 2.0,
        width,
        height,
    }
}

/// Rounded rectangle outline, radius clamped to half the shorter side.
pub fn rounded_rect_path(rect: FitRect, radius: f32) -> Option<Path> {
    let radius = radius.min(rect.width / 2.0).min(rect.height / 2.0).max(0.0);
    if radius <= 0.0 {
        let r = Rect::from_xywh(rect.x, rect.y, rect.width, rect.height)?;
        return Some(PathBuilder::from_rect(r));
    }

    let (left, top) = (rect.x, rect.y);
    let (right, bottom) = (rect.x + rect.width, rect.y + rect.height);
    let k = radius * (1.0 - BEZIER_K);

    let mut pb = PathBuilder::new();
    pb.move_to(left + radius, top);
    pb.line_to(right - radius, top);
    pb.cubic_to(right - k, top, right, top + k, right, top + radius);
    pb.line_to(right, bottom - radius);
    pb.cubic_to(right, bottom - k, right - k, bottom, right - radius, bottom);
    pb.line_to(left + radius, bottom);
    pb.cubic_to(left + k, bottom, left, bottom - k, left, bottom - radius);
    pb.line_to(left, top + radius);
    pb.cubic_to(left, top + k, left + k, top, left + radius, top);
    pb.close();
    pb.finish()
}

/// Circle inscribed in `rect` (diameter = the shorter side).
pub fn circle_path(rect: FitRect) -> Option<Path> {
    let radius = rect.width.min(rect.height) / 2.0;
    PathBuilder::from_circle(rect.x + rect.width / 2.0, rect.y + rect.height / 2.0, radius)
}

/// Clip outline for the configured layout.
pub fn overlay_clip_path(config: &CompositionConfig, rect: OverlayRect) -> Option<Path> {
    if rect.width == 0 || rect.height == 0 {
        return None;
    }
    match config.layout {
        Layout::PictureInPicture => rounded_rect_path(rect.to_fit_rect(), config.corner_radius()),
        Layout::Circle => circle_path(rect.to_fit_rect()),
    }
}

/// Canvas size the encoder should target for the given source sizes.
///
/// The screen defines the canvas whenever it is known. After the screen
/// goes away the canvas keeps its size so the encoder target does not move.
pub fn desired_canvas(
    screen: Option<(u32, u32)>,
    camera: Option<(u32, u32)>,
    current: Option<(u32, u32)>,
) -> Option<(u32, u32)> {
    screen.or(current).or(camera)
}
