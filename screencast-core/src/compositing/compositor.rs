use tiny_skia::{
    Color, FillRule, FilterQuality, Mask, Paint, Path, Pixmap, PixmapPaint, PixmapRef, Stroke, Transform,
};

use super::geometry::{self, FitRect, OverlayRect};
use crate::models::config::{CompositionConfig, BORDER_WIDTH};
use crate::models::error::CaptureError;
use crate::models::frame::VideoFrame;

/// Frames available to the compositor on one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositorInput<'a> {
    pub screen: Option<&'a VideoFrame>,
    pub camera: Option<&'a VideoFrame>,
}

/// Clip mask and outline for the current overlay geometry.
struct OverlayShape {
    rect: OverlayRect,
    path: Path,
    mask: Mask,
}

/// Draws 0–2 video sources onto one canvas.
///
/// The canvas is a single pixmap overwritten on every call; callers get a
/// snapshot of it as a [`VideoFrame`].
pub struct FrameCompositor {
    config: CompositionConfig,
    canvas: Pixmap,
    overlay: Option<OverlayShape>,
    frames_produced: u64,
}

impl FrameCompositor {
    pub fn new(config: CompositionConfig) -> Result<Self, CaptureError> {
        Ok(Self {
            canvas: new_canvas(&config)?,
            config,
            overlay: None,
            frames_produced: 0,
        })
    }

    pub fn config(&self) -> &CompositionConfig {
        &self.config
    }

    /// Apply new geometry. The canvas is reallocated only if its size changed.
    pub fn reconfigure(&mut self, config: CompositionConfig) -> Result<(), CaptureError> {
        if config == self.config {
            return Ok(());
        }
        if (config.canvas_width, config.canvas_height) != (self.config.canvas_width, self.config.canvas_height) {
            self.canvas = new_canvas(&config)?;
        }
        self.config = config;
        self.overlay = None;
        Ok(())
    }

    /// Number of frames composited since construction.
    pub fn frames_produced(&self) -> u64 {
        self.frames_produced
    }

    /// Composite one frame.
    ///
    /// - no sources: solid black
    /// - one source: contain-fit; a lone camera is mirrored
    /// - screen + camera: screen background, mirrored camera overlay clipped
    ///   to the layout shape with a border
    pub fn composite(&mut self, input: CompositorInput<'_>) -> VideoFrame {
        self.canvas.fill(Color::BLACK);

        match (input.screen, input.camera) {
            (None, None) => {}
            (Some(screen), None) => self.draw_full(screen, false),
            (None, Some(camera)) => self.draw_full(camera, true),
            (Some(screen), Some(camera)) => {
                self.draw_full(screen, false);
                self.draw_overlay(camera);
            }
        }

        self.frames_produced += 1;
        self.snapshot()
    }

    /// Copy of the canvas as it currently stands.
    pub fn snapshot(&self) -> VideoFrame {
        VideoFrame::from_rgba_image(
            image::RgbaImage::from_raw(
                self.config.canvas_width,
                self.config.canvas_height,
                self.canvas.data().to_vec(),
            )
            .unwrap_or_else(|| image::RgbaImage::new(self.config.canvas_width, self.config.canvas_height)),
        )
    }

    fn draw_full(&mut self, frame: &VideoFrame, mirrored: bool) {
        let dst = FitRect {
            x: 0.0,
            y: 0.0,
            width: self.config.canvas_width as f32,
            height: self.config.canvas_height as f32,
        };
        let fit = geometry::contain_fit(frame.width(), frame.height(), dst);
        draw_frame(&mut self.canvas, frame, fit, mirrored, None);
    }

    fn draw_overlay(&mut self, camera: &VideoFrame) {
        let rect = geometry::overlay_rect(&self.config);
        if self.overlay.as_ref().map(|o| o.rect) != Some(rect) {
            self.overlay = build_overlay_shape(&self.config, rect);
        }
        let Some(shape) = self.overlay.as_ref() else {
            return;
        };

        let fit = geometry::cover_fit(camera.width(), camera.height(), rect.to_fit_rect());
        draw_frame(&mut self.canvas, camera, fit, true, Some(&shape.mask));

        let mut paint = Paint::default();
        paint.set_color_rgba8(255, 255, 255, 255);
        paint.anti_alias = true;
        let stroke = Stroke {
            width: BORDER_WIDTH,
            ..Stroke::default()
        };
        self.canvas
            .stroke_path(&shape.path, &paint, &stroke, Transform::identity(), None);
    }
}

fn new_canvas(config: &CompositionConfig) -> Result<Pixmap, CaptureError> {
    Pixmap::new(config.canvas_width, config.canvas_height).ok_or_else(|| {
        CaptureError::ConfigurationFailed(format!(
            "cannot allocate {}x{} canvas",
            config.canvas_width, config.canvas_height
        ))
    })
}

fn build_overlay_shape(config: &CompositionConfig, rect: OverlayRect) -> Option<OverlayShape> {
    let path = geometry::overlay_clip_path(config, rect)?;
    let mut mask = Mask::new(config.canvas_width, config.canvas_height)?;
    mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
    Some(OverlayShape { rect, path, mask })
}

/// Draw `frame` scaled into `dst`, optionally mirrored horizontally.
fn draw_frame(canvas: &mut Pixmap, frame: &VideoFrame, dst: FitRect, mirrored: bool, mask: Option<&Mask>) {
    let Some(source) = PixmapRef::from_bytes(frame.data(), frame.width(), frame.height()) else {
        log::debug!("skipping frame with inconsistent buffer {:?}", frame);
        return;
    };

    let sx = dst.width / frame.width() as f32;
    let sy = dst.height / frame.height() as f32;
    let transform = if mirrored {
        Transform::from_row(-sx, 0.0, 0.0, sy, dst.x + dst.width, dst.y)
    } else {
        Transform::from_row(sx, 0.0, 0.0, sy, dst.x, dst.y)
    };

    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    canvas.draw_pixmap(0, 0, source, &paint, transform, mask);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::{Anchor, Layout};

    const RED: [u8; 4] = [255, 0, 0, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];
    const BLACK: [u8; 4] = [0, 0, 0, 255];

    /// Left half `left`, right half `right`.
    fn split_frame(width: u32, height: u32, left: [u8; 4], right: [u8; 4]) -> VideoFrame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..height {
            for x in 0..width {
                data.extend_from_slice(if x < width / 2 { &left } else { &right });
            }
        }
        VideoFrame::new(width, height, data).unwrap()
    }

    fn compositor(width: u32, height: u32, layout: Layout) -> FrameCompositor {
        FrameCompositor::new(CompositionConfig::new(width, height, layout, Anchor::BottomRight, 30)).unwrap()
    }

    fn is_white(pixel: [u8; 4]) -> bool {
        pixel[0] > 200 && pixel[1] > 200 && pixel[2] > 200
    }

    #[test]
    fn no_sources_is_solid_black() {
        let mut c = compositor(64, 36, Layout::PictureInPicture);
        let frame = c.composite(CompositorInput::default());
        assert_eq!(frame.dimensions(), (64, 36));
        assert!(frame.data().chunks(4).all(|px| px == BLACK));
    }

    #[test]
    fn single_screen_is_letterboxed() {
        let mut c = compositor(32, 18, Layout::PictureInPicture);
        let screen = VideoFrame::solid(16, 16, RED);
        let frame = c.composite(CompositorInput {
            screen: Some(&screen),
            camera: None,
        });
        // 18x18 square centered at x = 7..25
        assert_eq!(frame.pixel(1, 9), Some(BLACK));
        assert_eq!(frame.pixel(30, 9), Some(BLACK));
        assert_eq!(frame.pixel(16, 9), Some(RED));
    }

    #[test]
    fn lone_camera_is_mirrored() {
        let mut c = compositor(16, 8, Layout::PictureInPicture);
        let camera = split_frame(16, 8, RED, BLUE);
        let frame = c.composite(CompositorInput {
            screen: None,
            camera: Some(&camera),
        });
        assert_eq!(frame.pixel(2, 4), Some(BLUE));
        assert_eq!(frame.pixel(13, 4), Some(RED));
    }

    #[test]
    fn picture_in_picture_overlay_is_mirrored_and_bordered() {
        let mut c = compositor(1920, 1080, Layout::PictureInPicture);
        let screen = VideoFrame::solid(1920, 1080, GREEN);
        let camera = split_frame(16, 8, RED, BLUE);
        let frame = c.composite(CompositorInput {
            screen: Some(&screen),
            camera: Some(&camera),
        });

        assert_eq!(frame.pixel(100, 100), Some(GREEN));
        // overlay spans x 1480..1880, y 760..1040; mirrored camera puts blue on the left
        assert_eq!(frame.pixel(1500, 900), Some(BLUE));
        assert_eq!(frame.pixel(1860, 900), Some(RED));
        assert!(is_white(frame.pixel(1680, 761).unwrap()));
        assert_eq!(frame.pixel(1470, 900), Some(GREEN));
    }

    #[test]
    fn circle_overlay_clips_corners() {
        let mut c = compositor(1920, 1080, Layout::Circle);
        let screen = VideoFrame::solid(1920, 1080, GREEN);
        let camera = VideoFrame::solid(640, 480, RED);
        let frame = c.composite(CompositorInput {
            screen: Some(&screen),
            camera: Some(&camera),
        });

        // circle bounding box is 1600..1880 x 760..1040
        assert_eq!(frame.pixel(1740, 900), Some(RED));
        assert_eq!(frame.pixel(1606, 766), Some(GREEN));
        assert_eq!(frame.pixel(1874, 1034), Some(GREEN));
    }

    #[test]
    fn counts_frames_and_reconfigures() {
        let mut c = compositor(64, 36, Layout::PictureInPicture);
        c.composite(CompositorInput::default());
        c.composite(CompositorInput::default());
        assert_eq!(c.frames_produced(), 2);

        let resized = c.config().resized(128, 72);
        c.reconfigure(resized).unwrap();
        let frame = c.composite(CompositorInput::default());
        assert_eq!(frame.dimensions(), (128, 72));
    }
}
