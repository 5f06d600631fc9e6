use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Canvas width the overlay geometry constants are expressed against.
pub const REFERENCE_WIDTH: f64 = 1920.0;

/// Overlay padding from the anchored canvas edges at the reference width.
pub const REFERENCE_PADDING: f64 = 40.0;

/// Rounded-rectangle corner radius at the reference width.
pub const REFERENCE_CORNER_RADIUS: f64 = 12.0;

/// Overlay border thickness in pixels (not scaled).
pub const BORDER_WIDTH: f32 = 4.0;

/// Camera overlay shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    #[default]
    PictureInPicture,
    Circle,
}

impl Layout {
    /// Overlay size at the reference canvas width.
    pub fn reference_overlay_size(self) -> (f64, f64) {
        match self {
            Self::PictureInPicture => (400.0, 280.0),
            Self::Circle => (280.0, 280.0),
        }
    }
}

/// Corner of the canvas the camera overlay is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

impl Anchor {
    pub const ALL: [Anchor; 4] = [
        Anchor::TopLeft,
        Anchor::TopRight,
        Anchor::BottomLeft,
        Anchor::BottomRight,
    ];

    pub fn is_left(self) -> bool {
        matches!(self, Self::TopLeft | Self::BottomLeft)
    }

    pub fn is_top(self) -> bool {
        matches!(self, Self::TopLeft | Self::TopRight)
    }

    /// Snap a free preview position (overlay center) to the nearest anchor.
    ///
    /// Capture geometry only ever uses anchors; drag coordinates never reach
    /// the compositor.
    pub fn nearest(x: f64, y: f64, canvas_width: f64, canvas_height: f64) -> Self {
        let left = x < canvas_width / 2.0;
        let top = y < canvas_height / 2.0;
        match (top, left) {
            (true, true) => Self::TopLeft,
            (true, false) => Self::TopRight,
            (false, true) => Self::BottomLeft,
            (false, false) => Self::BottomRight,
        }
    }
}

/// Whether the host surface hosting the recorder is currently visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Round a canvas dimension down to an even value, never below 2.
pub fn even_dimension(value: u32) -> u32 {
    (value & !1).max(2)
}

/// Resolved compositing geometry for one canvas size.
///
/// Overlay size and padding scale linearly with `canvas_width / 1920`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositionConfig {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub target_fps: u32,
    pub layout: Layout,
    pub overlay_anchor: Anchor,
    pub overlay_width: u32,
    pub overlay_height: u32,
    pub padding: u32,
}

impl CompositionConfig {
    pub fn new(canvas_width: u32, canvas_height: u32, layout: Layout, anchor: Anchor, target_fps: u32) -> Self {
        let canvas_width = even_dimension(canvas_width);
        let canvas_height = even_dimension(canvas_height);
        let scale = canvas_width as f64 / REFERENCE_WIDTH;
        let (ref_w, ref_h) = layout.reference_overlay_size();

        Self {
            canvas_width,
            canvas_height,
            target_fps,
            layout,
            overlay_anchor: anchor,
            overlay_width: (ref_w * scale).round() as u32,
            overlay_height: (ref_h * scale).round() as u32,
            padding: (REFERENCE_PADDING * scale).round() as u32,
        }
    }

    pub fn scale(&self) -> f64 {
        self.canvas_width as f64 / REFERENCE_WIDTH
    }

    pub fn corner_radius(&self) -> f32 {
        (REFERENCE_CORNER_RADIUS * self.scale()) as f32
    }

    /// Same layout and fps at a new canvas size.
    pub fn resized(&self, canvas_width: u32, canvas_height: u32) -> Self {
        Self::new(canvas_width, canvas_height, self.layout, self.overlay_anchor, self.target_fps)
    }

    /// Same canvas at a new layout/anchor selection.
    pub fn with_layout(&self, layout: Layout, anchor: Anchor) -> Self {
        Self::new(self.canvas_width, self.canvas_height, layout, anchor, self.target_fps)
    }
}

/// Audio mixing graph settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioMixConfig {
    /// Output sample rate in Hz (default: 48000).
    pub sample_rate: f64,
    /// Per-source gain stage (default: 0.8).
    pub source_gain: f32,
    /// Processing cycle of the mixing thread.
    pub block_interval: Duration,
    /// A source silent for longer than this stops holding back the mix and
    /// is treated as silence until it delivers again.
    pub max_source_lag: Duration,
}

impl Default for AudioMixConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            source_gain: 0.8,
            block_interval: Duration::from_millis(20),
            max_source_lag: Duration::from_millis(40),
        }
    }
}

/// Codec profiles tried in order during encoder negotiation.
pub const DEFAULT_CODEC_PREFERENCES: &[&str] = &[
    "video/mp4;codecs=avc1,mp4a",
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm",
];

/// Configuration for a recorder.
#[derive(Debug, Clone)]
pub struct RecorderConfiguration {
    /// Camera overlay shape (default: picture-in-picture).
    pub layout: Layout,

    /// Corner the overlay snaps to (default: bottom-right).
    pub anchor: Anchor,

    /// Foreground compositing rate (default: 30).
    pub target_fps: u32,

    /// Descending codec preference list.
    pub codec_preferences: Vec<String>,

    pub audio: AudioMixConfig,

    /// Maximum wait for sources to report dimensions before the first composite.
    pub readiness_timeout: Duration,

    /// Window in which source dimension changes are coalesced into one resize.
    pub resize_debounce: Duration,

    /// Delay between requesting final data and finalizing the encoder.
    pub stop_grace: Duration,

    /// Interval of elapsed-time notifications.
    pub elapsed_tick_interval: Duration,

    /// Canvas used when no source reports dimensions.
    pub fallback_canvas: (u32, u32),
}

impl RecorderConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=120).contains(&self.target_fps) {
            return Err(format!("unsupported frame rate: {}", self.target_fps));
        }
        if self.codec_preferences.is_empty() {
            return Err("codec preference list is empty".into());
        }
        if self.fallback_canvas.0 < 2 || self.fallback_canvas.1 < 2 {
            return Err(format!(
                "fallback canvas too small: {}x{}",
                self.fallback_canvas.0, self.fallback_canvas.1
            ));
        }
        if self.elapsed_tick_interval.is_zero() {
            return Err("elapsed tick interval must be positive".into());
        }
        Ok(())
    }

    /// Composition geometry for a canvas of the given size.
    pub fn composition(&self, canvas_width: u32, canvas_height: u32) -> CompositionConfig {
        CompositionConfig::new(canvas_width, canvas_height, self.layout, self.anchor, self.target_fps)
    }
}

impl Default for RecorderConfiguration {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            anchor: Anchor::default(),
            target_fps: 30,
            codec_preferences: DEFAULT_CODEC_PREFERENCES.iter().map(|s| s.to_string()).collect(),
            audio: AudioMixConfig::default(),
            readiness_timeout: Duration::from_secs(3),
            resize_debounce: Duration::from_millis(250),
            stop_grace: Duration::from_millis(150),
            elapsed_tick_interval: Duration::from_millis(250),
            fallback_canvas: (1920, 1080),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_dimension_rounds_down_with_floor_of_two() {
        assert_eq!(even_dimension(1081), 1080);
        assert_eq!(even_dimension(1080), 1080);
        assert_eq!(even_dimension(1), 2);
        assert_eq!(even_dimension(0), 2);
        assert_eq!(even_dimension(3), 2);
    }

    #[test]
    fn overlay_scales_with_canvas_width() {
        let full = CompositionConfig::new(1920, 1080, Layout::PictureInPicture, Anchor::BottomRight, 30);
        assert_eq!((full.overlay_width, full.overlay_height, full.padding), (400, 280, 40));

        let half = CompositionConfig::new(960, 540, Layout::PictureInPicture, Anchor::BottomRight, 30);
        assert_eq!((half.overlay_width, half.overlay_height, half.padding), (200, 140, 20));
        assert!((half.corner_radius() - 6.0).abs() < 1e-6);
    }

    #[test]
    fn circle_overlay_is_square() {
        let config = CompositionConfig::new(1280, 720, Layout::Circle, Anchor::TopLeft, 30);
        assert_eq!(config.overlay_width, config.overlay_height);
    }

    #[test]
    fn canvas_is_forced_even() {
        let config = CompositionConfig::new(1367, 769, Layout::Circle, Anchor::TopLeft, 30);
        assert_eq!((config.canvas_width, config.canvas_height), (1366, 768));
    }

    #[test]
    fn nearest_anchor_snaps_by_quadrant() {
        assert_eq!(Anchor::nearest(100.0, 100.0, 1920.0, 1080.0), Anchor::TopLeft);
        assert_eq!(Anchor::nearest(1800.0, 100.0, 1920.0, 1080.0), Anchor::TopRight);
        assert_eq!(Anchor::nearest(100.0, 900.0, 1920.0, 1080.0), Anchor::BottomLeft);
        assert_eq!(Anchor::nearest(1500.0, 1000.0, 1920.0, 1080.0), Anchor::BottomRight);
    }

    #[test]
    fn default_configuration_is_valid() {
        assert!(RecorderConfiguration::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = RecorderConfiguration {
            target_fps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RecorderConfiguration {
            codec_preferences: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn layout_serializes_kebab_case() {
        let json = serde_json::to_string(&Layout::PictureInPicture).unwrap();
        assert_eq!(json, "\"picture-in-picture\"");
        let anchor: Anchor = serde_json::from_str("\"top-right\"").unwrap();
        assert_eq!(anchor, Anchor::TopRight);
    }
}
