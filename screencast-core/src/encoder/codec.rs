use std::fmt;

use crate::models::error::CaptureError;
use crate::traits::encoder_backend::EncoderBackend;

/// A mime type with optional codecs parameter, e.g. `video/webm;codecs=vp9,opus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecProfile {
    mime_type: String,
}

impl CodecProfile {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
        }
    }

    /// Full mime type as passed to the encoder.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Container part, without parameters.
    pub fn container(&self) -> &str {
        self.mime_type.split(';').next().unwrap_or_default().trim()
    }

    /// Codecs listed in the `codecs=` parameter, in order.
    pub fn codecs(&self) -> Vec<&str> {
        self.mime_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.trim().strip_prefix("codecs="))
            .flat_map(|list| list.trim_matches('"').split(','))
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect()
    }
}

impl fmt::Display for CodecProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime_type)
    }
}

/// Pick the first profile in `preferences` the backend can encode.
pub fn negotiate<E: EncoderBackend + ?Sized>(
    backend: &E,
    preferences: &[String],
) -> Result<CodecProfile, CaptureError> {
    match preferences.iter().find(|mime| backend.is_type_supported(mime)) {
        Some(mime) => {
            log::info!("negotiated codec profile {}", mime);
            Ok(CodecProfile::new(mime.as_str()))
        }
        None => Err(CaptureError::CodecNotSupported(preferences.join(", "))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::encoder_backend::{ChunkCallback, EncoderInput};

    struct Supports(&'static [&'static str]);

    impl EncoderBackend for Supports {
        fn is_type_supported(&self, mime_type: &str) -> bool {
            self.0.contains(&mime_type)
        }
        fn start(&mut self, _: &str, _: EncoderInput, _: ChunkCallback) -> Result<(), CaptureError> {
            Ok(())
        }
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn request_data(&mut self) {}
        fn stop(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }
    }

    fn prefs() -> Vec<String> {
        crate::models::config::DEFAULT_CODEC_PREFERENCES
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn picks_first_supported_in_preference_order() {
        let backend = Supports(&["video/webm", "video/webm;codecs=vp8,opus"]);
        let profile = negotiate(&backend, &prefs()).unwrap();
        assert_eq!(profile.mime_type(), "video/webm;codecs=vp8,opus");
    }

    #[test]
    fn nothing_supported_is_codec_error() {
        let err = negotiate(&Supports(&["video/ogg"]), &prefs()).unwrap_err();
        match err {
            CaptureError::CodecNotSupported(tried) => assert!(tried.starts_with("video/mp4")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_container_and_codecs() {
        let profile = CodecProfile::new("video/webm; codecs=\"vp9, opus\"");
        assert_eq!(profile.container(), "video/webm");
        assert_eq!(profile.codecs(), vec!["vp9", "opus"]);
        assert!(CodecProfile::new("video/webm").codecs().is_empty());
    }
}
