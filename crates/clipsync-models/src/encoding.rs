//! Video encoding configuration.

use serde::{Deserialize, Serialize};

/// Default video codec (SVT-AV1)
pub const DEFAULT_VIDEO_CODEC: &str = "libsvtav1";
/// Default audio codec (stream copy)
pub const DEFAULT_AUDIO_CODEC: &str = "copy";
/// Default encoder speed preset
pub const DEFAULT_PRESET: &str = "8";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 30;
/// Normalized container for converted outputs
pub const DEFAULT_CONTAINER: &str = "mp4";

/// Fixed quality preset applied to every conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libsvtav1", "libaom-av1")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoder speed preset
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (quality, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Output container extension
    #[serde(default = "default_container")]
    pub container: String,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            container: DEFAULT_CONTAINER.to_string(),
            extra_args: Vec::new(),
        }
    }
}
