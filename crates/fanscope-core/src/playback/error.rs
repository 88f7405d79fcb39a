//! Playback error types

use std::fmt;

use thiserror::Error;

/// Error codes reported by the clip provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipErrorCode {
    InvalidInput,
    ModelNotFound,
    ModelInvalid,
    SweepIndexMissing,
    AudioGenerationFailed,
    AudioGenerationError,
    InternalError,
}

impl ClipErrorCode {
    pub const ALL: [ClipErrorCode; 7] = [
        ClipErrorCode::InvalidInput,
        ClipErrorCode::ModelNotFound,
        ClipErrorCode::ModelInvalid,
        ClipErrorCode::SweepIndexMissing,
        ClipErrorCode::AudioGenerationFailed,
        ClipErrorCode::AudioGenerationError,
        ClipErrorCode::InternalError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClipErrorCode::InvalidInput => "INVALID_INPUT",
            ClipErrorCode::ModelNotFound => "MODEL_NOT_FOUND",
            ClipErrorCode::ModelInvalid => "MODEL_INVALID",
            ClipErrorCode::SweepIndexMissing => "SWEEP_INDEX_MISSING",
            ClipErrorCode::AudioGenerationFailed => "AUDIO_GENERATION_FAILED",
            ClipErrorCode::AudioGenerationError => "AUDIO_GENERATION_ERROR",
            ClipErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == code)
    }
}

impl fmt::Display for ClipErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn describe(code: &Option<String>, message: &str) -> String {
    match code {
        Some(code) => format!("{code}: {message}"),
        None => message.to_string(),
    }
}

/// Phrases the provider uses when no sweep segment matches the operating point
const NO_VALID_SEGMENT_PHRASES: [&str; 2] = ["Cannot match valid audio data", "无法匹配到有效的音频数据"];

/// Failure reported by a [`ClipProvider`](super::ClipProvider)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe(.code, .message))]
pub struct ClipFetchError {
    /// Provider error code, if the provider sent one
    pub code: Option<String>,
    pub message: String,
}

impl ClipFetchError {
    pub fn new(code: Option<ClipErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(|c| c.as_str().to_string()),
            message: message.into(),
        }
    }

    pub fn known_code(&self) -> Option<ClipErrorCode> {
        self.code.as_deref().and_then(ClipErrorCode::from_code)
    }

    /// Generation failed because the operating point lies outside every
    /// recorded sweep segment
    pub fn is_no_valid_segment(&self) -> bool {
        self.known_code() == Some(ClipErrorCode::AudioGenerationFailed)
            && NO_VALID_SEGMENT_PHRASES
                .iter()
                .any(|phrase| self.message.contains(phrase))
    }
}

/// Errors decoding a clip
#[derive(Error, Debug)]
pub enum ClipError {
    #[error("Failed to decode WAV: {0}")]
    Wav(#[from] hound::Error),

    #[error("Clip contains no audio")]
    Empty,

    #[error("Clip of {0:.3} s is too short to loop")]
    TooShort(f64),

    #[error("Unsupported clip format: {0}")]
    UnsupportedFormat(String),
}

/// Errors returned by the playback service
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Operating point is not a finite positive number
    #[error("Invalid operating point: {0}")]
    InvalidOperatingPoint(f64),

    /// Neither the curve nor its spectrum model has recorded audio
    #[error("No audio available for {0}")]
    AudioUnsupported(String),

    /// No recorded sweep segment covers the requested operating point
    #[error("No valid audio segment: {message}")]
    NoValidSegment { message: String },

    /// Any other clip generation failure
    #[error("Audio generation failed: {}", describe(.code, .message))]
    Generation {
        code: Option<String>,
        message: String,
    },

    #[error(transparent)]
    Decode(#[from] ClipError),

    /// The output stage rejected a command
    #[error("Audio output error: {0}")]
    Output(String),

    /// The playback service has shut down
    #[error("Playback service is not running")]
    ServiceUnavailable,
}

/// Coarse failure class, for UI messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackErrorKind {
    InvalidOperatingPoint,
    NoValidSegment,
    Generic,
}

impl PlaybackError {
    pub fn kind(&self) -> PlaybackErrorKind {
        match self {
            PlaybackError::InvalidOperatingPoint(_) => PlaybackErrorKind::InvalidOperatingPoint,
            PlaybackError::NoValidSegment { .. } => PlaybackErrorKind::NoValidSegment,
            _ => PlaybackErrorKind::Generic,
        }
    }
}

impl From<ClipFetchError> for PlaybackError {
    fn from(err: ClipFetchError) -> Self {
        if err.is_no_valid_segment() {
            PlaybackError::NoValidSegment {
                message: err.message,
            }
        } else {
            PlaybackError::Generation {
                code: err.code,
                message: err.message,
            }
        }
    }
}

/// Result type for playback operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_names_roundtrip() {
        for code in ClipErrorCode::ALL {
            assert_eq!(ClipErrorCode::from_code(code.as_str()), Some(code));
        }
        assert_eq!(ClipErrorCode::from_code("TEAPOT"), None);
    }

    #[test]
    fn test_no_valid_segment_classification() {
        let err = ClipFetchError::new(
            Some(ClipErrorCode::AudioGenerationFailed),
            "Cannot match valid audio data for rpm 900",
        );
        assert!(err.is_no_valid_segment());
        assert_eq!(PlaybackError::from(err).kind(), PlaybackErrorKind::NoValidSegment);

        let localized = ClipFetchError::new(
            Some(ClipErrorCode::AudioGenerationFailed),
            "无法匹配到有效的音频数据",
        );
        assert!(localized.is_no_valid_segment());
    }

    #[test]
    fn test_other_failures_are_generic() {
        let wrong_code = ClipFetchError::new(
            Some(ClipErrorCode::InternalError),
            "Cannot match valid audio data",
        );
        assert!(!wrong_code.is_no_valid_segment());

        let other = PlaybackError::from(ClipFetchError::new(
            Some(ClipErrorCode::AudioGenerationFailed),
            "encoder crashed",
        ));
        assert_eq!(other.kind(), PlaybackErrorKind::Generic);
        assert_eq!(
            other.to_string(),
            "Audio generation failed: AUDIO_GENERATION_FAILED: encoder crashed"
        );

        let uncoded = ClipFetchError::new(None, "timeout");
        assert_eq!(uncoded.to_string(), "timeout");
        assert_eq!(PlaybackError::from(uncoded).kind(), PlaybackErrorKind::Generic);
    }
}
