use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

/// Output geometry, mapped to the ratio strings the video service accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    Wide,
    Tall,
}

impl AspectRatio {
    pub fn api_value(self) -> &'static str {
        match self {
            AspectRatio::Wide => "16:9",
            AspectRatio::Tall => "9:16",
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "wide" | "landscape" | "16:9" => Ok(AspectRatio::Wide),
            "tall" | "portrait" | "9:16" => Ok(AspectRatio::Tall),
            other => anyhow::bail!("unknown aspect ratio '{other}' (expected wide or tall)"),
        }
    }
}

/// Requested clip length. `Long` chains a second generation stage off the
/// first stage's output.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetLength {
    Short,
    Long,
}

impl TargetLength {
    pub fn requires_extension(self) -> bool {
        matches!(self, TargetLength::Long)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(TargetLength::Short),
            "long" => Ok(TargetLength::Long),
            other => anyhow::bail!("unknown target length '{other}' (expected short or long)"),
        }
    }
}

/// Still image used as the first stage's visual conditioning input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
        }
    }
}

/// One video generation job as handed to the engine. Immutable once a
/// pipeline run starts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: ImagePayload,
    pub aspect_ratio: AspectRatio,
    pub target_length: TargetLength,
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.prompt.trim().is_empty() {
            return Err(PipelineError::input_processing("prompt must not be empty"));
        }
        if self.image.bytes.is_empty() {
            return Err(PipelineError::input_processing(
                "reference image has no data",
            ));
        }
        if self.image.media_type.trim().is_empty() {
            return Err(PipelineError::input_processing(
                "reference image has no media type",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::FailureKind;

    use super::*;

    fn sample_request() -> GenerationRequest {
        GenerationRequest {
            prompt: "a boat drifting at dawn".to_string(),
            image: ImagePayload::new(vec![0u8, 1, 2], "image/png"),
            aspect_ratio: AspectRatio::Wide,
            target_length: TargetLength::Short,
        }
    }

    #[test]
    fn aspect_ratio_maps_to_service_strings() {
        assert_eq!(AspectRatio::Wide.api_value(), "16:9");
        assert_eq!(AspectRatio::Tall.api_value(), "9:16");
    }

    #[test]
    fn aspect_ratio_parse_accepts_aliases() -> anyhow::Result<()> {
        assert_eq!(AspectRatio::parse("wide")?, AspectRatio::Wide);
        assert_eq!(AspectRatio::parse(" 16:9 ")?, AspectRatio::Wide);
        assert_eq!(AspectRatio::parse("Portrait")?, AspectRatio::Tall);
        assert!(AspectRatio::parse("square").is_err());
        Ok(())
    }

    #[test]
    fn target_length_parse_and_extension_rule() -> anyhow::Result<()> {
        assert_eq!(TargetLength::parse("short")?, TargetLength::Short);
        assert_eq!(TargetLength::parse("LONG")?, TargetLength::Long);
        assert!(TargetLength::parse("medium").is_err());
        assert!(!TargetLength::Short.requires_extension());
        assert!(TargetLength::Long.requires_extension());
        Ok(())
    }

    #[test]
    fn validate_accepts_complete_request() {
        assert!(sample_request().validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_prompt() {
        let mut request = sample_request();
        request.prompt = "   ".to_string();
        let err = request.validate().unwrap_err();
        assert_eq!(err.kind, FailureKind::InputProcessing);
    }

    #[test]
    fn validate_rejects_empty_image() {
        let mut request = sample_request();
        request.image.bytes.clear();
        let err = request.validate().unwrap_err();
        assert_eq!(err.kind, FailureKind::InputProcessing);
        assert!(err.message.contains("no data"));
    }
}
