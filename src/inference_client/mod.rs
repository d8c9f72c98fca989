//! InferenceClient - Cry Model / Face Landmark Adapter
//!
//! ## Responsibilities
//!
//! - Send audio windows for cry classification
//! - Send camera frames for face-offset estimation
//! - Response parsing and validation
//!
//! Feature extraction, the classifier and the face mesh all live in the
//! inference service. This side only moves bytes and checks answers.

use crate::audio_capture::AudioClip;
use crate::camera_capture::Frame;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Binary cry label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryLabel {
    Silent,
    Crying,
}

/// Classifier output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CryVerdict {
    pub label: CryLabel,
    /// Probability of the crying class (0.0-1.0)
    pub probability: f32,
}

/// Cry classification collaborator
#[async_trait]
pub trait CryClassifier: Send + Sync {
    async fn classify(&self, clip: &AudioClip) -> Result<CryVerdict>;
}

/// Face locator collaborator
///
/// Returns the horizontal nose offset from the eye midpoint in normalized
/// image coordinates, or `None` when no face is visible.
#[async_trait]
pub trait FaceLocator: Send + Sync {
    async fn locate(&self, frame: &Frame) -> Result<Option<f32>>;
}

#[derive(Debug, Deserialize)]
struct CryResponse {
    label: String,
    #[serde(default)]
    probability: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct FaceOffsetResponse {
    offset: Option<f32>,
}

/// HTTP client for the inference service
pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
}

impl InferenceClient {
    /// Create new inference client
    pub fn new(base_url: String) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    /// Create new inference client with custom timeout
    pub fn with_timeout(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Check inference service health
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn post_form(&self, path: &str, form: Form) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).multipart(form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Model(format!(
                "{} failed: {} - {}",
                path, status, body
            )));
        }

        Ok(resp)
    }
}

fn parse_cry_response(resp: CryResponse) -> Result<CryVerdict> {
    let label = match resp.label.to_ascii_lowercase().as_str() {
        "crying" | "cry" | "1" => CryLabel::Crying,
        "silent" | "not_crying" | "0" => CryLabel::Silent,
        other => return Err(Error::Model(format!("unknown cry label: {}", other))),
    };
    let probability = resp.probability.unwrap_or(match label {
        CryLabel::Crying => 1.0,
        CryLabel::Silent => 0.0,
    });
    if !(0.0..=1.0).contains(&probability) {
        return Err(Error::Model(format!("probability out of range: {}", probability)));
    }
    Ok(CryVerdict { label, probability })
}

fn parse_face_response(resp: FaceOffsetResponse) -> Result<Option<f32>> {
    match resp.offset {
        Some(dx) if !dx.is_finite() => Err(Error::Model(format!("non-finite offset: {}", dx))),
        other => Ok(other),
    }
}

#[async_trait]
impl CryClassifier for InferenceClient {
    async fn classify(&self, clip: &AudioClip) -> Result<CryVerdict> {
        let form = Form::new()
            .part(
                "audio",
                Part::bytes(clip.wav.clone())
                    .file_name("window.wav")
                    .mime_str("audio/wav")?,
            )
            .text("sample_rate", clip.sample_rate.to_string());

        let resp = self.post_form("/v1/cry", form).await?;
        let body: CryResponse = resp.json().await?;
        parse_cry_response(body)
    }
}

#[async_trait]
impl FaceLocator for InferenceClient {
    async fn locate(&self, frame: &Frame) -> Result<Option<f32>> {
        let form = Form::new().part(
            "image",
            Part::bytes(frame.jpeg.to_vec())
                .file_name("frame.jpg")
                .mime_str("image/jpeg")?,
        );

        let resp = self.post_form("/v1/face-offset", form).await?;
        let body: FaceOffsetResponse = resp.json().await?;
        parse_face_response(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cry_labels() {
        let verdict = parse_cry_response(CryResponse {
            label: "Crying".to_string(),
            probability: Some(0.83),
        })
        .unwrap();
        assert_eq!(verdict.label, CryLabel::Crying);
        assert!((verdict.probability - 0.83).abs() < f32::EPSILON);

        let verdict = parse_cry_response(CryResponse {
            label: "silent".to_string(),
            probability: None,
        })
        .unwrap();
        assert_eq!(verdict.label, CryLabel::Silent);
        assert_eq!(verdict.probability, 0.0);
    }

    #[test]
    fn test_parse_cry_rejects_garbage() {
        assert!(parse_cry_response(CryResponse {
            label: "giggling".to_string(),
            probability: Some(0.5),
        })
        .is_err());
        assert!(parse_cry_response(CryResponse {
            label: "crying".to_string(),
            probability: Some(1.5),
        })
        .is_err());
    }

    #[test]
    fn test_parse_face_offset() {
        let json = r#"{"offset": -0.031}"#;
        let resp: FaceOffsetResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parse_face_response(resp).unwrap(), Some(-0.031));

        let resp: FaceOffsetResponse = serde_json::from_str(r#"{"offset": null}"#).unwrap();
        assert_eq!(parse_face_response(resp).unwrap(), None);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = InferenceClient::new("http://localhost:9000/".to_string()).unwrap();
        assert_eq!(client.base_url, "http://localhost:9000");
    }
}
