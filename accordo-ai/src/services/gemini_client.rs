//! Gemini media + generative-analysis client
//!
//! Implements the three media-pipeline seams over the Generative Language
//! REST API:
//! - [`MediaUploader`]: resumable upload (`start`, then `upload, finalize`)
//! - [`MediaStatusSource`]: `GET v1beta/files/{id}`; `PROCESSING` → `ACTIVE` | `FAILED`
//! - [`AnalysisInvoker`]: `POST v1beta/models/{model}:generateContent`
//!
//! API reference: https://ai.google.dev/api

use crate::error::{is_transient_status, PipelineError, PipelineResult};
use crate::models::{JobState, MediaRef};
use crate::types::{
    AnalysisInvoker, ContentPart, MediaStatus, MediaStatusSource, MediaUploader, ModelConfig,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const USER_AGENT: &str = concat!("accordo-ai/", env!("CARGO_PKG_VERSION"));
const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// Largest file the service accepts
pub const MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// File resource as returned by the files API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileResource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Gemini REST client
pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> PipelineResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| PipelineError::invocation(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            http_client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model,
        })
    }

    /// Point the client at another host (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn start_upload(&self, display_name: &str, size: u64, mime_type: &str) -> PipelineResult<String> {
        let response = self
            .http_client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(|e| upload_network_error("start upload", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upload {
                message: format!("start upload rejected ({status}): {body}"),
                transient: is_transient_status(status),
            });
        }

        response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::upload("start upload response had no upload URL"))
    }
}

#[async_trait::async_trait]
impl MediaUploader for GeminiClient {
    async fn upload(&self, local_path: &Path) -> PipelineResult<MediaRef> {
        let size = check_local_file(local_path)?;
        let mime_type = sniff_media_type(local_path)?;
        let display_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("performance")
            .to_string();

        info!(
            path = %local_path.display(),
            size,
            mime_type,
            "Uploading media file"
        );

        let upload_url = self.start_upload(&display_name, size, mime_type).await?;
        let body = upload_body(local_path).await?;

        let response = self
            .http_client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await
            .map_err(|e| upload_network_error("upload bytes", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upload {
                message: format!("upload rejected ({status}): {body}"),
                transient: is_transient_status(status),
            });
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::upload(format!("unreadable upload response: {e}")))?;

        info!(name = %uploaded.file.name, uri = %uploaded.file.uri, "Upload complete");

        Ok(MediaRef {
            name: uploaded.file.name,
            uri: uploaded.file.uri,
            mime_type: if uploaded.file.mime_type.is_empty() {
                mime_type.to_string()
            } else {
                uploaded.file.mime_type
            },
        })
    }
}

/// File contents as a streamed request body; each call reopens the file
async fn upload_body(local_path: &Path) -> PipelineResult<reqwest::Body> {
    let file = tokio::fs::File::open(local_path)
        .await
        .map_err(|e| PipelineError::upload(format!("open {}: {e}", local_path.display())))?;
    Ok(reqwest::Body::wrap_stream(ReaderStream::new(file)))
}

#[async_trait::async_trait]
impl MediaStatusSource for GeminiClient {
    async fn media_status(&self, media: &MediaRef) -> PipelineResult<MediaStatus> {
        let response = self
            .http_client
            .get(format!("{}/v1beta/{}", self.base_url, media.name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| PipelineError::Invocation {
                message: format!("file status request failed: {e}"),
                transient: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Invocation {
                message: format!("file status rejected ({status}): {body}"),
                transient: is_transient_status(status),
            });
        }

        let file: FileResource = response
            .json()
            .await
            .map_err(|e| PipelineError::invocation(format!("unreadable file status: {e}")))?;

        debug!(name = %file.name, state = %file.state, "File status");

        Ok(MediaStatus {
            state: map_file_state(&file.state),
            media: MediaRef {
                name: file.name,
                uri: if file.uri.is_empty() { media.uri.clone() } else { file.uri },
                mime_type: if file.mime_type.is_empty() {
                    media.mime_type.clone()
                } else {
                    file.mime_type
                },
            },
        })
    }
}

#[async_trait::async_trait]
impl AnalysisInvoker for GeminiClient {
    async fn invoke(&self, content: &[ContentPart], config: &ModelConfig) -> PipelineResult<String> {
        let request = build_generate_request(content, config);

        info!(
            model = %self.model,
            parts = content.len(),
            max_output_tokens = config.max_output_tokens,
            temperature = config.temperature,
            "Invoking analysis"
        );

        let response = self
            .http_client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Invocation {
                message: format!("generateContent request failed: {e}"),
                transient: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Invocation {
                message: format!("generateContent rejected ({status}): {body}"),
                transient: is_transient_status(status),
            });
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| PipelineError::invocation(format!("unreadable generateContent response: {e}")))?;

        extract_text(body)
    }
}

fn upload_network_error(step: &str, err: reqwest::Error) -> PipelineError {
    PipelineError::Upload {
        message: format!("{step} failed: {err}"),
        transient: true,
    }
}

/// Size of a readable regular file, within the service limit
fn check_local_file(path: &Path) -> PipelineResult<u64> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| PipelineError::upload(format!("{}: {e}", path.display())))?;
    if !metadata.is_file() {
        return Err(PipelineError::upload(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    if metadata.len() == 0 {
        return Err(PipelineError::upload(format!("{} is empty", path.display())));
    }
    if metadata.len() > MAX_UPLOAD_BYTES {
        return Err(PipelineError::upload(format!(
            "{} is {} bytes, limit is {MAX_UPLOAD_BYTES}",
            path.display(),
            metadata.len()
        )));
    }
    Ok(metadata.len())
}

/// MIME type from the file's magic bytes; only audio and video are accepted
pub fn sniff_media_type(path: &Path) -> PipelineResult<&'static str> {
    let kind = infer::get_from_path(path)
        .map_err(|e| PipelineError::upload(format!("{}: {e}", path.display())))?
        .ok_or_else(|| {
            PipelineError::upload(format!("{}: unrecognized media format", path.display()))
        })?;

    match kind.matcher_type() {
        infer::MatcherType::Audio | infer::MatcherType::Video => Ok(kind.mime_type()),
        _ => Err(PipelineError::upload(format!(
            "{}: unsupported format {}",
            path.display(),
            kind.mime_type()
        ))),
    }
}

fn map_file_state(state: &str) -> JobState {
    match state {
        "PROCESSING" => JobState::Processing,
        "ACTIVE" => JobState::Ready,
        "FAILED" => JobState::Failed,
        _ => JobState::Pending,
    }
}

fn build_generate_request(content: &[ContentPart], config: &ModelConfig) -> JsonValue {
    let parts: Vec<JsonValue> = content
        .iter()
        .map(|part| match part {
            ContentPart::Media(media) => json!({
                "file_data": { "mime_type": media.mime_type, "file_uri": media.uri }
            }),
            ContentPart::Text(text) => json!({ "text": text }),
        })
        .collect();

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "maxOutputTokens": config.max_output_tokens,
            "temperature": config.temperature,
        }
    })
}

fn extract_text(body: JsonValue) -> PipelineResult<String> {
    let response: GenerateResponse = serde_json::from_value(body)
        .map_err(|e| PipelineError::invocation(format!("unexpected generateContent shape: {e}")))?;

    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(PipelineError::invocation(format!("analysis blocked: {reason}")));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(PipelineError::invocation(format!(
            "empty analysis (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_body_is_streamed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("take1.mp3");
        std::fs::write(&path, vec![0u8; 64 * 1024]).unwrap();

        let body = upload_body(&path).await.unwrap();
        assert!(body.as_bytes().is_none(), "body must not be buffered in memory");

        let err = upload_body(&temp_dir.path().join("absent.mp3")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Upload { transient: false, .. }));
    }

    #[test]
    fn test_file_state_mapping() {
        assert_eq!(map_file_state("PROCESSING"), JobState::Processing);
        assert_eq!(map_file_state("ACTIVE"), JobState::Ready);
        assert_eq!(map_file_state("FAILED"), JobState::Failed);
        assert_eq!(map_file_state("STATE_UNSPECIFIED"), JobState::Pending);
    }

    #[test]
    fn test_generate_request_shape() {
        let content = vec![
            ContentPart::Media(MediaRef {
                name: "files/abc".into(),
                uri: "https://generativelanguage.googleapis.com/v1beta/files/abc".into(),
                mime_type: "video/mp4".into(),
            }),
            ContentPart::Text("Analyze this piano performance".into()),
        ];
        let config = ModelConfig {
            max_output_tokens: 2000,
            temperature: 0.5,
        };

        let request = build_generate_request(&content, &config);
        let parts = &request["contents"][0]["parts"];
        assert_eq!(parts[0]["file_data"]["mime_type"], "video/mp4");
        assert_eq!(parts[1]["text"], "Analyze this piano performance");
        assert_eq!(request["generationConfig"]["maxOutputTokens"], 2000);
        assert_eq!(request["generationConfig"]["temperature"], 0.5);
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Technical: 80. "}, {"text": "Artistry: 90."}]},
                "finishReason": "STOP"
            }]
        });
        assert_eq!(extract_text(body).unwrap(), "Technical: 80. Artistry: 90.");
    }

    #[test]
    fn test_blocked_prompt_is_invocation_error() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = extract_text(body).unwrap_err();
        assert!(matches!(err, PipelineError::Invocation { .. }));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_empty_candidate_is_invocation_error() {
        let body = json!({"candidates": [{"finishReason": "MAX_TOKENS"}]});
        assert!(extract_text(body).unwrap_err().to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn test_local_file_checks() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.mp4");
        assert!(matches!(
            check_local_file(&missing),
            Err(PipelineError::Upload { transient: false, .. })
        ));
        assert!(check_local_file(dir.path()).is_err());

        let empty = dir.path().join("empty.mp3");
        std::fs::write(&empty, b"").unwrap();
        assert!(check_local_file(&empty).is_err());
    }

    #[test]
    fn test_sniff_accepts_audio_rejects_text() {
        let dir = TempDir::new().unwrap();

        let wav = dir.path().join("clip.wav");
        std::fs::write(&wav, b"RIFF\x24\x00\x00\x00WAVEfmt \x10\x00\x00\x00").unwrap();
        assert!(sniff_media_type(&wav).unwrap().starts_with("audio/"));

        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, b"just some practice notes").unwrap();
        assert!(matches!(
            sniff_media_type(&notes),
            Err(PipelineError::Upload { .. })
        ));

        let pdf = dir.path().join("score.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n").unwrap();
        let err = sniff_media_type(&pdf).unwrap_err();
        assert!(err.to_string().contains("unsupported format"));
    }

    #[tokio::test]
    async fn test_upload_rejects_before_network() {
        let dir = TempDir::new().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, b"not media").unwrap();

        // Unroutable base URL: the call must fail locally, not on connect
        let client = GeminiClient::new("key".into(), "gemini-1.5-pro".into())
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let err = client.upload(&notes).await.unwrap_err();
        assert!(matches!(err, PipelineError::Upload { transient: false, .. }));
    }
}
