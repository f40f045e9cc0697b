use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reel_contracts::cancel::CancelToken;
use reel_contracts::errors::PipelineError;
use reel_contracts::events::EventLog;
use reel_contracts::progress::ProgressSink;
use reel_contracts::request::GenerationRequest;
use reel_contracts::runs::receipts::{
    build_receipt, new_generation_id, write_receipt, StageRecord,
};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

pub const DEFAULT_VIDEO_MODEL: &str = "veo-2.0-generate-001";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(8);

const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(200);

pub const STAGE_INITIAL: &str = "initial";
pub const STAGE_EXTENSION: &str = "extension";

pub const MILESTONE_WARMING_UP: &str = "Warming up the video engine...";
pub const MILESTONE_GENERATING: &str = "Generating your clip...";
pub const MILESTONE_FINALIZING: &str = "Finalizing the opening shot...";
pub const MILESTONE_EXTENDING: &str = "Extending your clip...";
pub const MILESTONE_DOWNLOADING: &str = "Downloading the finished clip...";

pub const MISSING_FINAL_RESULT_TEXT: &str = "no output produced";
pub const MISSING_INITIAL_RESULT_TEXT: &str = "no initial output to extend";

/// Snapshot of one remote generation job. Polling never mutates an
/// operation in place; each poll returns a fresh snapshot that supersedes
/// the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOperation {
    pub name: String,
    pub done: bool,
    pub payload: Value,
}

impl RemoteOperation {
    pub fn from_payload(payload: Value) -> Result<Self> {
        let name = payload
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .context("operation payload is missing a name")?;
        let done = payload.get("done").and_then(Value::as_bool).unwrap_or(false);
        Ok(Self {
            name,
            done,
            payload,
        })
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Locator of the clip a finished operation produced, if any.
    pub fn video_uri(&self) -> Option<String> {
        extract_video_uri(&self.payload)
    }

    /// Error text the service attached to a finished operation.
    pub fn error_text(&self) -> Option<String> {
        let error = self.payload.get("error")?;
        if error.is_null() {
            return None;
        }
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            let trimmed = message.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        serde_json::to_string(error).ok()
    }
}

/// Visual conditioning input for one stage: the caller's still image for
/// the first stage, the previous stage's clip for an extension.
#[derive(Debug, Clone, PartialEq)]
pub enum StageInput {
    Image { bytes: Vec<u8>, media_type: String },
    Video { uri: String },
}

/// Everything that differs between the two pipeline stages. The stage
/// runner itself is shared.
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub stage: &'static str,
    pub model: String,
    pub prompt: String,
    pub aspect_ratio: &'static str,
    pub input: StageInput,
    pub poll_milestone: &'static str,
    pub missing_result_text: &'static str,
}

/// Source of the service API key. Read once per generate call, so a key
/// changed mid-flight is only picked up by the next call.
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

/// Reads the key from the environment, preferring `GEMINI_API_KEY`.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn api_key(&self) -> Option<String> {
        non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }
}

/// The two remote primitives the pipeline is built on. Implementations own
/// the wire format; the engine never looks past `RemoteOperation`.
pub trait OperationClient: Send + Sync {
    fn submit(&self, plan: &StagePlan, api_key: &str) -> Result<RemoteOperation>;
    fn poll(&self, operation: &RemoteOperation, api_key: &str) -> Result<RemoteOperation>;
}

/// Long-running video generation against the Gemini API. Jobs are started
/// with `:predictLongRunning` and observed by fetching the operation
/// resource until the service marks it done.
pub struct GeminiVideoClient {
    api_base: String,
    http: HttpClient,
}

impl GeminiVideoClient {
    pub fn new() -> Self {
        Self {
            api_base: env::var("REEL_API_BASE")
                .ok()
                .or_else(|| env::var("GEMINI_API_BASE").ok())
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            http: HttpClient::new(),
        }
    }

    fn submit_endpoint(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:predictLongRunning", self.api_base, model_path)
    }

    fn operation_endpoint(&self, operation_name: &str) -> String {
        format!("{}/{}", self.api_base, operation_name.trim_start_matches('/'))
    }

    fn build_request_body(plan: &StagePlan) -> Value {
        let mut instance = map_object(json!({ "prompt": plan.prompt }));
        match &plan.input {
            StageInput::Image { bytes, media_type } => {
                instance.insert(
                    "image".to_string(),
                    json!({
                        "bytesBase64Encoded": BASE64.encode(bytes),
                        "mimeType": media_type,
                    }),
                );
            }
            StageInput::Video { uri } => {
                instance.insert("video".to_string(), json!({ "uri": uri }));
            }
        }
        json!({
            "instances": [Value::Object(instance)],
            "parameters": {
                "aspectRatio": plan.aspect_ratio,
                "sampleCount": 1,
                "resolution": "720p",
            },
        })
    }
}

impl Default for GeminiVideoClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationClient for GeminiVideoClient {
    fn submit(&self, plan: &StagePlan, api_key: &str) -> Result<RemoteOperation> {
        let endpoint = self.submit_endpoint(&plan.model);
        let body = Self::build_request_body(plan);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .with_context(|| format!("video submit request failed ({endpoint})"))?;
        let payload = response_json_or_error("video submit", response)?;
        RemoteOperation::from_payload(payload)
    }

    fn poll(&self, operation: &RemoteOperation, api_key: &str) -> Result<RemoteOperation> {
        let endpoint = self.operation_endpoint(&operation.name);
        let response = self
            .http
            .get(&endpoint)
            .query(&[("key", api_key)])
            .send()
            .with_context(|| format!("video poll request failed ({endpoint})"))?;
        let payload = response_json_or_error("video poll", response)?;
        RemoteOperation::from_payload(payload)
    }
}

/// Finished clip bytes as they came off the wire.
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Turns a finished operation's result locator into local bytes.
pub trait ArtifactFetcher: Send + Sync {
    fn fetch(&self, uri: &str, api_key: &str) -> Result<FetchedArtifact>;
}

/// Single buffered GET with the key appended to the locator, the way the
/// service's download URLs expect it. No retry, no streaming.
pub struct HttpArtifactFetcher {
    http: HttpClient,
}

impl HttpArtifactFetcher {
    pub fn new() -> Self {
        Self {
            http: HttpClient::new(),
        }
    }
}

impl Default for HttpArtifactFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactFetcher for HttpArtifactFetcher {
    fn fetch(&self, uri: &str, api_key: &str) -> Result<FetchedArtifact> {
        let url = append_key_param(uri, api_key);
        let response = self
            .http
            .get(&url)
            .send()
            .with_context(|| format!("video download request failed ({uri})"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            bail!(
                "video download failed ({code}): {}",
                truncate_text(&body, 512)
            );
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .context("failed reading video bytes")?
            .to_vec();
        Ok(FetchedArtifact { bytes, mime_type })
    }
}

/// Locally saved clip. The caller owns it once `generate` returns and
/// releases it when the clip is no longer needed.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactHandle {
    pub path: PathBuf,
    pub byte_len: u64,
    pub mime_type: String,
}

impl ArtifactHandle {
    /// Removes the downloaded file from disk.
    pub fn release(self) -> Result<()> {
        fs::remove_file(&self.path)
            .with_context(|| format!("failed to remove {}", self.path.display()))
    }
}

/// Single classification boundary for a pipeline run: raw failure text in,
/// user-actionable kind out.
///
/// A typed `PipelineError` anywhere in the chain wins outright. After
/// that the rules run in priority order against case-sensitive substrings
/// of the joined chain text; swap this function out if the service ever
/// starts returning structured error codes.
pub fn classify_failure(err: &anyhow::Error) -> PipelineError {
    if let Some(typed) = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
    {
        return typed.clone();
    }
    let raw = error_chain_text(err, 2048);
    if raw.contains("RESOURCE_EXHAUSTED") || raw.contains("429") {
        return PipelineError::rate_limited();
    }
    if raw.contains("Requested entity was not found") {
        return PipelineError::invalid_credential();
    }
    PipelineError::unknown(raw)
}

/// Poll pacing. The default is the service guidance: a fixed 20 second
/// wait between polls, no backoff, no overall cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub run_dir: PathBuf,
    /// Event log destination; `None` puts `events.jsonl` in the run dir.
    pub events_path: Option<PathBuf>,
    pub model: String,
    /// Model used for the extension stage; `None` reuses `model`.
    pub extension_model: Option<String>,
    pub poll: PollPolicy,
    pub settle_delay: Duration,
}

impl EngineConfig {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            events_path: None,
            model: DEFAULT_VIDEO_MODEL.to_string(),
            extension_model: None,
            poll: PollPolicy::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

struct CompletedStage {
    record: StageRecord,
    video_uri: String,
}

pub struct ReelEngine {
    config: EngineConfig,
    events: EventLog,
    credentials: Box<dyn CredentialProvider>,
    client: Box<dyn OperationClient>,
    fetcher: Box<dyn ArtifactFetcher>,
    warnings: Vec<String>,
}

impl ReelEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_backend(
            config,
            Box::new(EnvCredentials),
            Box::new(GeminiVideoClient::new()),
            Box::new(HttpArtifactFetcher::new()),
        )
    }

    pub fn with_backend(
        config: EngineConfig,
        credentials: Box<dyn CredentialProvider>,
        client: Box<dyn OperationClient>,
        fetcher: Box<dyn ArtifactFetcher>,
    ) -> Result<Self> {
        fs::create_dir_all(&config.run_dir)?;
        let run_id = config
            .run_dir
            .file_name()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .unwrap_or("run-reel")
            .to_string();
        let events_path = config
            .events_path
            .clone()
            .unwrap_or_else(|| config.run_dir.join("events.jsonl"));
        let events = EventLog::new(events_path, run_id);
        events.emit(
            "run_started",
            map_object(json!({
                "out_dir": config.run_dir.to_string_lossy().to_string(),
                "model": config.model,
            })),
        )?;
        Ok(Self {
            config,
            events,
            credentials,
            client,
            fetcher,
            warnings: Vec::new(),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.config.run_dir
    }

    pub fn events(&self) -> EventLog {
        self.events.clone()
    }

    /// Runs the full pipeline for one request and hands the downloaded
    /// clip back to the caller. Takes `&mut self` so one engine can never
    /// interleave two pipelines; a second call only starts after the
    /// first returned.
    pub fn generate(
        &mut self,
        request: &GenerationRequest,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> std::result::Result<ArtifactHandle, PipelineError> {
        let generation_id = new_generation_id();
        match self.generate_inner(&generation_id, request, progress, cancel) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                let classified = classify_failure(&err);
                self.events
                    .emit(
                        "generation_failed",
                        map_object(json!({
                            "generation_id": generation_id,
                            "error_kind": classified.kind.as_str(),
                            "error": classified.message,
                        })),
                    )
                    .ok();
                Err(classified)
            }
        }
    }

    fn generate_inner(
        &mut self,
        generation_id: &str,
        request: &GenerationRequest,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ArtifactHandle> {
        let started = Instant::now();
        request.validate()?;
        // The key is read once here; submit, poll, and download all reuse it.
        let api_key = self
            .credentials
            .api_key()
            .ok_or_else(PipelineError::missing_credential)?;
        self.warnings.clear();
        ensure_not_cancelled(cancel)?;

        self.events.emit(
            "generation_started",
            map_object(json!({
                "generation_id": generation_id,
                "prompt": request.prompt,
                "aspect_ratio": request.aspect_ratio.api_value(),
                "target_length": request.target_length,
            })),
        )?;
        progress.update(MILESTONE_WARMING_UP);

        let initial_plan = StagePlan {
            stage: STAGE_INITIAL,
            model: self.config.model.clone(),
            prompt: request.prompt.clone(),
            aspect_ratio: request.aspect_ratio.api_value(),
            input: StageInput::Image {
                bytes: request.image.bytes.clone(),
                media_type: request.image.media_type.clone(),
            },
            poll_milestone: MILESTONE_GENERATING,
            missing_result_text: if request.target_length.requires_extension() {
                MISSING_INITIAL_RESULT_TEXT
            } else {
                MISSING_FINAL_RESULT_TEXT
            },
        };
        let initial = self.run_stage(generation_id, &initial_plan, &api_key, progress, cancel)?;

        let mut stage_records = vec![initial.record.clone()];
        let final_stage = if request.target_length.requires_extension() {
            // Fixed wait, not a poll: the finished clip needs a moment to
            // become retrievable before it can be reused as input.
            self.wait(self.config.settle_delay, cancel)?;
            progress.update(MILESTONE_FINALIZING);
            let extension_plan = StagePlan {
                stage: STAGE_EXTENSION,
                model: self
                    .config
                    .extension_model
                    .clone()
                    .unwrap_or_else(|| self.config.model.clone()),
                prompt: request.prompt.clone(),
                aspect_ratio: request.aspect_ratio.api_value(),
                input: StageInput::Video {
                    uri: initial.video_uri.clone(),
                },
                poll_milestone: MILESTONE_EXTENDING,
                missing_result_text: MISSING_FINAL_RESULT_TEXT,
            };
            let extension =
                self.run_stage(generation_id, &extension_plan, &api_key, progress, cancel)?;
            stage_records.push(extension.record.clone());
            extension
        } else {
            initial
        };

        progress.update(MILESTONE_DOWNLOADING);
        ensure_not_cancelled(cancel)?;
        let artifact = self.download_artifact(generation_id, &final_stage.video_uri, &api_key)?;

        let stamp = timestamp_millis();
        let tag = generation_id.get(..8).unwrap_or(generation_id);
        let receipt_path = self
            .config
            .run_dir
            .join(format!("receipt-{stamp}-{tag}.json"));
        let result_metadata = map_object(json!({
            "byte_len": artifact.byte_len,
            "mime_type": artifact.mime_type,
            "elapsed_s": started.elapsed().as_secs_f64(),
            "finished_at": now_utc_iso(),
        }));
        let input_digest = hex_sha256(&request.image.bytes);
        let receipt = build_receipt(
            generation_id,
            request,
            Some(input_digest.as_str()),
            &stage_records,
            &self.warnings,
            &artifact.path,
            &receipt_path,
            &result_metadata,
        );
        write_receipt(&receipt_path, &receipt)?;

        self.events.emit(
            "generation_finished",
            map_object(json!({
                "generation_id": generation_id,
                "video_path": artifact.path.to_string_lossy().to_string(),
                "receipt_path": receipt_path.to_string_lossy().to_string(),
                "elapsed_s": started.elapsed().as_secs_f64(),
            })),
        )?;
        Ok(artifact)
    }

    /// One submit+poll-to-completion cycle. Both pipeline stages run
    /// through here; `plan` carries everything that differs.
    fn run_stage(
        &mut self,
        generation_id: &str,
        plan: &StagePlan,
        api_key: &str,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<CompletedStage> {
        ensure_not_cancelled(cancel)?;
        let submitted = self
            .client
            .submit(plan, api_key)
            .with_context(|| format!("{} stage submit failed", plan.stage))?;
        self.events.emit(
            "stage_submitted",
            map_object(json!({
                "generation_id": generation_id,
                "stage": plan.stage,
                "model": plan.model,
                "operation": submitted.name,
            })),
        )?;
        progress.update(plan.poll_milestone);

        let (operation, polls) = self.poll_until_done(&submitted, api_key, cancel)?;
        if let Some(error_text) = operation.error_text() {
            bail!("{} stage failed: {error_text}", plan.stage);
        }
        let video_uri = operation
            .video_uri()
            .ok_or_else(|| PipelineError::missing_result(plan.missing_result_text))?;

        self.events.emit(
            "stage_completed",
            map_object(json!({
                "generation_id": generation_id,
                "stage": plan.stage,
                "operation": operation.name,
                "polls": polls,
            })),
        )?;
        Ok(CompletedStage {
            record: StageRecord {
                stage: plan.stage.to_string(),
                model: plan.model.clone(),
                operation: operation.name.clone(),
                polls,
                video_uri: Some(video_uri.clone()),
                request_payload: stage_payload_summary(plan),
            },
            video_uri,
        })
    }

    /// Polls until the service reports the operation done. Fixed interval,
    /// no backoff; an already-done operation is returned untouched without
    /// a single poll call. Returns the final snapshot and the number of
    /// poll calls made.
    fn poll_until_done(
        &self,
        operation: &RemoteOperation,
        api_key: &str,
        cancel: &CancelToken,
    ) -> Result<(RemoteOperation, u64)> {
        let started = Instant::now();
        let mut current = operation.clone();
        let mut polls = 0u64;
        while !current.is_done() {
            if let Some(max_wait) = self.config.poll.max_wait {
                if started.elapsed() >= max_wait {
                    bail!(
                        "video operation still pending after {:.0}s ({})",
                        max_wait.as_secs_f64(),
                        current.name
                    );
                }
            }
            self.wait(self.config.poll.interval, cancel)?;
            let operation_name = current.name.clone();
            current = self
                .client
                .poll(&current, api_key)
                .with_context(|| format!("video poll failed ({operation_name})"))?;
            polls += 1;
        }
        Ok((current, polls))
    }

    /// Sleeps in short slices so a cancel lands within a beat instead of a
    /// full poll interval.
    fn wait(&self, total: Duration, cancel: &CancelToken) -> Result<()> {
        let started = Instant::now();
        while started.elapsed() < total {
            ensure_not_cancelled(cancel)?;
            let remaining = total.saturating_sub(started.elapsed());
            thread::sleep(remaining.min(CANCEL_CHECK_SLICE));
        }
        ensure_not_cancelled(cancel)
    }

    fn download_artifact(
        &mut self,
        generation_id: &str,
        uri: &str,
        api_key: &str,
    ) -> Result<ArtifactHandle> {
        let fetched = self.fetcher.fetch(uri, api_key)?;
        if fetched.mime_type.is_none() {
            push_unique_warning(
                &mut self.warnings,
                "video download had no content type; assuming video/mp4".to_string(),
            );
        }
        let mime_type = fetched
            .mime_type
            .clone()
            .unwrap_or_else(|| "video/mp4".to_string());
        let ext = extension_from_mime(&mime_type);
        let tag = generation_id.get(..8).unwrap_or(generation_id);
        let path = self
            .config
            .run_dir
            .join(format!("clip-{}-{tag}.{ext}", timestamp_millis()));
        fs::write(&path, &fetched.bytes)
            .with_context(|| format!("failed to save {}", path.display()))?;
        self.events.emit(
            "artifact_downloaded",
            map_object(json!({
                "generation_id": generation_id,
                "video_path": path.to_string_lossy().to_string(),
                "byte_len": fetched.bytes.len() as u64,
                "mime_type": mime_type,
            })),
        )?;
        Ok(ArtifactHandle {
            path,
            byte_len: fetched.bytes.len() as u64,
            mime_type,
        })
    }
}

fn ensure_not_cancelled(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PipelineError::cancelled().into());
    }
    Ok(())
}

fn stage_payload_summary(plan: &StagePlan) -> Map<String, Value> {
    let input = match &plan.input {
        StageInput::Image { bytes, media_type } => json!({
            "kind": "image",
            "media_type": media_type,
            "byte_len": bytes.len() as u64,
        }),
        StageInput::Video { uri } => json!({
            "kind": "video",
            "uri": uri,
        }),
    };
    map_object(json!({
        "prompt": plan.prompt,
        "aspect_ratio": plan.aspect_ratio,
        "input": input,
    }))
}

fn extract_video_uri(payload: &Value) -> Option<String> {
    let response = payload.get("response")?;
    let container = response
        .get("generateVideoResponse")
        .or_else(|| response.get("generate_video_response"))
        .unwrap_or(response);
    let samples = container
        .get("generatedSamples")
        .or_else(|| container.get("generated_samples"))
        .or_else(|| container.get("generatedVideos"))
        .or_else(|| container.get("generated_videos"))
        .and_then(Value::as_array)?;
    let first = samples.first()?;
    let video = first.get("video").unwrap_or(first);
    video
        .get("uri")
        .or_else(|| video.get("url"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn response_json_or_error(label: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{label} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{label} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{label} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn push_unique_warning(warnings: &mut Vec<String>, message: String) {
    if message.trim().is_empty() {
        return;
    }
    if warnings.iter().any(|existing| existing == &message) {
        return;
    }
    warnings.push(message);
}

fn append_key_param(uri: &str, api_key: &str) -> String {
    if uri.contains('?') {
        format!("{uri}&key={api_key}")
    } else {
        format!("{uri}?key={api_key}")
    }
}

fn extension_from_mime(mime: &str) -> &'static str {
    let normalized = mime
        .split(';')
        .next()
        .unwrap_or(mime)
        .trim()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/ogg" => "ogv",
        _ => "mp4",
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn now_utc_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}
