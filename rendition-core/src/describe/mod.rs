//! Description resolution: turns an input into the slug that names its
//! artifacts.
//!
//! The external service is best-effort. Every failure, including a missing
//! credential, resolves to the deterministic `generic-media-<prefix>` slug, so
//! nothing here can fail a file.

mod http;
mod slug;

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tempfile::Builder as TempBuilder;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{stderr_tail, CommandExecutor};
use crate::config::DescribeSection;
use crate::fingerprint::Fingerprint;
use crate::media::{InputFile, MediaKind};

pub use http::HttpDescriptionService;
pub use slug::{DescriptionSlug, FALLBACK_PREFIX};

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DescriptionUnavailable {
    #[error("description disabled")]
    Disabled,
    #[error("credential {0} not set")]
    MissingCredential(String),
    #[error("credential rejected with status {0}")]
    Unauthorized(u16),
    #[error("quota exceeded")]
    QuotaExceeded,
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("empty or unusable description")]
    EmptyResponse,
    #[error("frame extraction failed: {0}")]
    FrameExtraction(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SlugSource {
    Described,
    Fallback { reason: DescriptionUnavailable },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub slug: DescriptionSlug,
    #[serde(flatten)]
    pub source: SlugSource,
    /// The service's text, trimmed. Absent for fallback slugs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Resolution {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, SlugSource::Fallback { .. })
    }

    /// Human-readable text for the artifacts: the description when there is
    /// one, otherwise the slug's words.
    pub fn caption(&self) -> String {
        match &self.description {
            Some(text) => text.clone(),
            None => self.slug.as_str().replace('-', " "),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DescriptionRequest {
    pub media_type: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait DescriptionService: Send + Sync {
    async fn describe(&self, request: &DescriptionRequest) -> Result<String, DescriptionUnavailable>;

    /// Known-unavailable services report it up front so the resolver skips
    /// preparing a request.
    fn unavailable(&self) -> Option<DescriptionUnavailable> {
        None
    }
}

/// Stand-in used when the service is disabled or cannot be configured.
#[derive(Debug, Clone)]
pub struct UnavailableService {
    reason: DescriptionUnavailable,
}

impl UnavailableService {
    pub fn new(reason: DescriptionUnavailable) -> Self {
        Self { reason }
    }
}

#[async_trait]
impl DescriptionService for UnavailableService {
    async fn describe(&self, _request: &DescriptionRequest) -> Result<String, DescriptionUnavailable> {
        Err(self.reason.clone())
    }

    fn unavailable(&self) -> Option<DescriptionUnavailable> {
        Some(self.reason.clone())
    }
}

/// Builds the configured service. A blank or absent credential yields an
/// [`UnavailableService`] and no network traffic.
pub fn service_from_settings(
    settings: &DescribeSection,
    credential: Option<String>,
) -> Arc<dyn DescriptionService> {
    if !settings.enabled {
        return Arc::new(UnavailableService::new(DescriptionUnavailable::Disabled));
    }
    let credential = credential.filter(|value| !value.trim().is_empty());
    let Some(credential) = credential else {
        return Arc::new(UnavailableService::new(
            DescriptionUnavailable::MissingCredential(settings.credential_env.clone()),
        ));
    };
    match HttpDescriptionService::new(settings, credential) {
        Ok(service) => Arc::new(service),
        Err(reason) => Arc::new(UnavailableService::new(reason)),
    }
}

/// Same as [`service_from_settings`], reading the credential from the
/// environment variable named in `credential_env`.
pub fn service_from_env(settings: &DescribeSection) -> Arc<dyn DescriptionService> {
    let credential = std::env::var(&settings.credential_env).ok();
    service_from_settings(settings, credential)
}

pub struct DescriptionResolver {
    service: Arc<dyn DescriptionService>,
    executor: Arc<dyn CommandExecutor>,
    ffmpeg: PathBuf,
    max_slug_len: usize,
    fallback_prefix_len: usize,
    frame_offset_seconds: f64,
}

impl DescriptionResolver {
    pub fn new(
        service: Arc<dyn DescriptionService>,
        executor: Arc<dyn CommandExecutor>,
        ffmpeg: impl Into<PathBuf>,
        settings: &DescribeSection,
    ) -> Self {
        Self {
            service,
            executor,
            ffmpeg: ffmpeg.into(),
            max_slug_len: settings.max_slug_len.max(1),
            fallback_prefix_len: settings.fallback_prefix_len,
            frame_offset_seconds: settings.frame_offset_seconds.max(0.0),
        }
    }

    pub async fn resolve(&self, input: &InputFile, fingerprint: &Fingerprint) -> Resolution {
        match self.describe(input).await {
            Ok((slug, text)) => {
                info!(
                    target: "describe",
                    path = %input.path.display(),
                    slug = %slug,
                    "description resolved"
                );
                Resolution {
                    slug,
                    source: SlugSource::Described,
                    description: Some(text),
                }
            }
            Err(reason) => {
                let slug = DescriptionSlug::fallback(fingerprint, self.fallback_prefix_len);
                warn!(
                    target: "describe",
                    path = %input.path.display(),
                    slug = %slug,
                    "description unavailable: {reason}"
                );
                Resolution {
                    slug,
                    source: SlugSource::Fallback { reason },
                    description: None,
                }
            }
        }
    }

    async fn describe(
        &self,
        input: &InputFile,
    ) -> Result<(DescriptionSlug, String), DescriptionUnavailable> {
        if let Some(reason) = self.service.unavailable() {
            return Err(reason);
        }
        let request = self.prepare_request(input).await?;
        let text = self.service.describe(&request).await?;
        let slug = DescriptionSlug::from_text(&text, self.max_slug_len)
            .ok_or(DescriptionUnavailable::EmptyResponse)?;
        Ok((slug, text.trim().to_string()))
    }

    async fn prepare_request(
        &self,
        input: &InputFile,
    ) -> Result<DescriptionRequest, DescriptionUnavailable> {
        match input.kind {
            MediaKind::Video => Ok(DescriptionRequest {
                media_type: "image/jpeg".to_string(),
                file_name: format!("{}.jpg", input.file_name()),
                data: self.extract_frame(input).await?,
            }),
            _ => Ok(DescriptionRequest {
                media_type: input.media_type().to_string(),
                file_name: input.file_name(),
                data: input.bytes.clone(),
            }),
        }
    }

    /// Grabs one JPEG frame at the configured offset, falling back to the
    /// first frame for clips shorter than the offset.
    async fn extract_frame(&self, input: &InputFile) -> Result<Vec<u8>, DescriptionUnavailable> {
        match self.grab_frame(input, self.frame_offset_seconds).await {
            Err(reason) if self.frame_offset_seconds > 0.0 => {
                debug!(
                    target: "describe",
                    path = %input.path.display(),
                    offset = self.frame_offset_seconds,
                    "no frame at offset, retrying from start: {reason}"
                );
                self.grab_frame(input, 0.0).await
            }
            result => result,
        }
    }

    async fn grab_frame(
        &self,
        input: &InputFile,
        offset_seconds: f64,
    ) -> Result<Vec<u8>, DescriptionUnavailable> {
        let frame = TempBuilder::new()
            .prefix(".frame-")
            .suffix(".jpg")
            .tempfile()
            .map_err(|err| DescriptionUnavailable::FrameExtraction(err.to_string()))?
            .into_temp_path();
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-ss".into(),
            format!("{offset_seconds:.3}").into(),
            "-i".into(),
            input.path.clone().into_os_string(),
            "-frames:v".into(),
            "1".into(),
            "-q:v".into(),
            "3".into(),
            frame.to_path_buf().into_os_string(),
        ];
        let output = self
            .executor
            .run(&self.ffmpeg, &args)
            .await
            .map_err(|err| DescriptionUnavailable::FrameExtraction(err.to_string()))?;
        if !output.status.success() {
            return Err(DescriptionUnavailable::FrameExtraction(stderr_tail(&output)));
        }
        let bytes = tokio::fs::read(&frame)
            .await
            .map_err(|err| DescriptionUnavailable::FrameExtraction(err.to_string()))?;
        if bytes.is_empty() {
            return Err(DescriptionUnavailable::FrameExtraction(
                "ffmpeg produced an empty frame".to_string(),
            ));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SystemCommandExecutor;
    use crate::fingerprint::fingerprint;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticService {
        reply: Result<String, DescriptionUnavailable>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DescriptionService for StaticService {
        async fn describe(
            &self,
            _request: &DescriptionRequest,
        ) -> Result<String, DescriptionUnavailable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn resolver(service: Arc<dyn DescriptionService>) -> DescriptionResolver {
        DescriptionResolver::new(
            service,
            Arc::new(SystemCommandExecutor),
            "ffmpeg",
            &DescribeSection::default(),
        )
    }

    #[tokio::test]
    async fn described_text_is_sanitized() {
        let service = Arc::new(StaticService {
            reply: Ok("A cat playing with yarn.".to_string()),
            calls: AtomicUsize::new(0),
        });
        let input = InputFile::new("cat.jpg", b"jpeg bytes".to_vec());
        let resolution = resolver(service.clone())
            .resolve(&input, &fingerprint(&input.bytes))
            .await;
        assert_eq!(resolution.slug.as_str(), "a-cat-playing-with-yarn");
        assert_eq!(resolution.source, SlugSource::Described);
        assert_eq!(resolution.caption(), "A cat playing with yarn.");
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn service_error_falls_back() {
        let service = Arc::new(StaticService {
            reply: Err(DescriptionUnavailable::QuotaExceeded),
            calls: AtomicUsize::new(0),
        });
        let input = InputFile::new("cat.jpg", b"jpeg bytes".to_vec());
        let fp = fingerprint(&input.bytes);
        let resolution = resolver(service).resolve(&input, &fp).await;
        assert_eq!(
            resolution.slug.as_str(),
            format!("generic-media-{}", fp.short(8))
        );
        assert_eq!(
            resolution.source,
            SlugSource::Fallback {
                reason: DescriptionUnavailable::QuotaExceeded
            }
        );
        assert_eq!(resolution.description, None);
        assert_eq!(resolution.caption(), format!("generic media {}", fp.short(8)));
    }

    #[tokio::test]
    async fn unusable_text_falls_back() {
        let service = Arc::new(StaticService {
            reply: Ok("!!!".to_string()),
            calls: AtomicUsize::new(0),
        });
        let input = InputFile::new("cat.jpg", b"jpeg bytes".to_vec());
        let resolution = resolver(service)
            .resolve(&input, &fingerprint(&input.bytes))
            .await;
        assert!(resolution.is_fallback());
    }

    #[tokio::test]
    async fn missing_credential_never_calls_out() {
        let settings = DescribeSection::default();
        let service = service_from_settings(&settings, Some("   ".to_string()));
        assert_eq!(
            service.unavailable(),
            Some(DescriptionUnavailable::MissingCredential(
                settings.credential_env.clone()
            ))
        );
        let input = InputFile::new("clip.mp4", b"not really video".to_vec());
        let resolution = resolver(service)
            .resolve(&input, &fingerprint(&input.bytes))
            .await;
        assert!(resolution.slug.as_str().starts_with("generic-media-"));
    }

    #[test]
    fn disabled_settings_short_circuit() {
        let settings = DescribeSection {
            enabled: false,
            ..DescribeSection::default()
        };
        let service = service_from_settings(&settings, Some("token".to_string()));
        assert_eq!(service.unavailable(), Some(DescriptionUnavailable::Disabled));
    }

    #[cfg(unix)]
    mod frames {
        use super::*;
        use std::os::unix::process::ExitStatusExt;
        use std::path::Path;
        use std::process::{ExitStatus, Output};
        use std::sync::Mutex;

        const FRAME_BYTES: &[u8] = b"\xff\xd8\xff\xe0 first frame";

        /// Writes a frame only when asked to seek to the very start, like
        /// ffmpeg on a clip shorter than the configured offset.
        #[derive(Default)]
        struct StartOnlyFrames {
            seeks: Mutex<Vec<String>>,
        }

        #[async_trait]
        impl CommandExecutor for StartOnlyFrames {
            async fn run(&self, _program: &Path, args: &[OsString]) -> std::io::Result<Output> {
                let rendered: Vec<String> =
                    args.iter().map(|a| a.to_string_lossy().to_string()).collect();
                let seek = rendered
                    .iter()
                    .position(|a| a == "-ss")
                    .map(|index| rendered[index + 1].clone())
                    .unwrap_or_default();
                if seek == "0.000" {
                    if let Some(frame) = args.last() {
                        std::fs::write(frame, FRAME_BYTES)?;
                    }
                }
                self.seeks.lock().unwrap().push(seek);
                Ok(Output {
                    status: ExitStatus::from_raw(0),
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                })
            }
        }

        #[derive(Default)]
        struct RecordingService {
            requests: Mutex<Vec<DescriptionRequest>>,
        }

        #[async_trait]
        impl DescriptionService for RecordingService {
            async fn describe(
                &self,
                request: &DescriptionRequest,
            ) -> Result<String, DescriptionUnavailable> {
                self.requests.lock().unwrap().push(request.clone());
                Ok("Waves at dusk".to_string())
            }
        }

        fn resolver_with(
            service: Arc<RecordingService>,
            executor: Arc<StartOnlyFrames>,
            frame_offset_seconds: f64,
        ) -> DescriptionResolver {
            DescriptionResolver::new(
                service,
                executor,
                "ffmpeg",
                &DescribeSection {
                    frame_offset_seconds,
                    ..DescribeSection::default()
                },
            )
        }

        #[tokio::test]
        async fn short_clip_is_described_from_its_first_frame() {
            let executor = Arc::new(StartOnlyFrames::default());
            let service = Arc::new(RecordingService::default());
            let input = InputFile::new("clips/sea.mp4", Vec::new());
            let resolution = resolver_with(service.clone(), executor.clone(), 1.0)
                .resolve(&input, &fingerprint(b"half a second of sea"))
                .await;

            assert_eq!(resolution.slug.as_str(), "waves-at-dusk");
            assert_eq!(*executor.seeks.lock().unwrap(), vec!["1.000", "0.000"]);
            let requests = service.requests.lock().unwrap();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].media_type, "image/jpeg");
            assert_eq!(requests[0].file_name, "sea.mp4.jpg");
            assert_eq!(requests[0].data, FRAME_BYTES);
        }

        #[tokio::test]
        async fn zero_offset_extracts_once() {
            let executor = Arc::new(StartOnlyFrames::default());
            let service = Arc::new(RecordingService::default());
            let input = InputFile::new("clips/sea.webm", Vec::new());
            let resolution = resolver_with(service.clone(), executor.clone(), 0.0)
                .resolve(&input, &fingerprint(b"sea"))
                .await;

            assert!(!resolution.is_fallback());
            assert_eq!(*executor.seeks.lock().unwrap(), vec!["0.000"]);
            assert_eq!(service.requests.lock().unwrap().len(), 1);
        }
    }
}
