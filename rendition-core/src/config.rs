use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    pub paths: PathsSection,
    #[serde(default)]
    pub completion: CompletionSection,
    #[serde(default)]
    pub describe: DescribeSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub image: ImageSection,
    #[serde(default)]
    pub video: VideoSection,
    #[serde(default)]
    pub metadata: MetadataSection,
    #[serde(default)]
    pub publish: PublishSection,
}

impl PipelineConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.input_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.output_dir)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.state_dir)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.logs_dir)
    }

    /// Location of the completion store: the flag directory for the file
    /// backend, the database file for the sqlite backend.
    pub fn completion_location(&self) -> PathBuf {
        match &self.completion.path {
            Some(path) => self.resolve_path(path),
            None => match self.completion.backend {
                CompletionBackend::File => self.state_dir().join("flags"),
                CompletionBackend::Sqlite => self.state_dir().join("completion.sqlite"),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub input_dir: String,
    pub output_dir: String,
    pub state_dir: String,
    pub logs_dir: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionBackend {
    #[default]
    File,
    Sqlite,
}

impl CompletionBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionBackend::File => "file",
            CompletionBackend::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CompletionSection {
    #[serde(default)]
    pub backend: CompletionBackend,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DescribeSection {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub prompt: String,
    /// Name of the environment variable holding the service credential.
    pub credential_env: String,
    pub timeout_seconds: u64,
    pub max_slug_len: usize,
    pub fallback_prefix_len: usize,
    pub frame_offset_seconds: f64,
}

impl Default for DescribeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://127.0.0.1:8787/v1/describe".to_string(),
            model: "vision-small".to_string(),
            prompt: "Describe this media in five to eight plain words suitable for a file name."
                .to_string(),
            credential_env: "RENDITION_DESCRIBE_API_KEY".to_string(),
            timeout_seconds: 30,
            max_slug_len: 60,
            fallback_prefix_len: 8,
            frame_offset_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub magick: String,
    pub exiftool: String,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            magick: "convert".to_string(),
            exiftool: "exiftool".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageSection {
    pub jpeg_quality: u8,
    pub webp_quality: u8,
}

impl Default for ImageSection {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            webp_quality: 80,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoSection {
    pub h264_preset: String,
    pub h264_crf: u8,
    pub aac_bitrate: String,
    pub vp9_crf: u8,
    pub opus_bitrate: String,
}

impl Default for VideoSection {
    fn default() -> Self {
        Self {
            h264_preset: "medium".to_string(),
            h264_crf: 23,
            aac_bitrate: "128k".to_string(),
            vp9_crf: 32,
            opus_bitrate: "96k".to_string(),
        }
    }
}

/// Source metadata carried onto every rendition.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataSection {
    /// When set, encoders keep source tags and `exiftool` copies them onto
    /// each artifact. When cleared, tags are stripped.
    pub preserve: bool,
}

impl Default for MetadataSection {
    fn default() -> Self {
        Self { preserve: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    /// Prefix joined in front of `images/<file>` in page srcsets. The
    /// default is relative to the `html/` directory.
    pub asset_base_url: String,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            asset_base_url: "../".to_string(),
        }
    }
}

pub fn load_pipeline_config<P: AsRef<Path>>(path: P) -> ConfigResult<PipelineConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> ConfigResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
