//! Companion files written next to the ladder output: a markdown record of
//! each input's description and, for stills, an HTML page serving the
//! responsive renditions.
//!
//! These are written after every rung is in place and before the completion
//! flag, so a failure here leaves the input unflagged.

mod page;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::describe::{DescriptionSlug, Resolution, SlugSource};
use crate::fingerprint::Fingerprint;
use crate::media::{InputFile, MediaKind};

pub use page::{escape_html, render_image_page};

pub const DESCRIPTION_DIR: &str = "descriptions";
pub const HTML_DIR: &str = "html";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type PublishResult<T> = Result<T, PublishError>;

/// Companion file paths for one input: the description record for every
/// supported kind, then the page for images.
pub fn planned_pages(output_dir: &Path, kind: MediaKind, slug: &DescriptionSlug) -> Vec<PathBuf> {
    let mut pages = Vec::with_capacity(2);
    if kind == MediaKind::Unsupported {
        return pages;
    }
    pages.push(output_dir.join(DESCRIPTION_DIR).join(format!("{slug}.md")));
    if kind == MediaKind::Image {
        pages.push(output_dir.join(HTML_DIR).join(format!("{slug}.html")));
    }
    pages
}

pub struct Publisher {
    output_dir: PathBuf,
    asset_base_url: String,
}

impl Publisher {
    pub fn new(output_dir: impl Into<PathBuf>, asset_base_url: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            asset_base_url: asset_base_url.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.output_dir(), config.publish.asset_base_url.clone())
    }

    /// Writes the description record, plus the page for images. Returns the
    /// written paths in the order of [`planned_pages`].
    pub fn publish(
        &self,
        input: &InputFile,
        fingerprint: &Fingerprint,
        resolution: &Resolution,
    ) -> PublishResult<Vec<PathBuf>> {
        let planned = planned_pages(&self.output_dir, input.kind, &resolution.slug);
        let caption = resolution.caption();
        for path in &planned {
            let contents = if path.extension().is_some_and(|ext| ext == "html") {
                render_image_page(&self.asset_base_url, &resolution.slug, &caption)
            } else {
                description_record(input, fingerprint, resolution, &caption)
            };
            write_atomic(path, contents.as_bytes())?;
            debug!(target: "publish", path = %path.display(), "page written");
        }
        Ok(planned)
    }
}

fn description_record(
    input: &InputFile,
    fingerprint: &Fingerprint,
    resolution: &Resolution,
    caption: &str,
) -> String {
    let source = match &resolution.source {
        SlugSource::Described => "description service".to_string(),
        SlugSource::Fallback { reason } => format!("fallback ({reason})"),
    };
    format!(
        "# {slug}\n\n{caption}\n\n- file: {file}\n- kind: {kind}\n- fingerprint: {fingerprint}\n- slug source: {source}\n",
        slug = resolution.slug,
        file = input.file_name(),
        kind = input.kind,
    )
}

fn write_atomic(path: &Path, contents: &[u8]) -> PublishResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let io_error = |source| PublishError::Io {
        source,
        path: path.to_path_buf(),
    };
    fs::create_dir_all(dir).map_err(io_error)?;
    let mut staged = NamedTempFile::new_in(dir).map_err(io_error)?;
    staged.write_all(contents).map_err(io_error)?;
    staged.persist(path).map_err(|err| io_error(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::DescriptionUnavailable;
    use crate::fingerprint::fingerprint;
    use tempfile::TempDir;

    fn resolution(text: Option<&str>, fp: &Fingerprint) -> Resolution {
        match text {
            Some(text) => Resolution {
                slug: DescriptionSlug::from_text(text, 60).unwrap(),
                source: SlugSource::Described,
                description: Some(text.to_string()),
            },
            None => Resolution {
                slug: DescriptionSlug::fallback(fp, 8),
                source: SlugSource::Fallback {
                    reason: DescriptionUnavailable::QuotaExceeded,
                },
                description: None,
            },
        }
    }

    #[test]
    fn image_gets_record_and_page() {
        let dir = TempDir::new().unwrap();
        let input = InputFile::new("in/kite.jpg", b"jpeg".to_vec());
        let fp = fingerprint(&input.bytes);
        let publisher = Publisher::new(dir.path(), "../");
        let written = publisher
            .publish(&input, &fp, &resolution(Some("Red kite & sky"), &fp))
            .unwrap();
        assert_eq!(
            written,
            vec![
                dir.path().join("descriptions/red-kite-sky.md"),
                dir.path().join("html/red-kite-sky.html"),
            ]
        );
        let record = fs::read_to_string(&written[0]).unwrap();
        assert!(record.starts_with("# red-kite-sky\n\nRed kite & sky\n"));
        assert!(record.contains(fp.as_str()));
        let page = fs::read_to_string(&written[1]).unwrap();
        assert!(page.contains(r#"alt="Red kite &amp; sky""#));
    }

    #[test]
    fn video_gets_record_only() {
        let dir = TempDir::new().unwrap();
        let input = InputFile::streamed("in/clip.mp4", MediaKind::Video);
        let fp = fingerprint(b"clip");
        let written = Publisher::new(dir.path(), "../")
            .publish(&input, &fp, &resolution(None, &fp))
            .unwrap();
        let expected = dir
            .path()
            .join(format!("descriptions/generic-media-{}.md", fp.short(8)));
        assert_eq!(written, vec![expected.clone()]);
        let record = fs::read_to_string(expected).unwrap();
        assert!(record.contains("slug source: fallback (quota exceeded)"));
        assert!(!dir.path().join(HTML_DIR).exists());
    }

    #[test]
    fn blocked_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(HTML_DIR), b"not a directory").unwrap();
        let input = InputFile::new("in/kite.jpg", b"jpeg".to_vec());
        let fp = fingerprint(&input.bytes);
        let err = Publisher::new(dir.path(), "../")
            .publish(&input, &fp, &resolution(Some("kite"), &fp))
            .unwrap_err();
        assert!(matches!(err, PublishError::Io { .. }));
    }
}
