use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Bytes read from the start of a file for kind detection.
pub const HEADER_LEN: u64 = 64;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff", "heic", "heif", "avif",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "mkv", "webm", "avi", "mpg", "mpeg", "wmv", "flv", "3gp", "ts",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Unsupported,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Unsupported => "unsupported",
        }
    }

    /// Extension first, then magic bytes for files with no usable extension.
    pub fn detect(path: &Path, bytes: &[u8]) -> Self {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        match extension.as_deref() {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => return MediaKind::Image,
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => return MediaKind::Video,
            _ => {}
        }
        sniff(bytes)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn sniff(bytes: &[u8]) -> MediaKind {
    if image::guess_format(bytes).is_ok() {
        return MediaKind::Image;
    }
    let iso_bmff = bytes.len() >= 12 && &bytes[4..8] == b"ftyp";
    if iso_bmff {
        // HEIF stills share the ISO container with mp4/mov.
        return match &bytes[8..12] {
            b"heic" | b"heix" | b"mif1" | b"msf1" | b"avif" => MediaKind::Image,
            _ => MediaKind::Video,
        };
    }
    let matroska = bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]);
    let avi = bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"AVI ";
    if matroska || avi {
        return MediaKind::Video;
    }
    MediaKind::Unsupported
}

/// The first [`HEADER_LEN`] bytes of `path`, or fewer for short files.
pub async fn read_header(path: &Path) -> io::Result<Vec<u8>> {
    let file = File::open(path).await?;
    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    file.take(HEADER_LEN).read_to_end(&mut header).await?;
    Ok(header)
}

/// A discovered input and what kind of media it is. Images carry their
/// bytes; videos are left on disk and read by the tools directly.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub kind: MediaKind,
}

impl InputFile {
    pub fn new(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        let path = path.into();
        let kind = MediaKind::detect(&path, &bytes);
        Self { path, bytes, kind }
    }

    /// An input whose kind was already detected and whose bytes stay on disk.
    pub fn streamed(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            bytes: Vec::new(),
            kind,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// MIME type sent alongside the bytes to the description service.
    pub fn media_type(&self) -> &'static str {
        let extension = self
            .path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        match (self.kind, extension.as_deref()) {
            (MediaKind::Image, Some("png")) => "image/png",
            (MediaKind::Image, Some("webp")) => "image/webp",
            (MediaKind::Image, Some("gif")) => "image/gif",
            (MediaKind::Image, Some("heic" | "heif")) => "image/heic",
            (MediaKind::Image, Some("avif")) => "image/avif",
            (MediaKind::Image, _) => "image/jpeg",
            (MediaKind::Video, Some("webm")) => "video/webm",
            (MediaKind::Video, Some("mov")) => "video/quicktime",
            (MediaKind::Video, _) => "video/mp4",
            (MediaKind::Unsupported, _) => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_decides_kind() {
        assert_eq!(MediaKind::detect(Path::new("cat.JPG"), b""), MediaKind::Image);
        assert_eq!(MediaKind::detect(Path::new("clip.mov"), b""), MediaKind::Video);
        assert_eq!(
            MediaKind::detect(Path::new("notes.txt"), b"plain text"),
            MediaKind::Unsupported
        );
    }

    #[test]
    fn magic_bytes_cover_missing_extension() {
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        assert_eq!(MediaKind::detect(Path::new("upload"), png), MediaKind::Image);

        let mp4 = b"\0\0\0\x18ftypisom\0\0\0\0";
        assert_eq!(MediaKind::detect(Path::new("upload"), mp4), MediaKind::Video);

        let heic = b"\0\0\0\x18ftypheic\0\0\0\0";
        assert_eq!(MediaKind::detect(Path::new("upload"), heic), MediaKind::Image);

        let webm = [0x1A, 0x45, 0xDF, 0xA3, 0x01, 0x00];
        assert_eq!(MediaKind::detect(Path::new("upload.bin"), &webm), MediaKind::Video);
    }

    #[test]
    fn media_type_follows_extension() {
        let input = InputFile::new("shots/beach.png", Vec::new());
        assert_eq!(input.kind, MediaKind::Image);
        assert_eq!(input.media_type(), "image/png");
        assert_eq!(input.file_name(), "beach.png");
    }

    #[tokio::test]
    async fn header_is_bounded() {
        let dir = tempfile::TempDir::new().unwrap();
        let long = dir.path().join("upload");
        let mut bytes = b"\0\0\0\x18ftypisom".to_vec();
        bytes.resize(4096, 7);
        std::fs::write(&long, &bytes).unwrap();
        let header = read_header(&long).await.unwrap();
        assert_eq!(header.len(), HEADER_LEN as usize);
        assert_eq!(MediaKind::detect(&long, &header), MediaKind::Video);

        let short = dir.path().join("short.bin");
        std::fs::write(&short, b"abc").unwrap();
        assert_eq!(read_header(&short).await.unwrap(), b"abc");
    }
}
