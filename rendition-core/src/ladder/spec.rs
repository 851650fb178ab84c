use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::describe::DescriptionSlug;
use crate::media::MediaKind;

pub const IMAGE_LADDER_VERSION: u32 = 1;
pub const VIDEO_LADDER_VERSION: u32 = 1;

pub const IMAGE_DIR: &str = "images";
pub const VIDEO_DIR: &str = "videos";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Width,
    Height,
}

impl Axis {
    pub fn unit(&self) -> &'static str {
        match self {
            Axis::Width => "w",
            Axis::Height => "p",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    Jpeg,
    Webp,
    Mp4,
    Webm,
}

impl ContainerFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Jpeg => "jpg",
            ContainerFormat::Webp => "webp",
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Webm => "webm",
        }
    }
}

/// One row of a ladder: a container at a bounded dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputSpec {
    pub format: ContainerFormat,
    pub dimension: u32,
    pub axis: Axis,
}

impl OutputSpec {
    pub const fn new(format: ContainerFormat, dimension: u32, axis: Axis) -> Self {
        Self {
            format,
            dimension,
            axis,
        }
    }

    pub fn file_name(&self, slug: &DescriptionSlug) -> String {
        format!(
            "{slug}-{dimension}{unit}.{ext}",
            dimension = self.dimension,
            unit = self.axis.unit(),
            ext = self.format.extension()
        )
    }
}

pub const IMAGE_LADDER: [OutputSpec; 6] = [
    OutputSpec::new(ContainerFormat::Jpeg, 1920, Axis::Width),
    OutputSpec::new(ContainerFormat::Webp, 1920, Axis::Width),
    OutputSpec::new(ContainerFormat::Jpeg, 1280, Axis::Width),
    OutputSpec::new(ContainerFormat::Webp, 1280, Axis::Width),
    OutputSpec::new(ContainerFormat::Jpeg, 640, Axis::Width),
    OutputSpec::new(ContainerFormat::Webp, 640, Axis::Width),
];

pub const VIDEO_LADDER: [OutputSpec; 4] = [
    OutputSpec::new(ContainerFormat::Mp4, 1080, Axis::Height),
    OutputSpec::new(ContainerFormat::Webm, 1080, Axis::Height),
    OutputSpec::new(ContainerFormat::Mp4, 720, Axis::Height),
    OutputSpec::new(ContainerFormat::Webm, 720, Axis::Height),
];

pub fn ladder_for(kind: MediaKind) -> Option<&'static [OutputSpec]> {
    match kind {
        MediaKind::Image => Some(&IMAGE_LADDER),
        MediaKind::Video => Some(&VIDEO_LADDER),
        MediaKind::Unsupported => None,
    }
}

pub fn ladder_version(kind: MediaKind) -> Option<u32> {
    match kind {
        MediaKind::Image => Some(IMAGE_LADDER_VERSION),
        MediaKind::Video => Some(VIDEO_LADDER_VERSION),
        MediaKind::Unsupported => None,
    }
}

pub fn kind_dir(kind: MediaKind) -> Option<&'static str> {
    match kind {
        MediaKind::Image => Some(IMAGE_DIR),
        MediaKind::Video => Some(VIDEO_DIR),
        MediaKind::Unsupported => None,
    }
}

/// Final artifact paths for one input, in ladder order.
pub fn planned_artifacts(output_dir: &Path, kind: MediaKind, slug: &DescriptionSlug) -> Vec<PathBuf> {
    match (ladder_for(kind), kind_dir(kind)) {
        (Some(ladder), Some(dir)) => ladder
            .iter()
            .map(|spec| output_dir.join(dir).join(spec.file_name(slug)))
            .collect(),
        _ => Vec::new(),
    }
}
