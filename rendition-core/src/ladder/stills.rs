use std::ffi::OsString;
use std::path::Path;

use crate::config::ImageSection;

use super::spec::{ContainerFormat, OutputSpec};

/// ImageMagick arguments for one image rung. The `>` geometry flag only ever
/// shrinks, so sources narrower than the rung keep their width. Profiles and
/// comments are dropped only when metadata is not preserved.
pub fn resize_args(
    source: &Path,
    spec: &OutputSpec,
    settings: &ImageSection,
    preserve_metadata: bool,
    destination: &Path,
) -> Vec<OsString> {
    let quality = match spec.format {
        ContainerFormat::Webp => settings.webp_quality,
        _ => settings.jpeg_quality,
    };
    let mut args: Vec<OsString> = vec![
        // First frame only for animated inputs.
        source_with_frame(source),
        "-auto-orient".into(),
    ];
    if !preserve_metadata {
        args.push("-strip".into());
    }
    args.extend([
        "-resize".into(),
        format!("{}x>", spec.dimension).into(),
        "-quality".into(),
        quality.to_string().into(),
        destination.as_os_str().to_os_string(),
    ]);
    args
}

fn source_with_frame(source: &Path) -> OsString {
    let mut arg = source.as_os_str().to_os_string();
    arg.push("[0]");
    arg
}

/// Source dimensions when the `image` crate can read the header; unknown
/// formats are left to ImageMagick.
pub fn read_dimensions(source: &Path) -> Option<(u32, u32)> {
    image::image_dimensions(source).ok()
}
