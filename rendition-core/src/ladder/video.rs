use std::ffi::OsString;
use std::path::Path;

use serde::Deserialize;

use crate::config::VideoSection;

use super::spec::{ContainerFormat, OutputSpec};

#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

pub fn stream_info_args(source: &Path) -> Vec<OsString> {
    vec![
        "-v".into(),
        "error".into(),
        "-select_streams".into(),
        "v:0".into(),
        "-show_entries".into(),
        "stream=width,height".into(),
        "-of".into(),
        "json".into(),
        source.as_os_str().to_os_string(),
    ]
}

/// First video stream's `(width, height)` from ffprobe's JSON.
pub fn parse_stream_info(stdout: &[u8]) -> Result<(u32, u32), String> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout).map_err(|err| err.to_string())?;
    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| "no video stream".to_string())?;
    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok((width, height)),
        _ => Err("video stream has no dimensions".to_string()),
    }
}

/// Height is capped at the rung and at the source height, rounded down to an
/// even number for the encoders; width follows the aspect ratio.
fn scale_filter(height: u32) -> String {
    format!("scale=-2:trunc(min({height}\\,ih)/2)*2")
}

pub fn transcode_args(
    source: &Path,
    spec: &OutputSpec,
    settings: &VideoSection,
    preserve_metadata: bool,
    destination: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        source.as_os_str().to_os_string(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "0:a:0?".into(),
        "-map_metadata".into(),
        if preserve_metadata { "0" } else { "-1" }.into(),
        "-vf".into(),
        scale_filter(spec.dimension).into(),
    ];
    match spec.format {
        ContainerFormat::Webm => args.extend([
            "-c:v".into(),
            "libvpx-vp9".into(),
            "-crf".into(),
            settings.vp9_crf.to_string().into(),
            "-b:v".into(),
            "0".into(),
            "-row-mt".into(),
            "1".into(),
            "-c:a".into(),
            "libopus".into(),
            "-b:a".into(),
            settings.opus_bitrate.clone().into(),
        ]),
        _ => args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            settings.h264_preset.clone().into(),
            "-crf".into(),
            settings.h264_crf.to_string().into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            settings.aac_bitrate.clone().into(),
            "-movflags".into(),
            "+faststart".into(),
        ]),
    }
    args.push(destination.as_os_str().to_os_string());
    args
}
