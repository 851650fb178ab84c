use std::ffi::OsString;
use std::path::Path;

/// `exiftool` arguments copying every tag from `source` onto the staged
/// artifact in place.
pub fn carry_args(source: &Path, staged: &Path) -> Vec<OsString> {
    vec![
        "-tagsFromFile".into(),
        source.as_os_str().to_os_string(),
        "-all:all".into(),
        "-overwrite_original".into(),
        "-quiet".into(),
        staged.as_os_str().to_os_string(),
    ]
}
