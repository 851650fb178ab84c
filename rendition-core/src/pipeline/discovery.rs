use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use super::{PipelineError, PipelineResult};

/// Regular files under `input_dir`, sorted by path. Hidden entries and any
/// directory inside one listed in `excluded` are not descended into.
/// Exclusions are compared after canonicalization, so `./in/out`,
/// `in/../in/out` and an absolute spelling all name the same directory.
/// Returned paths keep the spelling of `input_dir`.
pub fn discover_inputs(input_dir: &Path, excluded: &[PathBuf]) -> PipelineResult<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        return Err(PipelineError::Io {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "input directory missing"),
            path: input_dir.to_path_buf(),
        });
    }
    let root = std::fs::canonicalize(input_dir).map_err(|source| PipelineError::Io {
        source,
        path: input_dir.to_path_buf(),
    })?;
    // Exclusions that do not exist yet cannot contain anything.
    let excluded: Vec<PathBuf> = excluded
        .iter()
        .filter_map(|dir| std::fs::canonicalize(dir).ok())
        .collect();
    let walker = WalkDir::new(input_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !skipped(entry, input_dir, &root, &excluded));

    let mut inputs = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|source| PipelineError::Discovery {
            path: input_dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            inputs.push(entry.into_path());
        }
    }
    inputs.sort();
    Ok(inputs)
}

fn skipped(entry: &DirEntry, input_dir: &Path, root: &Path, excluded: &[PathBuf]) -> bool {
    let hidden = entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false);
    if hidden {
        return true;
    }
    let Ok(relative) = entry.path().strip_prefix(input_dir) else {
        return false;
    };
    let resolved = root.join(relative);
    excluded.iter().any(|dir| resolved.starts_with(dir))
}
