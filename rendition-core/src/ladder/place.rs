use std::path::Path;

use tempfile::{Builder, TempPath};

use super::{LadderError, LadderResult};

/// A tool's output file, staged beside its destination and only renamed into
/// place once it is known to be complete. Dropping it removes the staged file.
pub struct StagedOutput {
    temp: TempPath,
}

impl StagedOutput {
    pub fn new(dir: &Path, extension: &str) -> LadderResult<Self> {
        // The tools pick their muxer from the extension, so keep it.
        let temp = Builder::new()
            .prefix(".staging-")
            .suffix(&format!(".{extension}"))
            .tempfile_in(dir)
            .map_err(|source| LadderError::Io {
                source,
                path: dir.to_path_buf(),
            })?
            .into_temp_path();
        Ok(Self { temp })
    }

    pub fn path(&self) -> &Path {
        &self.temp
    }

    pub fn commit(self, destination: &Path) -> LadderResult<()> {
        let len = std::fs::metadata(&self.temp)
            .map(|meta| meta.len())
            .unwrap_or(0);
        if len == 0 {
            return Err(LadderError::EmptyOutput {
                path: destination.to_path_buf(),
            });
        }
        self.temp
            .persist(destination)
            .map_err(|err| LadderError::Io {
                source: err.error,
                path: destination.to_path_buf(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn commit_moves_complete_output() {
        let dir = TempDir::new().unwrap();
        let staged = StagedOutput::new(dir.path(), "jpg").unwrap();
        assert!(staged.path().to_string_lossy().ends_with(".jpg"));
        std::fs::write(staged.path(), b"pixels").unwrap();
        let destination = dir.path().join("final-640w.jpg");
        staged.commit(&destination).unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"pixels");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn empty_output_is_rejected_and_cleaned() {
        let dir = TempDir::new().unwrap();
        let staged = StagedOutput::new(dir.path(), "webp").unwrap();
        let destination = dir.path().join("final-640w.webp");
        let err = staged.commit(&destination).unwrap_err();
        assert!(matches!(err, LadderError::EmptyOutput { .. }));
        assert!(!destination.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
