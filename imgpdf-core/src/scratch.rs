//! Per-request scratch space
//!
//! Each conversion gets its own uniquely named directory, so concurrent
//! requests never share a file name. Uploads live at the top of the
//! directory and generated documents under `out/`. Dropping the
//! [`ScratchSpace`] deletes the whole tree, which covers success, error and
//! cancellation alike.

use crate::formats::{extension_of, DEFAULT_EXTENSION};
use crate::request::SourceImage;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use tracing::debug;

const SCRATCH_PREFIX: &str = "imgpdf-";
const OUTPUT_SUBDIR: &str = "out";

/// A request-scoped temporary directory
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
    uploads: usize,
}

impl ScratchSpace {
    /// Create a scratch directory under the system temp dir.
    pub fn new() -> io::Result<Self> {
        Self::new_in(std::env::temp_dir())
    }

    /// Create a scratch directory under `root`, creating `root` if needed.
    pub fn new_in(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let dir = Builder::new().prefix(SCRATCH_PREFIX).tempdir_in(root)?;
        debug!(dir = %dir.path().display(), "Created scratch directory");
        Ok(Self { dir, uploads: 0 })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory that receives generated documents.
    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join(OUTPUT_SUBDIR)
    }

    /// Persist one uploaded file and describe it as a conversion source.
    ///
    /// The stored name is `upload-<n>.<ext>`; the original name is kept
    /// only as the display name. Uploads without an extension are stored
    /// as `.jpg`.
    pub fn store_upload(&mut self, original_name: &str, bytes: &[u8]) -> io::Result<SourceImage> {
        let ext = extension_of(original_name).unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        let path = self
            .dir
            .path()
            .join(format!("upload-{}.{}", self.uploads, ext));
        fs::write(&path, bytes)?;
        self.uploads += 1;

        debug!(
            name = original_name,
            path = %path.display(),
            bytes = bytes.len(),
            "Stored upload"
        );
        Ok(SourceImage::with_name(path, original_name))
    }

    /// Number of uploads stored so far.
    pub fn upload_count(&self) -> usize {
        self.uploads
    }

    /// Delete the directory now, reporting any failure.
    pub fn close(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!(dir = %path.display(), "Removed scratch directory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_scratch_spaces_are_unique() {
        let root = TempDir::new().unwrap();
        let a = ScratchSpace::new_in(root.path()).unwrap();
        let b = ScratchSpace::new_in(root.path()).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));
        assert_eq!(entries(root.path()), 2);
    }

    #[test]
    fn test_store_upload_names() {
        let root = TempDir::new().unwrap();
        let mut scratch = ScratchSpace::new_in(root.path()).unwrap();

        let first = scratch.store_upload("Cat.PNG", b"png-bytes").unwrap();
        let second = scratch.store_upload("noext", b"jpg-bytes").unwrap();

        assert_eq!(first.display_name, "Cat.PNG");
        assert_eq!(first.path.file_name().unwrap(), "upload-0.png");
        assert_eq!(second.path.file_name().unwrap(), "upload-1.jpg");
        assert_eq!(fs::read(&second.path).unwrap(), b"jpg-bytes");
        assert_eq!(scratch.upload_count(), 2);
    }

    #[test]
    fn test_drop_removes_everything() {
        let root = TempDir::new().unwrap();
        {
            let mut scratch = ScratchSpace::new_in(root.path()).unwrap();
            scratch.store_upload("a.png", b"data").unwrap();
            fs::create_dir_all(scratch.output_dir()).unwrap();
            fs::write(scratch.output_dir().join("a.pdf"), b"%PDF").unwrap();
        }
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn test_close_removes_directory() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchSpace::new_in(root.path().join("nested")).unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.exists());
        scratch.close().unwrap();
        assert!(!path.exists());
    }
}
