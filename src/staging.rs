//! Stage-then-rename writer.
//!
//! Compressed bytes always land in a private temp file first. The source
//! path is only ever touched by the final rename, so a failed or cancelled
//! run leaves the original byte-identical.

use crate::cancel::CancelToken;
use crate::error::{Result, SqueezeError};
use crate::processing::{ImageTask, Outcome, OutcomeStatus};
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile, PersistError};

/// A temp file owned by one pipeline run. Removed on drop unless committed.
#[derive(Debug)]
pub struct StagingSlot {
    temp_path: PathBuf,
    file: Option<NamedTempFile>,
    committed: bool,
}

impl StagingSlot {
    /// Creates `.<basename>.<random>.tmp` inside `scratch_dir`. The random
    /// part keeps concurrent tasks with the same basename apart.
    pub fn create(scratch_dir: &Path, basename: &OsStr) -> Result<Self> {
        let file = staged_tempfile(scratch_dir, basename)?;
        Ok(Self {
            temp_path: file.path().to_path_buf(),
            file: Some(file),
            committed: false,
        })
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    fn file_mut(&mut self) -> Result<&mut NamedTempFile> {
        self.file.as_mut().ok_or_else(|| {
            SqueezeError::Io(io::Error::new(
                io::ErrorKind::Other,
                "staging slot already committed",
            ))
        })
    }

    pub fn fill(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self.file_mut()?.as_file_mut();
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    }

    /// Atomically renames the staged file onto `target`, carrying
    /// `permissions` over so the result keeps the source's access bits.
    ///
    /// A rename across filesystems is retried by staging `bytes` again in
    /// the target's own directory, which keeps the final step a rename.
    pub fn commit(&mut self, target: &Path, bytes: &[u8], permissions: &fs::Permissions) -> Result<PathBuf> {
        let commit_err = |source: io::Error| SqueezeError::Commit {
            target: target.to_path_buf(),
            source,
        };
        let file = self.file.take().ok_or_else(|| {
            commit_err(io::Error::new(io::ErrorKind::Other, "staging slot already committed"))
        })?;
        file.as_file()
            .set_permissions(permissions.clone())
            .map_err(commit_err)?;

        match file.persist(target) {
            Ok(_) => {}
            Err(PersistError { error, file }) if error.kind() == io::ErrorKind::CrossesDevices => {
                drop(file);
                tracing::debug!(target = %target.display(), "scratch dir on another device, restaging next to target");
                let dir = target.parent().unwrap_or_else(|| Path::new("."));
                let basename = target.file_name().unwrap_or_else(|| OsStr::new("image"));
                let mut sibling = staged_tempfile(dir, basename).map_err(commit_err)?;
                sibling.write_all(bytes).map_err(commit_err)?;
                sibling.as_file().sync_all().map_err(commit_err)?;
                sibling
                    .as_file()
                    .set_permissions(permissions.clone())
                    .map_err(commit_err)?;
                sibling.persist(target).map_err(|e| commit_err(e.error))?;
            }
            // The temp file inside the error is dropped here, which removes it.
            Err(PersistError { error, .. }) => return Err(commit_err(error)),
        }

        self.committed = true;
        Ok(target.to_path_buf())
    }
}

fn staged_tempfile(dir: &Path, basename: &OsStr) -> io::Result<NamedTempFile> {
    let prefix = format!(".{}.", basename.to_string_lossy());
    Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .rand_bytes(8)
        .tempfile_in(dir)
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub final_path: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
}

#[derive(Debug, Clone)]
pub struct StagedWriter {
    scratch_dir: PathBuf,
}

impl StagedWriter {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Stages the output of `compress_fn` and commits it.
    pub fn run<F>(&self, task: &ImageTask, compress_fn: F) -> Outcome
    where
        F: FnOnce(&Path) -> Result<(Vec<u8>, &'static str)>,
    {
        self.run_cancellable(task, &CancelToken::new(), compress_fn)
    }

    /// Like [`StagedWriter::run`], checking `cancel` between compressing
    /// and committing.
    pub fn run_cancellable<F>(&self, task: &ImageTask, cancel: &CancelToken, compress_fn: F) -> Outcome
    where
        F: FnOnce(&Path) -> Result<(Vec<u8>, &'static str)>,
    {
        match self.stage_and_commit(task, cancel, compress_fn) {
            Ok((committed, backend)) => Outcome {
                path: task.source_path.clone(),
                status: OutcomeStatus::Success {
                    final_path: committed.final_path,
                    original_size: committed.original_size,
                    compressed_size: committed.compressed_size,
                    backend,
                },
            },
            Err(err) => Outcome::failure(&task.source_path, &err),
        }
    }

    fn stage_and_commit<F>(
        &self,
        task: &ImageTask,
        cancel: &CancelToken,
        compress_fn: F,
    ) -> Result<(Committed, &'static str)>
    where
        F: FnOnce(&Path) -> Result<(Vec<u8>, &'static str)>,
    {
        let basename = task
            .file_name()
            .ok_or_else(|| SqueezeError::InvalidFileName(task.source_path.clone()))?;
        let source_meta = fs::metadata(&task.source_path)?;
        let original_size = source_meta.len();

        let mut slot = StagingSlot::create(&self.scratch_dir, basename)?;
        tracing::debug!(source = %task.source_path.display(), temp = %slot.temp_path().display(), "staging");

        let (bytes, backend) = compress_fn(&task.source_path)?;
        slot.fill(&bytes)?;

        if cancel.is_cancelled() {
            return Err(SqueezeError::Cancelled);
        }

        let target = task.commit_target()?;
        if let Some(dir) = target.parent() {
            // Concurrent tasks race to create the same directory; an
            // existing directory counts as success.
            fs::create_dir_all(dir).map_err(|_| SqueezeError::DirectoryCreationFailed(dir.to_path_buf()))?;
        }

        let final_path = slot.commit(&target, &bytes, &source_meta.permissions())?;
        debug_assert!(slot.is_committed());
        Ok((
            Committed {
                final_path,
                original_size,
                compressed_size: bytes.len() as u64,
            },
            backend,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::OutputMode;
    use std::fs::File;
    use tempfile::TempDir;

    fn scratch_entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    fn source(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(content).unwrap();
        path
    }

    #[test]
    fn test_slot_names_are_unique() {
        let scratch = TempDir::new().unwrap();
        let a = StagingSlot::create(scratch.path(), OsStr::new("a.png")).unwrap();
        let b = StagingSlot::create(scratch.path(), OsStr::new("a.png")).unwrap();

        assert_ne!(a.temp_path(), b.temp_path());
        let name = a.temp_path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".a.png."));
        assert!(name.ends_with(".tmp"));
        assert!(!a.is_committed());
    }

    #[test]
    fn test_slot_removed_on_drop() {
        let scratch = TempDir::new().unwrap();
        let path = {
            let mut slot = StagingSlot::create(scratch.path(), OsStr::new("x.jpg")).unwrap();
            slot.fill(b"partial").unwrap();
            slot.temp_path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[test]
    fn test_replace_mode_commits_over_source() {
        let work = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let src = source(work.path(), "a.png", b"original bytes");

        let writer = StagedWriter::new(scratch.path());
        let task = ImageTask::new(src.clone(), OutputMode::Replace);
        let outcome = writer.run(&task, |_| Ok((b"new".to_vec(), "test")));

        assert_eq!(
            outcome.status,
            OutcomeStatus::Success {
                final_path: src.clone(),
                original_size: 14,
                compressed_size: 3,
                backend: "test",
            }
        );
        assert_eq!(fs::read(&src).unwrap(), b"new");
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[test]
    fn test_output_dir_mode_leaves_source() {
        let work = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let src = source(work.path(), "a.png", b"original bytes");
        let out = work.path().join("nested").join("out");

        let writer = StagedWriter::new(scratch.path());
        let task = ImageTask::new(src.clone(), OutputMode::WriteToDir(out.clone()));
        let outcome = writer.run(&task, |_| Ok((b"new".to_vec(), "test")));

        assert!(outcome.is_success());
        assert_eq!(fs::read(out.join("a.png")).unwrap(), b"new");
        assert_eq!(fs::read(&src).unwrap(), b"original bytes");
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[test]
    fn test_failed_compression_leaves_original_untouched() {
        let work = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let src = source(work.path(), "a.jpg", b"original bytes");
        let mtime_before = fs::metadata(&src).unwrap().modified().unwrap();

        let writer = StagedWriter::new(scratch.path());
        let task = ImageTask::new(src.clone(), OutputMode::Replace);
        let outcome = writer.run(&task, |_| Err(SqueezeError::CodecPanicked));

        assert!(matches!(outcome.status, OutcomeStatus::Failure { .. }));
        assert_eq!(fs::read(&src).unwrap(), b"original bytes");
        assert_eq!(fs::metadata(&src).unwrap().modified().unwrap(), mtime_before);
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[test]
    fn test_cancelled_before_commit() {
        let work = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let src = source(work.path(), "a.jpg", b"original");

        let cancel = CancelToken::new();
        let writer = StagedWriter::new(scratch.path());
        let task = ImageTask::new(src.clone(), OutputMode::Replace);
        let outcome = writer.run_cancellable(&task, &cancel, |_| {
            cancel.cancel();
            Ok((b"new".to_vec(), "test"))
        });

        assert_eq!(
            outcome.status,
            OutcomeStatus::Failure {
                reason: "Cancelled".to_string()
            }
        );
        assert_eq!(fs::read(&src).unwrap(), b"original");
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[test]
    fn test_commit_failure_cleans_up() {
        let work = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let src = source(work.path(), "a.png", b"original");
        // A directory sitting where the output file should go makes the
        // rename fail.
        let out = work.path().join("out");
        fs::create_dir_all(out.join("a.png").join("occupied")).unwrap();

        let writer = StagedWriter::new(scratch.path());
        let task = ImageTask::new(src.clone(), OutputMode::WriteToDir(out));
        let outcome = writer.run(&task, |_| Ok((b"new".to_vec(), "test")));

        assert!(!outcome.is_success());
        assert_eq!(fs::read(&src).unwrap(), b"original");
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_commit_keeps_source_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let work = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let writer = StagedWriter::new(scratch.path());
        let mode = |path: &Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;

        for source_mode in [0o644, 0o640, 0o444] {
            let src = source(work.path(), &format!("{:o}.png", source_mode), b"original");
            fs::set_permissions(&src, fs::Permissions::from_mode(source_mode)).unwrap();

            let out = work.path().join("out");
            let task = ImageTask::new(src.clone(), OutputMode::WriteToDir(out.clone()));
            assert!(writer.run(&task, |_| Ok((b"new".to_vec(), "test"))).is_success());
            assert_eq!(mode(&out.join(src.file_name().unwrap())), source_mode);

            let task = ImageTask::new(src.clone(), OutputMode::Replace);
            assert!(writer.run(&task, |_| Ok((b"new".to_vec(), "test"))).is_success());
            assert_eq!(fs::read(&src).unwrap(), b"new");
            assert_eq!(mode(&src), source_mode);
        }
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_commit_across_devices_restages_next_to_target() {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let shm = Path::new("/dev/shm");
        if !shm.is_dir() {
            return;
        }
        let scratch = TempDir::new_in(shm).unwrap();
        let work = TempDir::new_in(env!("CARGO_MANIFEST_DIR")).unwrap();
        let device = |path: &Path| fs::metadata(path).unwrap().dev();
        if device(scratch.path()) == device(work.path()) {
            return;
        }

        let src = source(work.path(), "a.png", b"original bytes");
        fs::set_permissions(&src, fs::Permissions::from_mode(0o644)).unwrap();
        let writer = StagedWriter::new(scratch.path());
        let task = ImageTask::new(src.clone(), OutputMode::Replace);
        let outcome = writer.run(&task, |_| Ok((b"new".to_vec(), "test")));

        assert!(outcome.is_success(), "{:?}", outcome.status);
        assert_eq!(fs::read(&src).unwrap(), b"new");
        assert_eq!(fs::metadata(&src).unwrap().permissions().mode() & 0o777, 0o644);
        assert_eq!(scratch_entries(scratch.path()), 0);

        let names: Vec<_> = fs::read_dir(work.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png".to_string()]);
    }

    #[test]
    fn test_missing_source_is_failure() {
        let scratch = TempDir::new().unwrap();
        let writer = StagedWriter::new(scratch.path());
        let task = ImageTask::new(scratch.path().join("gone.png"), OutputMode::Replace);
        let outcome = writer.run(&task, |_| Ok((Vec::new(), "test")));
        assert!(!outcome.is_success());
        assert_eq!(scratch_entries(scratch.path()), 0);
    }
}
