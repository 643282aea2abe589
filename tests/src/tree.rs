//! Temporary source trees with controlled modification times

use hotweave_kernel::{EngineConfig, EngineKind, ReloadConfig};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const CLOCK_START_SECS: u64 = 1_000_000;
const CLOCK_STEP_SECS: u64 = 10;

/// A temporary directory holding a source root, an output root and any
/// library directories a test needs.
///
/// Every write stamps the file with the next tick of a private clock, so a
/// rewrite is always seen as newer regardless of filesystem timestamp
/// granularity.
pub struct SourceTree {
    dir: TempDir,
    clock: AtomicU64,
}

impl SourceTree {
    pub fn new() -> io::Result<Self> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join("src"))?;
        Ok(Self {
            dir,
            clock: AtomicU64::new(CLOCK_START_SECS),
        })
    }

    /// Source root artifacts are discovered under
    pub fn root(&self) -> PathBuf {
        self.dir.path().join("src")
    }

    pub fn output_root(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// A directory outside the source root, for classpath libraries
    pub fn lib_dir(&self, name: &str) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root().join(relative)
    }

    /// Write a source file and stamp it with the next clock tick
    pub fn write(&self, relative: impl AsRef<Path>, content: &str) -> io::Result<PathBuf> {
        let path = self.path(relative);
        write_file(&path, content)?;
        self.stamp(&path)?;
        Ok(path)
    }

    /// Advance the modification time without changing content
    pub fn touch(&self, relative: impl AsRef<Path>) -> io::Result<()> {
        self.stamp(&self.path(relative))
    }

    /// Pin a file's modification time
    pub fn set_modified(&self, relative: impl AsRef<Path>, time: SystemTime) -> io::Result<()> {
        File::options()
            .write(true)
            .open(self.path(relative))?
            .set_modified(time)
    }

    pub fn remove(&self, relative: impl AsRef<Path>) -> io::Result<()> {
        fs::remove_file(self.path(relative))
    }

    /// Configuration with a single enabled engine rooted at this tree
    pub fn config(&self, kind: EngineKind) -> ReloadConfig {
        ReloadConfig::default()
            .with_poll_interval(Duration::from_millis(25))
            .with_output_root(self.output_root())
            .with_engines(vec![EngineConfig::new(kind).with_source_root(self.root())])
    }

    fn stamp(&self, path: &Path) -> io::Result<()> {
        let secs = self.clock.fetch_add(CLOCK_STEP_SECS, Ordering::SeqCst) + CLOCK_STEP_SECS;
        File::options()
            .write(true)
            .open(path)?
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }
}

/// Write a file outside the source root, creating parent directories
pub fn write_file(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_always_look_newer() {
        let tree = SourceTree::new().unwrap();
        let path = tree.write("a/Foo.rhai", "fn f() { 1 }").unwrap();
        let first = fs::metadata(&path).unwrap().modified().unwrap();

        tree.write("a/Foo.rhai", "fn f() { 2 }").unwrap();
        let second = fs::metadata(&path).unwrap().modified().unwrap();
        assert!(second > first);

        tree.touch("a/Foo.rhai").unwrap();
        assert!(fs::metadata(&path).unwrap().modified().unwrap() > second);
    }

    #[test]
    fn test_config_roots_at_tree() {
        let tree = SourceTree::new().unwrap();
        let config = tree.config(EngineKind::Script);
        assert_eq!(config.engine(EngineKind::Script).unwrap().source_roots, vec![tree.root()]);
        assert!(!config.is_enabled(EngineKind::Native));
        assert!(config.validate().is_ok());
    }
}
