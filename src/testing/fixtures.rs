//! Test fixtures for creating reproducible test environments.
//!
//! Provides temporary project directories, optionally backed by a real git
//! repository with an initial commit and a bare upstream remote.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use crate::prompt::templates::{DEFAULT_AUDITOR_TEMPLATE, DEFAULT_CODER_TEMPLATE};

/// A test fixture representing a temporary project directory.
///
/// Automatically cleans up when dropped.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::with_git_repo();
/// fixture.write_file("a.py", "x = 1\n");
/// fixture.commit_all("add a");
/// // Directory is cleaned up when fixture goes out of scope
/// ```
pub struct TestFixture {
    temp_dir: TempDir,
    upstream: Option<TempDir>,
}

impl TestFixture {
    /// Create an empty project directory.
    ///
    /// # Panics
    ///
    /// Panics if temporary directory creation fails.
    #[must_use]
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            upstream: None,
        }
    }

    /// Create a project with a git repository on branch `main` and one
    /// commit containing `README.md`.
    ///
    /// # Panics
    ///
    /// Panics if git initialization fails.
    #[must_use]
    pub fn with_git_repo() -> Self {
        let fixture = Self::new();
        fixture.git(&["init", "-q"]);
        fixture.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        fixture.git(&["config", "user.email", "test@example.com"]);
        fixture.git(&["config", "user.name", "Test User"]);
        fixture.git(&["config", "commit.gpgsign", "false"]);

        fixture.write_file("README.md", "# Test project\n");
        fixture.commit_all("Initial commit");
        fixture
    }

    /// Add a bare repository as `origin` and push `main` to it with
    /// upstream tracking.
    ///
    /// # Panics
    ///
    /// Panics if the remote cannot be created or pushed to.
    #[must_use]
    pub fn with_upstream(mut self) -> Self {
        let remote = TempDir::new().expect("Failed to create remote directory");
        let status = Command::new("git")
            .args(["init", "-q", "--bare"])
            .current_dir(remote.path())
            .status()
            .expect("Failed to init bare remote");
        assert!(status.success(), "git init --bare failed");

        let remote_path = remote.path().to_string_lossy().to_string();
        self.git(&["remote", "add", "origin", &remote_path]);
        self.git(&["push", "-q", "-u", "origin", "main"]);
        self.upstream = Some(remote);
        self
    }

    /// Write the default coder and auditor templates under `prompts/`.
    #[must_use]
    pub fn with_prompt_templates(self) -> Self {
        self.write_file("prompts/coder.md", DEFAULT_CODER_TEMPLATE);
        self.write_file("prompts/auditor.md", DEFAULT_AUDITOR_TEMPLATE);
        self
    }

    /// Get the path to the project directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path of a file inside the project.
    #[must_use]
    pub fn file(&self, relative: &str) -> PathBuf {
        self.path().join(relative)
    }

    /// Write a file, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_file(&self, relative: &str, content: &str) {
        let path = self.file(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
    }

    /// Read a file from the project.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be read.
    #[must_use]
    pub fn read_file(&self, relative: &str) -> String {
        std::fs::read_to_string(self.file(relative)).expect("Failed to read file")
    }

    /// Run git in the project directory and return stdout.
    ///
    /// # Panics
    ///
    /// Panics if git cannot be spawned or exits non-zero.
    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    /// Stage everything and commit.
    pub fn commit_all(&self, message: &str) {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "-m", message]);
    }

    /// Number of commits reachable from HEAD.
    #[must_use]
    pub fn commit_count(&self) -> u32 {
        self.git(&["rev-list", "--count", "HEAD"])
            .trim()
            .parse()
            .expect("rev-list did not return a number")
    }

    /// Check out HEAD's commit directly, leaving no branch checked out.
    pub fn detach_head(&self) {
        let head = self.git(&["rev-parse", "HEAD"]);
        self.git(&["checkout", "-q", head.trim()]);
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_repo_fixture() {
        let fixture = TestFixture::with_git_repo();
        assert!(fixture.file(".git").exists());
        assert_eq!(fixture.commit_count(), 1);
        assert_eq!(fixture.git(&["branch", "--show-current"]).trim(), "main");
    }

    #[test]
    fn test_write_file_creates_parents() {
        let fixture = TestFixture::new();
        fixture.write_file("deep/nested/file.txt", "content");
        assert_eq!(fixture.read_file("deep/nested/file.txt"), "content");
    }

    #[test]
    fn test_prompt_templates_written() {
        let fixture = TestFixture::new().with_prompt_templates();
        assert!(fixture.read_file("prompts/coder.md").contains("{{goal}}"));
        assert!(fixture.read_file("prompts/auditor.md").contains("{{diff}}"));
    }
}
