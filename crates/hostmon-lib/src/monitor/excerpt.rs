//! Bounded log excerpts for analysis

use sha2::{Digest, Sha256};

/// Maximum number of log files included in one excerpt
pub const MAX_EXCERPT_FILES: usize = 5;

/// Maximum excerpt size in characters
pub const MAX_EXCERPT_CHARS: usize = 50_000;

const TRUNCATION_SUFFIX: &str = "\n... (truncated)";

/// One log file as retrieved from a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: String,
    pub content: String,
}

impl LogFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Log text handed to the analyzer, bounded in file count and size
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogExcerpt {
    text: String,
    line_count: usize,
    files: usize,
    truncated: bool,
}

impl LogExcerpt {
    /// Build an excerpt from retrieved log files.
    ///
    /// Takes the first [`MAX_EXCERPT_FILES`] files, each under a
    /// `=== <path> ===` header. The file that would push the content past
    /// [`MAX_EXCERPT_CHARS`] is cut and marked, and nothing after it is
    /// included.
    pub fn from_files(files: impl IntoIterator<Item = LogFile>) -> Self {
        let mut excerpt = Self::default();
        let mut used = 0usize;

        for file in files.into_iter().take(MAX_EXCERPT_FILES) {
            let chars = file.content.chars().count();
            excerpt.files += 1;

            if used + chars > MAX_EXCERPT_CHARS {
                let remaining = MAX_EXCERPT_CHARS.saturating_sub(used);
                let cut: String = file.content.chars().take(remaining).collect();
                excerpt.line_count += cut.lines().count();
                excerpt.push_section(&file.path, &cut);
                excerpt.text.push_str(TRUNCATION_SUFFIX);
                excerpt.truncated = true;
                break;
            }

            used += chars;
            excerpt.line_count += file.content.lines().count();
            excerpt.push_section(&file.path, &file.content);
        }

        excerpt
    }

    fn push_section(&mut self, path: &str, content: &str) {
        self.text.push_str("\n\n=== ");
        self.text.push_str(path);
        self.text.push_str(" ===\n");
        self.text.push_str(content);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Log lines included in the excerpt, headers excluded
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn file_count(&self) -> usize {
        self.files
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// SHA-256 of the excerpt text, hex encoded
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        hex::encode(hasher.finalize())
    }
}
