//! Log retrieval from local files

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use async_trait::async_trait;
use hostmon_lib::monitor::{LogFile, MAX_EXCERPT_FILES};
use hostmon_lib::{HostContext, LogExcerpt, LogSource};
use tracing::{debug, warn};

/// Reads each host's configured log files from the local filesystem
pub struct FileLogSource {
    paths: HashMap<String, Vec<PathBuf>>,
}

impl FileLogSource {
    pub fn new(paths: HashMap<String, Vec<PathBuf>>) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl LogSource for FileLogSource {
    async fn fetch(&self, host: &HostContext) -> Result<LogExcerpt> {
        let Some(paths) = self.paths.get(&host.host_id) else {
            bail!("no log files configured for host '{}'", host.host_id);
        };
        if paths.is_empty() {
            bail!("no log files configured for host '{}'", host.host_id);
        }

        let mut files = Vec::new();
        for path in paths {
            if files.len() == MAX_EXCERPT_FILES {
                break;
            }
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    debug!(host_id = %host.host_id, path = %path.display(), bytes = bytes.len(), "Read log file");
                    files.push(LogFile::new(
                        path.display().to_string(),
                        String::from_utf8_lossy(&bytes),
                    ));
                }
                Err(e) => {
                    warn!(host_id = %host.host_id, path = %path.display(), error = %e, "Log file not accessible");
                }
            }
        }

        if files.is_empty() {
            bail!(
                "none of the {} log files for host '{}' could be read",
                paths.len(),
                host.host_id
            );
        }

        Ok(LogExcerpt::from_files(files))
    }
}
