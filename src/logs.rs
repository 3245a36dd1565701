use std::path::{Path, PathBuf};

use tracing::info;

/// Blob-like sink for completed-job log artifacts, addressed by job id
/// (spec §3 "Log artifact", §6.4). One file per completed job at
/// `<dir>/job-<id>.log`, written once on transition to `Complete` and
/// readable thereafter even if the job is deleted.
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
}

impl LogStore {
    pub fn new(dir: PathBuf) -> Self {
        LogStore { dir }
    }

    /// Ensures the log directory exists, matching the original's startup
    /// check: create it if missing, error out if a non-directory file of
    /// the same name is already there.
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        if self.dir.exists() {
            if !self.dir.is_dir() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("{} exists but is not a directory", self.dir.display()),
                ));
            }
        } else {
            std::fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn path_for(&self, job_id: u64) -> PathBuf {
        self.dir.join(format!("job-{job_id}.log"))
    }

    pub async fn write(&self, job_id: u64, content: &str) -> std::io::Result<()> {
        let path = self.path_for(job_id);
        tokio::fs::write(&path, content).await?;
        info!(job = job_id, path = %path.display(), "wrote log for job");
        Ok(())
    }

    pub async fn read(&self, job_id: u64) -> Option<String> {
        tokio::fs::read_to_string(self.path_for(job_id)).await.ok()
    }

    pub fn exists_sync(&self, job_id: u64) -> bool {
        Path::new(&self.path_for(job_id)).exists()
    }
}
