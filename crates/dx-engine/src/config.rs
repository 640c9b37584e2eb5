use dx_types::RetryPolicy;

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Knobs for one processing run. `from_env` layers `DX_*` variables over
/// the defaults so deployments tune without code changes.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Account-group pattern passed to the manager when resolving logins.
    pub group_pattern: String,
    /// Upper bound on concurrently running per-task passes.
    pub worker_limit: usize,
    pub chunk_size: usize,
    pub insert_chunk_size: usize,
    pub commit_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    pub fetch_attempts: usize,
    pub insert_attempts: usize,
    pub delete_batch: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            group_pattern: "*".to_string(),
            worker_limit: 4,
            chunk_size: 200,
            insert_chunk_size: 100,
            commit_timeout_ms: 30_000,
            fetch_timeout_ms: 60_000,
            fetch_attempts: 2,
            insert_attempts: 2,
            delete_batch: 5_000,
        }
    }
}

impl ProcessConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            group_pattern: std::env::var("DX_GROUP_PATTERN").unwrap_or(d.group_pattern),
            worker_limit: env_usize("DX_WORKER_LIMIT", d.worker_limit).max(1),
            chunk_size: env_usize("DX_CHUNK_SIZE", d.chunk_size).max(1),
            insert_chunk_size: env_usize("DX_INSERT_CHUNK_SIZE", d.insert_chunk_size).max(1),
            commit_timeout_ms: env_u64("DX_COMMIT_TIMEOUT_MS", d.commit_timeout_ms),
            fetch_timeout_ms: env_u64("DX_FETCH_TIMEOUT_MS", d.fetch_timeout_ms),
            fetch_attempts: env_usize("DX_FETCH_ATTEMPTS", d.fetch_attempts).max(1),
            insert_attempts: env_usize("DX_INSERT_ATTEMPTS", d.insert_attempts).max(1),
            delete_batch: env_u64("DX_DELETE_BATCH", d.delete_batch).max(1),
        }
    }

    pub fn fetch_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.fetch_attempts, 500, 5_000, 0.2)
    }

    pub fn writer(&self) -> dx_database::deals::WriterConfig {
        dx_database::deals::WriterConfig {
            chunk_size: self.chunk_size,
            insert_chunk_size: self.insert_chunk_size,
            commit_timeout_ms: self.commit_timeout_ms,
            retry: RetryPolicy::new(self.insert_attempts, 500, 2_000, 0.2),
        }
    }
}
