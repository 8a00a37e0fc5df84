//! Worker spawning.
//!
//! A worker measures one target and eventually posts at most one result
//! message. Spawning is fire-and-forget: the coordinator never learns whether
//! a worker actually started.

pub mod measure;

use crate::coordinator::channel::MessageSender;
use crate::models::{SpawnRequest, WorkerMessage};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

pub use measure::run_worker;

/// Creates isolated workers.
pub trait WorkerSpawner: Send + Sync {
    /// Start one worker for `request`, reporting through `sender`.
    fn spawn(&self, request: SpawnRequest, sender: MessageSender);
}

/// Build the HTTP client workers measure with.
pub fn http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .context("Failed to create HTTP client")
}

/// Runs each worker as an independent tokio task.
#[derive(Debug, Clone)]
pub struct TaskSpawner {
    client: reqwest::Client,
}

impl TaskSpawner {
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_seconds)?,
        })
    }
}

impl WorkerSpawner for TaskSpawner {
    fn spawn(&self, request: SpawnRequest, sender: MessageSender) {
        debug!("Spawning task worker: {}", request);
        let client = self.client.clone();

        tokio::spawn(async move {
            let msg = run_worker(&client, &request).await;
            sender.send(msg);
        });
    }
}

/// Runs each worker as a child process.
///
/// The child receives the worker address as command-line arguments and
/// prints its result as one JSON line on stdout.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    base_args: Vec<String>,
}

impl ProcessSpawner {
    pub fn new(program: PathBuf, base_args: Vec<String>) -> Self {
        Self { program, base_args }
    }

    /// Spawner that re-invokes the running executable in worker mode.
    pub fn current_exe(timeout_seconds: u64) -> Result<Self> {
        let program = std::env::current_exe().context("Failed to locate current executable")?;
        Ok(Self::new(
            program,
            vec![
                "--quiet".to_string(),
                "--request-timeout".to_string(),
                timeout_seconds.to_string(),
            ],
        ))
    }
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn(&self, request: SpawnRequest, sender: MessageSender) {
        debug!("Spawning process worker: {}", request);

        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .args(request.worker_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn worker for {}: {}", request.site, e);
                return;
            }
        };

        let Some(stdout) = child.stdout.take() else {
            return;
        };

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match WorkerMessage::decode(&line) {
                    Some(msg) => sender.send(msg),
                    None => debug!("Ignoring non-message worker output: {}", line),
                }
            }
            let _ = child.wait().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::channel::MessageChannel;
    use crate::models::RunId;

    fn request(site: &str, index: usize) -> SpawnRequest {
        SpawnRequest {
            site: site.to_string(),
            run_id: RunId(11),
            index,
        }
    }

    #[tokio::test]
    async fn test_task_spawner_posts_one_result() {
        let url = measure::tests::serve("<html></html>").await;
        let mut channel = MessageChannel::new();
        let mut rx = channel.subscribe().unwrap();

        let spawner = TaskSpawner::new(5).unwrap();
        spawner.spawn(request(&url, 0), channel.sender());

        match rx.recv().await {
            Some(WorkerMessage::BenchmarkResult(m)) => {
                assert_eq!(m.run_id, RunId(11));
                assert_eq!(m.site, url);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_spawner_forwards_stdout_line() {
        // Positional args after the script name: $2 site, $4 run id, $6 index.
        let script = r#"echo "starting"; printf '{"type":"benchmarkResult","runId":%s,"index":%s,"site":"%s","loadTime":1,"cpuTime":2,"networkLatency":3,"memoryUsage":4}\n' "$4" "$6" "$2""#;
        let spawner = ProcessSpawner::new(
            PathBuf::from("sh"),
            vec!["-c".to_string(), script.to_string(), "sh".to_string()],
        );

        let mut channel = MessageChannel::new();
        let mut rx = channel.subscribe().unwrap();
        spawner.spawn(request("https://a.test", 4), channel.sender());

        match rx.recv().await {
            Some(WorkerMessage::BenchmarkResult(m)) => {
                assert_eq!(m.run_id, RunId(11));
                assert_eq!(m.index, 4);
                assert_eq!(m.site, "https://a.test");
                assert_eq!(m.memory_usage, 4.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_process_spawn_failure_is_silent() {
        let spawner = ProcessSpawner::new(PathBuf::from("/nonexistent/sitebench-worker"), vec![]);
        let mut channel = MessageChannel::new();
        let mut rx = channel.subscribe().unwrap();

        spawner.spawn(request("https://a.test", 0), channel.sender());
        drop(channel);

        assert!(rx.recv().await.is_none());
    }
}
