//! External browser-automation driver.
//!
//! The driver is a separate program (for example a Selenium script) that
//! logs in, solves the CAPTCHA with the supplied API key and scrapes the
//! course pages. The protocol is deliberately small:
//!
//! - stdin: one JSON object with `username`, `password` and
//!   `captcha_api_key`, then EOF;
//! - stderr: human-readable progress, one line at a time;
//! - stdout: the scraped JSON document;
//! - exit status: non-zero on failure, with the last stderr line as cause.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use unistacker_core::submission::ScrapeRequest;

use crate::pipeline::CourseSource;
use crate::sink::LogSink;
use crate::worker::WorkerError;

/// Maximum stdout size accepted from the driver (32 MiB).
const MAX_OUTPUT_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Serialize)]
struct DriverInput<'a> {
    username: &'a str,
    password: &'a str,
    captcha_api_key: &'a str,
}

/// [`CourseSource`] backed by an external driver process.
#[derive(Debug, Clone)]
pub struct DriverSource {
    program: String,
    args: Vec<String>,
}

impl DriverSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl CourseSource for DriverSource {
    async fn fetch(
        &self,
        request: &ScrapeRequest,
        sink: &LogSink,
    ) -> Result<serde_json::Value, WorkerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Killed if the job times out and this future is dropped.
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            WorkerError::Driver(format!("Failed to launch driver `{}`: {e}", self.program))
        })?;
        tracing::info!(task_id = %sink.task_id(), program = %self.program, "Driver started");

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(&DriverInput {
                username: &request.username,
                password: &request.password,
                captcha_api_key: &request.captcha_api_key,
            })?;
            // A driver that exits before reading its input reports through
            // its exit status instead.
            if let Err(e) = stdin.write_all(&payload).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
            drop(stdin);
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let forward = async {
            let mut last_line = None;
            if let Some(stderr) = stderr {
                // Driver diagnostics are not guaranteed to be UTF-8.
                let mut lines = BufReader::new(stderr).split(b'\n');
                while let Some(raw) = lines.next_segment().await? {
                    let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    last_line = Some(line.clone());
                    sink.emit(line).await;
                }
            }
            Ok::<_, std::io::Error>(last_line)
        };

        let collect = async {
            let mut buf = Vec::new();
            if let Some(stdout) = stdout {
                stdout.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };

        let (last_line, output) = tokio::try_join!(forward, collect)?;
        let status = child.wait().await?;

        if !status.success() {
            return Err(WorkerError::Driver(
                last_line.unwrap_or_else(|| format!("Driver exited with {status}")),
            ));
        }

        Ok(serde_json::from_slice(&output)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
