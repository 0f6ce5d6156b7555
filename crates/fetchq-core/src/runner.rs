//! Process runner: executes one admitted job's external download process,
//! streams its progress output into the registry, and resolves the job on
//! exit. Every exit path releases the job's slot and re-runs admission.

use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::progress::{parse_line, ParsedLine};
use crate::registry::{JobRegistry, RunOutcome, RunPlan};

/// How the supervision loop ended.
enum LoopExit {
    /// stdout closed; the process is exiting on its own.
    Finished,
    /// The job's cancellation token fired.
    Cancelled,
    /// The configured job timeout elapsed.
    TimedOut,
}

/// Run one job to completion. Spawned by the registry on its own task.
pub(crate) async fn run_job(registry: Arc<JobRegistry>, job_id: String) {
    let Some(plan) = registry.begin_run(&job_id) else {
        return;
    };

    let outcome = match supervise(&registry, &job_id, &plan).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(job_id = %job_id, "job runner fault: {:#}", e);
            RunOutcome::Failure
        }
    };
    registry.finish_run(&job_id, outcome);
}

async fn supervise(
    registry: &Arc<JobRegistry>,
    job_id: &str,
    plan: &RunPlan,
) -> anyhow::Result<RunOutcome> {
    let mut child = Command::new(&plan.cmd[0])
        .args(&plan.cmd[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    registry.attach_process(job_id, child.id());
    tracing::info!(job_id, pid = child.id(), "download process spawned");

    // Drain stderr concurrently so a chatty process can't fill the pipe.
    let stderr_task = child.stderr.take().map(|mut err| {
        tokio::spawn(async move {
            let mut buf = String::new();
            let _ = err.read_to_string(&mut buf).await;
            buf
        })
    });

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("child stdout not captured"))?;
    let mut lines = BufReader::new(stdout).lines();

    let deadline = plan.timeout.map(|t| tokio::time::Instant::now() + t);
    let exit = loop {
        tokio::select! {
            _ = plan.cancel.cancelled() => break LoopExit::Cancelled,
            _ = sleep_until_opt(deadline) => break LoopExit::TimedOut,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let ParsedLine::Progress { percent, speed, eta } = parse_line(&line) {
                        registry.apply_progress(job_id, percent, speed, eta);
                    }
                }
                Ok(None) | Err(_) => break LoopExit::Finished,
            },
        }
    };

    match exit {
        LoopExit::Cancelled => {
            terminate(&mut child, plan.grace).await;
            log_stderr_tail(job_id, stderr_task).await;
            // finish_run leaves the Cancelled status in place.
            Ok(RunOutcome::Failure)
        }
        LoopExit::TimedOut => {
            tracing::error!(job_id, "job exceeded its configured timeout");
            terminate(&mut child, plan.grace).await;
            log_stderr_tail(job_id, stderr_task).await;
            Ok(RunOutcome::TimedOut)
        }
        LoopExit::Finished => {
            // stdout is closed but the process may not have exited yet; stay
            // responsive to cancellation while reaping it.
            let status = tokio::select! {
                status = child.wait() => status?,
                _ = plan.cancel.cancelled() => {
                    terminate(&mut child, plan.grace).await;
                    log_stderr_tail(job_id, stderr_task).await;
                    return Ok(RunOutcome::Failure);
                }
            };
            if status.success() {
                tracing::info!(job_id, "download finished");
                // stderr from a successful run is noise; drop it.
                if let Some(task) = stderr_task {
                    task.abort();
                }
                Ok(RunOutcome::Success)
            } else {
                tracing::error!(job_id, code = status.code(), "download process failed");
                log_stderr_tail(job_id, stderr_task).await;
                Ok(RunOutcome::Failure)
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

/// Ask the process to exit: SIGTERM first so the tool can clean up partial
/// files, SIGKILL once the grace period runs out.
async fn terminate(child: &mut Child, grace: std::time::Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }
        tracing::warn!(pid, "SIGTERM ignored, killing");
    }
    #[cfg(not(unix))]
    let _ = grace;
    let _ = child.kill().await;
    let _ = child.wait().await;
}

async fn log_stderr_tail(job_id: &str, task: Option<tokio::task::JoinHandle<String>>) {
    if let Some(task) = task {
        if let Ok(output) = task.await {
            let trimmed = output.trim();
            if !trimmed.is_empty() {
                let tail: String = trimmed.chars().take(1000).collect();
                tracing::error!(job_id, "process stderr: {}", tail);
            }
        }
    }
}
