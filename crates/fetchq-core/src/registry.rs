//! Job registry and scheduler.
//!
//! Owns every job record, the admission queue, and the active set behind one
//! lock. Admission policy is either queue mode (one job at a time, FIFO) or
//! parallel mode (up to `max_parallel` at once). The registry hands admitted
//! jobs to the runner on spawned tasks and is re-invoked on every job exit so
//! throughput is self-sustaining.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::FetchqConfig;
use crate::history::{HistoryEntry, HistoryStore};
use crate::job::{DownloadMode, Job, JobStatus, JobView};
use crate::runner;
use crate::storage::OutputLayout;
use crate::ytdlp;


/// Everything mutable, guarded by the one registry lock. Read-modify-write
/// sequences never release the lock mid-sequence, and the lock is never held
/// across an await.
struct RegistryState {
    jobs: HashMap<String, Job>,
    queue: VecDeque<String>,
    active: HashSet<String>,
    queue_mode: bool,
}

/// Shared supervisor for all download jobs. Use through `Arc`.
pub struct JobRegistry {
    cfg: FetchqConfig,
    layout: OutputLayout,
    history: HistoryStore,
    state: Mutex<RegistryState>,
}

/// What the runner needs to execute one admitted job, snapshotted under the
/// lock so the runner itself never touches registry internals directly.
pub(crate) struct RunPlan {
    pub(crate) cmd: Vec<String>,
    pub(crate) cancel: CancellationToken,
    pub(crate) timeout: Option<Duration>,
    pub(crate) grace: Duration,
}

/// How a run ended, as seen by the runner.
pub(crate) enum RunOutcome {
    /// Process exited zero.
    Success,
    /// Nonzero exit, spawn failure, or runtime fault.
    Failure,
    /// The configured job timeout elapsed.
    TimedOut,
}

impl JobRegistry {
    pub fn new(cfg: FetchqConfig, layout: OutputLayout, history: HistoryStore) -> Self {
        Self {
            cfg,
            layout,
            history,
            state: Mutex::new(RegistryState {
                jobs: HashMap::new(),
                queue: VecDeque::new(),
                active: HashSet::new(),
                queue_mode: false,
            }),
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn config(&self) -> &FetchqConfig {
        &self.cfg
    }

    /// Create a job for `url` and either start it or enqueue it, depending on
    /// the current admission policy and load. Returns the new job id.
    /// Input validation (empty URL, unknown mode) happens before this call.
    pub fn submit(self: &Arc<Self>, url: &str, mode: DownloadMode) -> String {
        let folder = self.layout.dir_for(mode);
        let cmd = ytdlp::download_command(&self.cfg, url, mode, &folder);
        self.submit_prepared(url, mode, folder, cmd)
    }

    /// Test seam: submit with an arbitrary launch command standing in for the
    /// downloader.
    #[cfg(test)]
    pub(crate) fn submit_command(
        self: &Arc<Self>,
        url: &str,
        mode: DownloadMode,
        cmd: Vec<String>,
    ) -> String {
        let folder = self.layout.dir_for(mode);
        self.submit_prepared(url, mode, folder, cmd)
    }

    fn submit_prepared(
        self: &Arc<Self>,
        url: &str,
        mode: DownloadMode,
        folder: PathBuf,
        cmd: Vec<String>,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut start_now = false;
        {
            let mut state = self.state.lock().unwrap();
            let status = if state.queue_mode {
                JobStatus::Queued
            } else {
                JobStatus::Starting
            };
            let mut job = Job::new(id.clone(), url.to_string(), mode, folder, status, cmd);

            if state.queue_mode {
                state.queue.push_back(id.clone());
            } else if state.active.len() < self.cfg.max_parallel {
                state.active.insert(id.clone());
                start_now = true;
            } else {
                job.status = JobStatus::Queued;
                state.queue.push_back(id.clone());
            }
            state.jobs.insert(id.clone(), job);
        }

        tracing::info!(job_id = %id, url, mode = mode.as_str(), "job submitted");
        if start_now {
            self.spawn_runner(id.clone());
        } else {
            self.admit_next();
        }
        id
    }

    /// The sole admission rule. Queue mode: admit the FIFO head only when
    /// nothing is running. Parallel mode: admit while below the ceiling.
    pub fn admit_next(self: &Arc<Self>) {
        let mut admitted = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            loop {
                if state.queue_mode {
                    if !state.active.is_empty() || !admitted.is_empty() {
                        break;
                    }
                } else if state.active.len() + admitted.len() >= self.cfg.max_parallel {
                    break;
                }
                let Some(id) = state.queue.pop_front() else {
                    break;
                };
                // Only Queued jobs live in the queue; anything else was
                // cancelled out from under us and is skipped.
                let admit = matches!(
                    state.jobs.get(&id).map(|j| j.status),
                    Some(JobStatus::Queued)
                );
                if admit {
                    if let Some(job) = state.jobs.get_mut(&id) {
                        job.status = JobStatus::Starting;
                    }
                    admitted.push(id);
                }
            }
            for id in &admitted {
                state.active.insert(id.clone());
            }
        }
        for id in admitted {
            tracing::debug!(job_id = %id, "admitted from queue");
            self.spawn_runner(id);
        }
    }

    fn spawn_runner(self: &Arc<Self>, id: String) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            runner::run_job(registry, id).await;
        });
    }

    /// Cancel a job. Idempotent; unknown ids are acknowledged silently. The
    /// record itself is removed by a cleanup task once the runner has torn
    /// down the process, bounded by the configured grace period.
    pub fn cancel(self: &Arc<Self>, id: &str) {
        let finished;
        {
            let mut state = self.state.lock().unwrap();
            let Some(job) = state.jobs.get_mut(id) else {
                return;
            };
            job.status = JobStatus::Cancelled;
            job.cancel.cancel();
            finished = job.finished.clone();
            let id_owned = id.to_string();
            state.queue.retain(|queued| queued != &id_owned);
            if !state.active.contains(id) {
                // No runner to wait for; release the cleanup task right away.
                finished.cancel();
            }
        }
        tracing::info!(job_id = %id, "job cancelled");

        let registry = Arc::clone(self);
        let id = id.to_string();
        let grace = Duration::from_millis(self.cfg.cancel_grace_ms);
        tokio::spawn(async move {
            tokio::select! {
                _ = finished.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    tracing::warn!(job_id = %id, "cancelled process still up after grace period");
                }
            }
            {
                let mut state = registry.state.lock().unwrap();
                state.jobs.remove(&id);
                state.active.remove(&id);
                state.queue.retain(|queued| queued != &id);
            }
            registry.admit_next();
        });
    }

    /// Read-only view of every job for the polling client.
    pub fn snapshot(&self) -> HashMap<String, JobView> {
        let state = self.state.lock().unwrap();
        state
            .jobs
            .iter()
            .map(|(id, job)| (id.clone(), JobView::from(job)))
            .collect()
    }

    /// Toggle the admission policy. Affects only future admission decisions;
    /// running jobs are untouched.
    pub fn set_queue_mode(&self, enabled: bool) {
        let mut state = self.state.lock().unwrap();
        state.queue_mode = enabled;
        tracing::info!(queue_mode = enabled, "admission mode set");
    }

    pub fn queue_mode(&self) -> bool {
        self.state.lock().unwrap().queue_mode
    }

    /// Output folder of a job, for the open-in-file-browser endpoint.
    pub fn job_folder(&self, id: &str) -> Option<PathBuf> {
        let state = self.state.lock().unwrap();
        state.jobs.get(id).map(|job| job.folder.clone())
    }

    // ---- runner-facing internals -------------------------------------------

    /// Transition an admitted job to Downloading and hand out its run plan.
    /// Returns None if the job vanished or was cancelled before the runner
    /// got here; in that case the slot is released and admission re-runs.
    pub(crate) fn begin_run(self: &Arc<Self>, id: &str) -> Option<RunPlan> {
        let plan = {
            let mut state = self.state.lock().unwrap();
            match state.jobs.get_mut(id) {
                Some(job) if job.status == JobStatus::Starting => {
                    job.status = JobStatus::Downloading;
                    Some(RunPlan {
                        cmd: job.cmd.clone(),
                        cancel: job.cancel.clone(),
                        timeout: self.cfg.job_timeout_secs.map(Duration::from_secs),
                        grace: Duration::from_millis(self.cfg.cancel_grace_ms),
                    })
                }
                Some(job) => {
                    // Cancelled between admission and start.
                    job.pid = None;
                    job.finished.cancel();
                    state.active.remove(id);
                    None
                }
                None => {
                    state.active.remove(id);
                    None
                }
            }
        };
        if plan.is_none() {
            self.admit_next();
        }
        plan
    }

    /// Record the spawned child's pid on the job.
    pub(crate) fn attach_process(&self, id: &str, pid: Option<u32>) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.get_mut(id) {
            job.pid = pid;
        }
    }

    /// Copy one parsed progress record into the job. Percent is sticky:
    /// records without it keep the previous value.
    pub(crate) fn apply_progress(
        &self,
        id: &str,
        percent: Option<f64>,
        speed: Option<f64>,
        eta: Option<u64>,
    ) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.get_mut(id) {
            if let Some(p) = percent {
                job.percent = p;
            }
            job.speed = crate::progress::human_speed(speed);
            job.eta = crate::progress::human_eta(eta);
        }
    }

    /// Resolve a finished run: set the terminal status (unless the job was
    /// cancelled mid-run), record history on success, release the slot, fire
    /// the completion latch, and re-run admission.
    pub(crate) fn finish_run(self: &Arc<Self>, id: &str, outcome: RunOutcome) {
        {
            let mut state = self.state.lock().unwrap();
            state.active.remove(id);
            if let Some(job) = state.jobs.get_mut(id) {
                job.pid = None;
                if job.status != JobStatus::Cancelled {
                    match outcome {
                        RunOutcome::Success => {
                            job.status = JobStatus::Done;
                            job.percent = 100.0;
                            job.speed = String::new();
                            job.eta = String::new();
                            self.history.record(HistoryEntry {
                                title: job.title.clone(),
                                mode: job.mode,
                            });
                        }
                        RunOutcome::Failure | RunOutcome::TimedOut => {
                            job.status = JobStatus::Error;
                        }
                    }
                }
                job.finished.cancel();
            }
        }
        self.admit_next();
    }
}

#[cfg(test)]
pub(crate) fn test_registry(cfg: FetchqConfig, dir: &std::path::Path) -> Arc<JobRegistry> {
    let layout = OutputLayout::new(dir.join("downloads"));
    layout.ensure().unwrap();
    let history = HistoryStore::new(dir.join("history.json"), cfg.max_history_entries);
    Arc::new(JobRegistry::new(cfg, layout, history))
}
