//! The run loop: pick up queued or crashed-while-running pipeline runs,
//! execute the stage sequence as child processes, and record resumable
//! per-step state after every transition.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{error, info, warn};

use groundwire_common::{CancelFlag, PipelineRun, RunStatus, StepState, StepStatus};
use groundwire_store::Db;

use crate::log_tail::LogTail;
use crate::stages::{pipeline_stages, Stage};

pub struct Orchestrator {
    db: Db,
    poll_interval: Duration,
    /// Set by SIGTERM/SIGINT; checked between runs and between stages.
    stop: CancelFlag,
}

struct StageOutcome {
    return_code: i32,
    log_tail: Vec<String>,
}

impl Orchestrator {
    pub fn new(db: Db, poll_interval: Duration, stop: CancelFlag) -> Self {
        Self {
            db,
            poll_interval,
            stop,
        }
    }

    /// Poll for eligible runs until asked to stop. A run in `running`
    /// state is resumed: completed steps are skipped, the failed or
    /// interrupted step restarts from scratch.
    pub async fn run_forever(&self) -> Result<()> {
        info!(poll_secs = self.poll_interval.as_secs(), "orchestrator started");

        while !self.stop.is_cancelled() {
            match self.db.next_pending_run().await {
                Ok(Some(run)) => {
                    if let Err(e) = self.process_run(run).await {
                        error!(error = %e, "run processing failed");
                    }
                }
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    error!(error = %e, "run lookup failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        info!("orchestrator stopping after current run");
        Ok(())
    }

    pub async fn process_run(&self, run: PipelineRun) -> Result<()> {
        info!(run = %run.id, status = ?run.status, "picking up pipeline run");
        self.db.mark_run_running(run.id).await?;

        let mut step_states: BTreeMap<String, StepState> = run.step_states.clone();

        for stage in pipeline_stages() {
            if self.stop.is_cancelled() {
                info!(run = %run.id, "stop requested between stages");
                return Ok(());
            }

            if matches!(
                step_states.get(stage.name).map(|s| s.status),
                Some(StepStatus::Completed)
            ) {
                info!(run = %run.id, step = stage.name, "already completed, skipping");
                continue;
            }

            if stage.optional && !run.include_instagram {
                step_states.insert(
                    stage.name.to_string(),
                    StepState {
                        status: StepStatus::Skipped,
                        started_at: None,
                        completed_at: None,
                        duration_seconds: None,
                        return_code: None,
                        log_tail: Vec::new(),
                    },
                );
                self.db.save_step_states(run.id, &step_states).await?;
                info!(run = %run.id, step = stage.name, "optional stage skipped");
                continue;
            }

            let started_at = Utc::now();
            step_states.insert(
                stage.name.to_string(),
                StepState {
                    status: StepStatus::Running,
                    started_at: Some(started_at),
                    completed_at: None,
                    duration_seconds: None,
                    return_code: None,
                    log_tail: Vec::new(),
                },
            );
            self.db.set_run_current_step(run.id, stage.name).await?;
            self.db.save_step_states(run.id, &step_states).await?;

            info!(run = %run.id, step = stage.name, program = %stage.program, "stage starting");
            let outcome = self.run_stage(&run, &stage).await;

            let completed_at = Utc::now();
            let duration = (completed_at - started_at).num_milliseconds() as f64 / 1_000.0;

            let (status, return_code, log_tail, error_message) = match outcome {
                Ok(o) if o.return_code == 0 => {
                    (StepStatus::Completed, Some(o.return_code), o.log_tail, None)
                }
                Ok(o) => (
                    StepStatus::Failed,
                    Some(o.return_code),
                    o.log_tail,
                    Some(format!(
                        "step {} exited with code {}",
                        stage.name, o.return_code
                    )),
                ),
                Err(e) => (
                    StepStatus::Failed,
                    None,
                    vec![e.to_string()],
                    Some(format!("step {} failed to launch: {e}", stage.name)),
                ),
            };

            step_states.insert(
                stage.name.to_string(),
                StepState {
                    status,
                    started_at: Some(started_at),
                    completed_at: Some(completed_at),
                    duration_seconds: Some(duration),
                    return_code,
                    log_tail,
                },
            );
            self.db.save_step_states(run.id, &step_states).await?;

            if let Some(message) = error_message {
                warn!(run = %run.id, step = stage.name, error = %message, "stage failed, aborting run");
                self.db
                    .finish_run(run.id, RunStatus::Failed, Some(message.as_str()))
                    .await?;
                return Ok(());
            }

            info!(run = %run.id, step = stage.name, duration_secs = duration, "stage completed");
        }

        self.db.finish_run(run.id, RunStatus::Succeeded, None).await?;
        info!(run = %run.id, "pipeline run succeeded");
        Ok(())
    }

    /// Launch one stage as a child process, streaming stdout and stderr
    /// into a bounded ring buffer.
    async fn run_stage(&self, run: &PipelineRun, stage: &Stage) -> Result<StageOutcome> {
        let mut child = Command::new(&stage.program)
            .args(&stage.args)
            .env("GROUNDWIRE_RUN_ID", run.id.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning {}", stage.program))?;

        let stdout = child.stdout.take().context("child stdout missing")?;
        let stderr = child.stderr.take().context("child stderr missing")?;
        let name = stage.name;

        let stdout_task = tokio::spawn(capture_lines(stdout, name));
        let stderr_task = tokio::spawn(capture_lines(stderr, name));

        let status = child.wait().await.context("waiting on child")?;

        let mut tail = LogTail::default();
        for line in stdout_task.await.unwrap_or_default() {
            tail.push(line);
        }
        for line in stderr_task.await.unwrap_or_default() {
            tail.push(line);
        }

        Ok(StageOutcome {
            return_code: status.code().unwrap_or(-1),
            log_tail: tail.into_lines(),
        })
    }
}

async fn capture_lines<R>(reader: R, stage: &'static str) -> Vec<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut tail = LogTail::default();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: "stage", stage, "{line}");
        tail.push(line);
    }
    tail.into_lines()
}
