//! Pipeline-run records: the orchestrator's durable state.

use std::collections::BTreeMap;

use uuid::Uuid;

use groundwire_common::{PipelineRun, RunStatus, StepState};

use crate::db::Db;
use crate::error::Result;
use crate::rows::PipelineRunRow;

const RUN_COLUMNS: &str = "id, status, include_instagram, current_step, step_states, \
     started_at, completed_at, error_message, created_at";

impl Db {
    /// Oldest run still needing work. `running` runs are eligible so a
    /// crashed orchestrator picks its run back up and resumes.
    pub async fn next_pending_run(&self) -> Result<Option<PipelineRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM pipeline_runs \
             WHERE status IN ('queued', 'running') \
             ORDER BY created_at ASC LIMIT 1"
        );
        let row = self
            .run("fetch next pipeline run", || {
                sqlx::query_as::<_, PipelineRunRow>(&sql).fetch_optional(self.pool())
            })
            .await?
            .flatten();
        Ok(row.map(PipelineRun::from))
    }

    pub async fn run_status(&self, run_id: Uuid) -> Result<Option<RunStatus>> {
        let status = self
            .run("fetch run status", || {
                sqlx::query_scalar::<_, String>("SELECT status FROM pipeline_runs WHERE id = $1")
                    .bind(run_id)
                    .fetch_optional(self.pool())
            })
            .await?
            .flatten();
        Ok(status.map(|s| RunStatus::parse(&s)))
    }

    pub async fn mark_run_running(&self, run_id: Uuid) -> Result<()> {
        self.run("mark run running", || {
            sqlx::query(
                "UPDATE pipeline_runs SET status = 'running', \
                 started_at = COALESCE(started_at, now()) WHERE id = $1",
            )
            .bind(run_id)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    pub async fn set_run_current_step(&self, run_id: Uuid, step: &str) -> Result<()> {
        self.run("set run current step", || {
            sqlx::query("UPDATE pipeline_runs SET current_step = $1 WHERE id = $2")
                .bind(step)
                .bind(run_id)
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Persist the whole step-state map. Serialized as one jsonb column so
    /// a resumed run sees exactly what the crashed one recorded.
    pub async fn save_step_states(
        &self,
        run_id: Uuid,
        step_states: &BTreeMap<String, StepState>,
    ) -> Result<()> {
        let json = serde_json::to_value(step_states)
            .unwrap_or_else(|_| serde_json::Value::Object(Default::default()));
        self.run("save step states", || {
            sqlx::query("UPDATE pipeline_runs SET step_states = $1 WHERE id = $2")
                .bind(&json)
                .bind(run_id)
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    pub async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.run("finish run", || {
            sqlx::query(
                "UPDATE pipeline_runs SET status = $1, completed_at = now(), \
                 error_message = $2 WHERE id = $3",
            )
            .bind(status.as_str())
            .bind(error_message)
            .bind(run_id)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }
}
