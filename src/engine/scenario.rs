//! # Scenario Runner
//!
//! Executa os steps de um cenário em ordem, com um browser e um value
//! cache exclusivos, e para no primeiro step que falhar.
//!
//! ## Para todos entenderem:
//!
//! ```text
//! load_steps ──> valida ordens ──> step 1 ──> step 2 ──X (falhou)
//!                                                      │
//!                                    status = failed <─┘   (step 3 nunca roda)
//! ```
//!
//! Cada execução ganha um `run_id` novo, então os resultados de execuções
//! diferentes do mesmo cenário nunca se misturam no banco. O status do
//! cenário é gravado exatamente uma vez, no fim.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn, Span};
use uuid::Uuid;

use super::step::{StepExecutor, StepOutcome, StepRun};
use crate::config::Timeouts;
use crate::context::ValueCache;
use crate::driver::Driver;
use crate::email::EmailVerifier;
use crate::errors::ErrorCode;
use crate::progress::{NoProgress, ProgressSink};
use crate::protocol::{RunReport, ScenarioState, ScenarioStatus};
use crate::storage::Persistence;
use crate::validation::validate_steps;

/// Resultado de uma execução de cenário.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub scenario_key: String,
    pub run_id: Uuid,
    pub status: ScenarioState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Steps carregados, executados ou não.
    pub total_steps: usize,
    pub steps: Vec<StepOutcome>,
    /// Falha anterior aos steps (carga, validação, browser) ou ao gravar o status.
    pub error: Option<String>,
}

impl RunSummary {
    pub fn new(scenario_key: &str, run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            scenario_key: scenario_key.to_string(),
            run_id,
            status: ScenarioState::NotRun,
            started_at: now,
            finished_at: now,
            total_steps: 0,
            steps: Vec::new(),
            error: None,
        }
    }

    /// Execução que nem começou (ex: browser não abriu).
    pub fn aborted(scenario_key: &str, error: String) -> Self {
        let mut summary = Self::new(scenario_key, Uuid::new_v4());
        summary.status = ScenarioState::Failed;
        summary.error = Some(error);
        summary
    }

    pub fn succeeded(&self) -> bool {
        self.status == ScenarioState::Completed
    }

    pub fn to_report(&self) -> RunReport {
        RunReport {
            scenario: self.scenario_key.clone(),
            run_id: self.run_id.to_string(),
            status: self.status,
            start_time: self.started_at.to_rfc3339(),
            end_time: self.finished_at.to_rfc3339(),
            total_steps: self.total_steps,
            steps: self.steps.iter().map(StepOutcome::to_report).collect(),
        }
    }
}

pub struct ScenarioRunner {
    executor: StepExecutor,
    persistence: Arc<dyn Persistence>,
    progress: Arc<dyn ProgressSink>,
}

impl ScenarioRunner {
    /// Runner com prazos padrão, sem verificador de email e sem progresso.
    pub fn new(driver: Box<dyn Driver>, persistence: Arc<dyn Persistence>) -> Self {
        let progress: Arc<dyn ProgressSink> = Arc::new(NoProgress);
        Self {
            executor: StepExecutor::new(
                driver,
                Arc::clone(&persistence),
                None,
                Arc::clone(&progress),
                Timeouts::default(),
            ),
            persistence,
            progress,
        }
    }

    pub fn with_email(mut self, email: Arc<dyn EmailVerifier>) -> Self {
        self.executor.set_email(email);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.executor.set_progress(Arc::clone(&progress));
        self.progress = progress;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.executor.set_timeouts(timeouts);
        self
    }

    /// Executa um cenário do início ao fim.
    ///
    /// Pede `&mut self`: o driver é exclusivo de uma execução, então duas
    /// execuções simultâneas no mesmo runner não compilam.
    ///
    /// ```compile_fail
    /// use rice_runner::engine::ScenarioRunner;
    ///
    /// async fn two_at_once(runner: &mut ScenarioRunner) {
    ///     let first = runner.run("PO-001");
    ///     let second = runner.run("PO-002");
    ///     tokio::join!(first, second);
    /// }
    /// ```
    #[instrument(name = "scenario", skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run(&mut self, scenario_key: &str) -> RunSummary {
        let run_id = Uuid::new_v4();
        Span::current().record("run_id", run_id.to_string().as_str());

        let mut summary = RunSummary::new(scenario_key, run_id);
        info!(scenario = scenario_key, %run_id, "🚀 Iniciando cenário");

        let mut steps = match self.persistence.load_steps(scenario_key) {
            Ok(steps) => steps,
            Err(e) => {
                error!(scenario = scenario_key, error = %e, "Falha ao carregar steps");
                summary.error = Some(format!("[{}] {}", ErrorCode::PERSISTENCE_ERROR, e));
                return self.finish(summary, false);
            }
        };
        summary.total_steps = steps.len();

        if let Err(errors) = validate_steps(scenario_key, &steps) {
            let messages: Vec<String> = errors.iter().map(|e| format!("[{}] {}", e.code(), e)).collect();
            for message in &messages {
                error!(scenario = scenario_key, "{}", message);
            }
            summary.error = Some(messages.join("; "));
            return self.finish(summary, false);
        }

        steps.sort_by_key(|s| s.order);
        let total = steps.len();
        let mut cache = ValueCache::new();
        let mut success = true;

        for (index, step) in steps.iter().enumerate() {
            let run = StepRun {
                scenario_key,
                run_id,
                position: index + 1,
                total,
            };
            let outcome = self.executor.execute(step, &mut cache, &run).await;
            let failed = outcome.is_failed();
            summary.steps.push(outcome);

            if failed {
                warn!(
                    scenario = scenario_key,
                    order = step.order,
                    skipped = total - index - 1,
                    "Step falhou; interrompendo o cenário"
                );
                success = false;
                break;
            }
        }

        self.finish(summary, success)
    }

    fn finish(&self, mut summary: RunSummary, success: bool) -> RunSummary {
        let status = ScenarioStatus::finished(success);
        summary.status = status.status;
        summary.finished_at = status.last_executed_at.unwrap_or_else(Utc::now);

        if let Err(e) = self.persistence.save_scenario_status(&summary.scenario_key, &status) {
            error!(scenario = %summary.scenario_key, error = %e, "Falha ao gravar status do cenário");
            summary
                .error
                .get_or_insert_with(|| format!("[{}] {}", ErrorCode::PERSISTENCE_ERROR, e));
        }

        let total = summary.total_steps.max(1);
        let message = if success { "Cenário concluído" } else { "Cenário falhou" };
        self.progress
            .report(total, total, &summary.scenario_key, message);

        info!(
            scenario = %summary.scenario_key,
            status = summary.status.as_str(),
            executed = summary.steps.len(),
            total = summary.total_steps,
            "🏁 Cenário finalizado"
        );
        summary
    }

    /// Fecha o browser do runner.
    pub async fn close(self) {
        self.executor.close().await;
    }
}
