//! # Step Executor
//!
//! Roda um step completo: resolve o kind, captura o antes, despacha para
//! o handler, captura o depois e grava o resultado.
//!
//! ## Fases
//!
//! ```text
//! pending -> capturing-before -> dispatching -> capturing-after -> persisting -> completed | failed
//! ```
//!
//! Steps Wait pulam as duas capturas. A captura "depois" acontece mesmo
//! quando o handler falha, porque é a imagem que mostra o erro na tela.
//!
//! Nada aqui devolve erro: toda falha vira `StepStatus::Failed` com a
//! mensagem no [`StepOutcome`]. Quem decide parar o cenário é o runner.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn, Span};
use uuid::Uuid;

use crate::classifier;
use crate::config::Timeouts;
use crate::context::ValueCache;
use crate::driver::Driver;
use crate::email::EmailVerifier;
use crate::errors::StepError;
use crate::executors::{self, HandlerContext};
use crate::progress::ProgressSink;
use crate::protocol::{ExecutionResult, ImageDigest, Step, StepKind, StepReport, StepStatus};
use crate::storage::Persistence;
use crate::telemetry::instrumentation::StepSpanContext;

/// Onde o step está dentro da execução do cenário.
#[derive(Debug, Clone, Copy)]
pub struct StepRun<'a> {
    pub scenario_key: &'a str,
    pub run_id: Uuid,
    /// 1-based, para a barra de progresso.
    pub position: usize,
    pub total: usize,
}

/// O que sobra de um step depois de executado. Os bytes das imagens ficam
/// no banco; aqui só o digest.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub order: u32,
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub before_image: Option<ImageDigest>,
    pub after_image: Option<ImageDigest>,
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    pub fn to_report(&self) -> StepReport {
        StepReport {
            order: self.order,
            name: self.name.clone(),
            kind: self.kind,
            status: self.status,
            duration_ms: self.duration_ms,
            error: self.error.clone(),
            before_image: self.before_image.clone(),
            after_image: self.after_image.clone(),
        }
    }
}

pub fn image_digest(bytes: &[u8]) -> ImageDigest {
    ImageDigest {
        sha256: format!("{:x}", Sha256::digest(bytes)),
        bytes: bytes.len(),
    }
}

pub struct StepExecutor {
    driver: Box<dyn Driver>,
    persistence: Arc<dyn Persistence>,
    email: Option<Arc<dyn EmailVerifier>>,
    progress: Arc<dyn ProgressSink>,
    timeouts: Timeouts,
}

impl StepExecutor {
    pub fn new(
        driver: Box<dyn Driver>,
        persistence: Arc<dyn Persistence>,
        email: Option<Arc<dyn EmailVerifier>>,
        progress: Arc<dyn ProgressSink>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            driver,
            persistence,
            email,
            progress,
            timeouts,
        }
    }

    pub fn set_email(&mut self, email: Arc<dyn EmailVerifier>) {
        self.email = Some(email);
    }

    pub fn set_progress(&mut self, progress: Arc<dyn ProgressSink>) {
        self.progress = progress;
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    #[instrument(
        name = "step",
        skip_all,
        fields(
            scenario.key = run.scenario_key,
            step.order = step.order,
            step.kind = tracing::field::Empty,
            step.status = tracing::field::Empty,
            step.duration_ms = tracing::field::Empty,
        )
    )]
    pub async fn execute(&mut self, step: &Step, cache: &mut ValueCache, run: &StepRun<'_>) -> StepOutcome {
        let kind = classifier::resolve(step.kind, &step.name, &step.target, &step.description);
        if kind != step.kind {
            debug!(stored = %step.kind, resolved = %kind, "Kind resolvido pelo classificador");
        }
        let mut span_ctx = StepSpanContext::new(run.scenario_key, step.order, kind);

        self.progress
            .report(run.position, run.total, &step.name, &format!("Executando {} ({})", step.name, kind));

        if step.requires_manual_input {
            warn!(order = step.order, "Step marcado como entrada manual; executando automaticamente");
            self.progress
                .report(run.position, run.total, &step.name, "Step requer entrada manual");
        }

        debug!(phase = "capturing-before");
        let before_image = self.capture(kind, "before").await;

        debug!(phase = "dispatching");
        let handled = {
            let mut ctx = HandlerContext {
                driver: self.driver.as_ref(),
                cache,
                timeouts: &self.timeouts,
                email: self.email.as_deref(),
            };
            executors::dispatch(kind, step, &mut ctx).await
        };

        debug!(phase = "capturing-after");
        let after_image = self.capture(kind, "after").await;

        let mut error = handled.err().map(|e| {
            error!(order = step.order, code = %e.code(), error = %e, "Step falhou");
            e.user_message()
        });
        let mut status = if error.is_some() {
            StepStatus::Failed
        } else {
            StepStatus::Completed
        };

        let before_digest = before_image.as_deref().map(image_digest);
        let after_digest = after_image.as_deref().map(image_digest);

        debug!(phase = "persisting");
        let result = ExecutionResult {
            run_id: run.run_id,
            step_order: step.order,
            before_image,
            after_image,
            status,
            timestamp: Utc::now(),
            error: error.clone(),
        };
        if let Err(e) = self.persistence.save_result(run.scenario_key, &result) {
            let failure = StepError::Persistence(e.to_string());
            error!(order = step.order, error = %failure, "Resultado do step não foi gravado");
            status = StepStatus::Failed;
            error = Some(failure.user_message());
        }

        let duration_ms = span_ctx.finish(status);
        let span = Span::current();
        for (key, value) in span_ctx.attributes() {
            span.record(key, value.as_str());
        }

        info!(order = step.order, kind = %kind, status = status.as_str(), duration_ms, "Step finalizado");

        StepOutcome {
            order: step.order,
            name: step.name.clone(),
            kind,
            status,
            duration_ms,
            error,
            before_image: before_digest,
            after_image: after_digest,
        }
    }

    /// Falha de screenshot nunca falha o step; a imagem fica ausente.
    async fn capture(&self, kind: StepKind, moment: &'static str) -> Option<Vec<u8>> {
        if !kind.captures_screenshots() {
            return None;
        }
        match self.driver.screenshot().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(moment, error = %e, "Screenshot indisponível");
                None
            }
        }
    }

    /// Fecha o browser. Erros só vão para o log.
    pub async fn close(self) {
        if let Err(e) = self.driver.close().await {
            warn!(error = %e, "Falha ao fechar o browser");
        }
    }
}
