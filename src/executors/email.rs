//! # Handler CheckEmail
//!
//! Espera chegar um email recente que case com a busca e contenha todos
//! os termos pedidos.
//!
//! ## Formato do target:
//!
//! ```text
//! SEARCH:PO ${po_number} | CONTENT:approved,Finance | TIMEOUT:120
//! ```
//!
//! - `SEARCH:` é obrigatório (um segmento sem prefixo também vale como busca).
//! - `CONTENT:` lista termos separados por vírgula, todos obrigatórios.
//! - `TIMEOUT:` em segundos; sem ele vale o prazo configurado.
//!
//! Busca e termos passam pela substituição de `${chave}`. Só contam
//! mensagens dentro da janela de frescor (5 minutos por padrão), para não
//! aceitar o email de uma execução anterior.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{HandlerContext, HandlerResult};
use crate::context::ValueCache;
use crate::email::{EmailMessage, EmailVerifier};
use crate::errors::StepError;
use crate::polling::PollPolicy;
use crate::protocol::Step;

#[derive(Debug, Clone, PartialEq)]
pub struct EmailCheck {
    pub search: String,
    pub content: Vec<String>,
    pub timeout: Option<Duration>,
}

impl EmailCheck {
    pub fn parse(target: &str) -> Result<Self, StepError> {
        let mut search = None;
        let mut content = Vec::new();
        let mut timeout = None;

        for segment in target.split('|').map(str::trim).filter(|s| !s.is_empty()) {
            let (label, value) = match segment.split_once(':') {
                Some((label, value)) => (label.trim().to_uppercase(), value.trim()),
                None => (String::new(), segment),
            };

            match label.as_str() {
                "SEARCH" => search = Some(value.to_string()),
                "CONTENT" => content.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string),
                ),
                "TIMEOUT" => match value.parse::<f64>().ok().and_then(|s| Duration::try_from_secs_f64(s).ok()) {
                    Some(limit) => timeout = Some(limit),
                    None => warn!(value, "TIMEOUT inválido, usando o prazo configurado"),
                },
                _ if search.is_none() => search = Some(segment.to_string()),
                _ => warn!(segment, "Segmento desconhecido no target de email ignorado"),
            }
        }

        let search = search.filter(|s| !s.is_empty()).ok_or_else(|| StepError::InvalidTarget {
            kind: "check_email",
            reason: "SEARCH: ausente".to_string(),
        })?;

        Ok(Self {
            search,
            content,
            timeout,
        })
    }

    /// Aplica `${chave}` na busca e nos termos.
    fn resolved(self, cache: &ValueCache) -> Self {
        Self {
            search: cache.substitute(&self.search),
            content: self.content.iter().map(|t| cache.substitute(t)).collect(),
            timeout: self.timeout,
        }
    }
}

pub async fn run(step: &Step, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let check = EmailCheck::parse(&step.target)?.resolved(ctx.cache);

    let verifier = ctx
        .email
        .ok_or_else(|| StepError::EmailVerifier("nenhuma caixa de email configurada".to_string()))?;

    let timeout = check.timeout.unwrap_or(ctx.timeouts.email_timeout);
    let policy = PollPolicy::new(ctx.timeouts.email_poll_interval, timeout);
    let freshness = ctx.timeouts.email_freshness;

    info!(query = %check.search, terms = check.content.len(), timeout_secs = timeout.as_secs(), "Aguardando email");

    let found = wait_for_message(verifier, &check, policy, freshness).await;

    match found {
        Some(message) => {
            info!(subject = %message.subject, received_at = %message.received_at, "Email encontrado");
            Ok(())
        }
        None => Err(StepError::EmailNotFound {
            query: check.search,
            timeout_secs: timeout.as_secs(),
        }),
    }
}

/// Falhas de transporte da caixa contam como "ainda não chegou".
async fn wait_for_message(
    verifier: &dyn EmailVerifier,
    check: &EmailCheck,
    policy: PollPolicy,
    freshness: Duration,
) -> Option<EmailMessage> {
    let outcome = policy
        .until("check_email", move || async move {
            match verifier.search(&check.search).await {
                Ok(Some(message)) if !message.is_fresh(freshness) => {
                    debug!(received_at = %message.received_at, "Email mais recente é antigo demais");
                    Ok(None)
                }
                Ok(Some(message)) if !message.contains_all(&check.content) => {
                    debug!(subject = %message.subject, "Email sem todos os termos esperados");
                    Ok(None)
                }
                Ok(found) => Ok::<_, std::convert::Infallible>(found),
                Err(e) => {
                    warn!(error = %e, "Falha ao consultar a caixa de email");
                    Ok(None)
                }
            }
        })
        .await;

    match outcome {
        Ok(found) => found,
        Err(never) => match never {},
    }
}
