//! # Handler Navigate
//!
//! Abre a URL do target e espera `document.readyState == "complete"`.
//!
//! ## Regras
//!
//! - Se o browser já está na mesma origem + caminho, o step é um no-op.
//!   Query string e fragmento não contam.
//! - Timeout de carregamento não falha o step: páginas de ERP costumam
//!   estourar o prazo com recursos lentos e ficam utilizáveis mesmo assim.
//! - Qualquer outro erro do driver falha o step.

use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use super::{HandlerContext, HandlerResult};
use crate::driver::{Driver, DriverError};
use crate::errors::StepError;
use crate::polling::PollPolicy;
use crate::protocol::Step;

const READY_STATE_SCRIPT: &str = "return document.readyState";

pub async fn run(step: &Step, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let target = step.target.trim();
    if target.is_empty() {
        return Err(StepError::InvalidTarget {
            kind: "navigate",
            reason: "URL vazia".to_string(),
        });
    }

    match ctx.driver.current_url().await {
        Ok(current) if same_page(&current, target) => {
            info!(url = target, "Já na página de destino, navegação ignorada");
            return Ok(());
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Não foi possível ler a URL atual"),
    }

    match ctx.driver.navigate(target).await {
        Ok(()) => {}
        Err(DriverError::Timeout(detail)) => {
            warn!(url = target, %detail, "Timeout de carregamento; seguindo com a página parcial");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    wait_until_ready(ctx.driver, ctx.timeouts.page_load_policy(), target).await;
    Ok(())
}

/// Mesma origem (esquema, host, porta) e mesmo caminho.
pub fn same_page(current: &str, target: &str) -> bool {
    match (Url::parse(current), Url::parse(target)) {
        (Ok(current), Ok(target)) => current.origin() == target.origin() && current.path() == target.path(),
        _ => false,
    }
}

/// Espera o documento terminar de carregar. Nunca falha o step.
async fn wait_until_ready(driver: &dyn Driver, policy: PollPolicy, url: &str) {
    let ready = policy
        .until("document_ready", move || async move {
            match driver.execute_script(READY_STATE_SCRIPT, Vec::new()).await {
                Ok(Value::String(state)) if state == "complete" => Ok(Some(())),
                Ok(_) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await;

    match ready {
        Ok(Some(())) => info!(url, "Página carregada"),
        Ok(None) => warn!(url, "Página não chegou a 'complete' no prazo; seguindo"),
        Err(e) => warn!(url, error = %e, "Falha ao consultar readyState; seguindo"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timeouts;
    use crate::context::ValueCache;
    use crate::driver::mock::MockDriver;

    async fn navigate(driver: &MockDriver, target: &str) -> HandlerResult {
        let mut cache = ValueCache::new();
        let timeouts = Timeouts::strict();
        let mut ctx = HandlerContext {
            driver,
            cache: &mut cache,
            timeouts: &timeouts,
            email: None,
        };
        let step = Step::new(1, "Open", crate::protocol::StepKind::Navigate).with_target(target);
        run(&step, &mut ctx).await
    }

    #[test]
    fn test_same_page_ignores_query_and_fragment() {
        assert!(same_page("https://erp.example.com/po?id=1#top", "https://erp.example.com/po"));
        assert!(!same_page("https://erp.example.com/po", "https://erp.example.com/invoice"));
        assert!(!same_page("http://erp.example.com/po", "https://erp.example.com/po"));
        assert!(!same_page("about:blank", "not a url"));
    }

    #[tokio::test]
    async fn test_navigates_and_waits_for_ready_state() {
        let driver = MockDriver::new().with_url("about:blank");
        navigate(&driver, "https://erp.example.com/login").await.unwrap();

        assert_eq!(driver.url(), "https://erp.example.com/login");
        assert_eq!(
            driver.calls(),
            vec!["navigate:https://erp.example.com/login", "script:return document.readyState"]
        );
    }

    #[tokio::test]
    async fn test_same_page_is_noop() {
        let driver = MockDriver::new().with_url("https://erp.example.com/login?next=home");
        navigate(&driver, "https://erp.example.com/login").await.unwrap();
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_page_load_timeout_is_soft() {
        let driver = MockDriver::new().with_navigation_timeout();
        navigate(&driver, "https://erp.example.com/slow").await.unwrap();
        assert_eq!(driver.url(), "https://erp.example.com/slow");
    }

    #[tokio::test]
    async fn test_transport_failure_fails_step() {
        let driver = MockDriver::new().with_navigation_failure();
        let err = navigate(&driver, "https://erp.example.com").await.unwrap_err();
        assert!(matches!(err, StepError::Driver(DriverError::Transport(_))));
    }

    #[tokio::test]
    async fn test_empty_url_is_invalid() {
        let driver = MockDriver::new();
        let err = navigate(&driver, "  ").await.unwrap_err();
        assert!(matches!(err, StepError::InvalidTarget { .. }));
    }
}
