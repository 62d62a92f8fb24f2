//! # Handler Wait - Pausas Fixas
//!
//! Pausa a execução pelo número de segundos da description.
//! Útil para telas que processam em segundo plano sem sinal visível.
//!
//! ## Formatos aceitos na description:
//! - `"3"` ou `"1.5"` - segundos (aceita fração)
//! - `"Time (seconds): 5"` - formato legado gravado por cenários antigos
//!
//! Qualquer outra coisa cai no padrão de 2 segundos (com aviso).
//! Wait nunca falha e nunca tira screenshot.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{info, instrument, warn};

use super::{HandlerContext, HandlerResult};
use crate::protocol::Step;

/// Prefixo do formato legado, comparado sem diferenciar maiúsculas.
const LEGACY_PREFIX: &str = "time (seconds):";

/// Interpreta a description como segundos.
///
/// ## Retorno:
/// - `Some(Duration)` para números não negativos que cabem num `Duration`
/// - `None` para qualquer outra coisa (inclusive `1e30`)
pub fn parse_wait_duration(description: &str) -> Option<Duration> {
    let lowered = description.trim().to_lowercase();
    let raw = lowered.strip_prefix(LEGACY_PREFIX).unwrap_or(&lowered).trim();

    let seconds: f64 = raw.parse().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

#[instrument(skip(step, ctx), fields(order = step.order, duration_ms))]
pub async fn run(step: &Step, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let duration = parse_wait_duration(&step.description).unwrap_or_else(|| {
        warn!(
            description = %step.description,
            default_secs = ctx.timeouts.default_wait.as_secs_f64(),
            "Duração de wait inválida, usando o padrão"
        );
        ctx.timeouts.default_wait
    });

    tracing::Span::current().record("duration_ms", duration.as_millis() as u64);
    info!(order = step.order, duration_ms = duration.as_millis() as u64, "⏳ Aguardando...");

    let start = Instant::now();
    sleep(duration).await;

    info!(order = step.order, actual_duration_ms = start.elapsed().as_millis() as u64, "✅ Wait concluído");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timeouts;
    use crate::context::ValueCache;
    use crate::driver::mock::MockDriver;
    use crate::protocol::StepKind;

    #[test]
    fn test_parse_plain_seconds() {
        assert_eq!(parse_wait_duration("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_wait_duration(" 1.5 "), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_parse_legacy_format() {
        assert_eq!(parse_wait_duration("Time (seconds): 5"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_wait_duration("abc"), None);
        assert_eq!(parse_wait_duration("-1"), None);
        assert_eq!(parse_wait_duration("NaN"), None);
        assert_eq!(parse_wait_duration(""), None);
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert_eq!(parse_wait_duration("1e30"), None);
        assert_eq!(parse_wait_duration("inf"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_description_waits_default() {
        let driver = MockDriver::new();
        let mut cache = ValueCache::new();
        let timeouts = Timeouts::strict();
        let mut ctx = HandlerContext {
            driver: &driver,
            cache: &mut cache,
            timeouts: &timeouts,
            email: None,
        };
        let step = Step::new(1, "Wait", StepKind::Wait).with_description("Time (seconds): 1e30");

        let before = tokio::time::Instant::now();
        run(&step, &mut ctx).await.unwrap();
        assert!(before.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_description_waits_default() {
        let driver = MockDriver::new();
        let mut cache = ValueCache::new();
        let timeouts = Timeouts::strict();
        let mut ctx = HandlerContext {
            driver: &driver,
            cache: &mut cache,
            timeouts: &timeouts,
            email: None,
        };
        let step = Step::new(1, "Wait", StepKind::Wait).with_description("abc");

        let before = tokio::time::Instant::now();
        run(&step, &mut ctx).await.unwrap();

        let waited = before.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3));
        assert!(driver.calls().is_empty());
    }
}
