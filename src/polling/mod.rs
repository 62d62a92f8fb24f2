//! Módulo de Espera Limitada.
//!
//! Todos os pontos de suspensão do runner passam por aqui: presença de
//! elemento, `document.readyState` e busca de email. Cada espera tem um
//! timeout rígido; nada bloqueia indefinidamente.
//!
//! A operação sempre roda pelo menos uma vez, mesmo com timeout zero.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

/// Política de espera: intervalo entre tentativas e prazo total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Tenta `operation` até ela devolver `Some` ou o prazo acabar.
    ///
    /// # Retorno
    /// * `Ok(Some(value))` - condição satisfeita
    /// * `Ok(None)` - prazo esgotado
    /// * `Err(error)` - a operação falhou; propagado sem nova tentativa
    pub async fn until<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut attempt: u32 = 1;

        loop {
            if let Some(value) = operation().await? {
                if attempt > 1 {
                    debug!(label, attempt, "Condição satisfeita após espera");
                }
                return Ok(Some(value));
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(label, attempt, timeout_ms = self.timeout.as_millis() as u64, "Prazo esgotado");
                return Ok(None);
            }

            sleep(self.interval.min(deadline - now)).await;
            attempt += 1;
        }
    }
}
