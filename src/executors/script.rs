//! # Handler RunScript
//!
//! Executa o JavaScript da description na página atual.
//!
//! Scripts que só existem para "apertar Enter" (mencionam `enter` ou
//! `keydown`) não rodam como escritos: o Enter sintético de um script
//! raramente dispara os handlers do framework da página. No lugar, o
//! runner tenta três estratégias em ordem, parando na primeira que funciona:
//!
//! 1. Tecla Enter real pelo driver, no elemento focado
//! 2. Eventos `keydown`/`keypress`/`keyup` despachados no elemento focado
//! 3. Submit do `<form>` que contém o elemento focado

use tracing::{info, warn};

use super::{HandlerContext, HandlerResult};
use crate::driver::Driver;
use crate::errors::StepError;
use crate::protocol::Step;

const SYNTHETIC_ENTER_SCRIPT: &str = r#"
var el = document.activeElement || document.body;
['keydown', 'keypress', 'keyup'].forEach(function (type) {
    el.dispatchEvent(new KeyboardEvent(type, {
        key: 'Enter', code: 'Enter', keyCode: 13, which: 13, bubbles: true, cancelable: true
    }));
});
return true;
"#;

const FORM_SUBMIT_SCRIPT: &str = r#"
var el = document.activeElement;
var form = el && el.closest ? el.closest('form') : null;
if (!form) { throw new Error('no enclosing form'); }
if (form.requestSubmit) { form.requestSubmit(); } else { form.submit(); }
return true;
"#;

pub async fn run(step: &Step, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let body = step.description.trim();
    if body.is_empty() {
        return Err(StepError::InvalidTarget {
            kind: "run_script",
            reason: "script vazio".to_string(),
        });
    }

    if simulates_enter(body) {
        return press_enter_with_fallback(ctx.driver).await;
    }

    ctx.driver.execute_script(body, Vec::new()).await?;
    info!(chars = body.len(), "Script executado");
    Ok(())
}

pub fn simulates_enter(body: &str) -> bool {
    let lowered = body.to_lowercase();
    lowered.contains("enter") || lowered.contains("keydown")
}

async fn press_enter_with_fallback(driver: &dyn Driver) -> HandlerResult {
    let mut failures = Vec::with_capacity(3);

    match driver.press_enter().await {
        Ok(()) => {
            info!(strategy = "native", "Enter enviado");
            return Ok(());
        }
        Err(e) => {
            warn!(error = %e, "Enter nativo falhou, tentando eventos sintéticos");
            failures.push(format!("native: {}", e));
        }
    }

    match driver.execute_script(SYNTHETIC_ENTER_SCRIPT, Vec::new()).await {
        Ok(_) => {
            info!(strategy = "synthetic", "Enter enviado");
            return Ok(());
        }
        Err(e) => {
            warn!(error = %e, "Eventos sintéticos falharam, tentando submit do formulário");
            failures.push(format!("synthetic: {}", e));
        }
    }

    match driver.execute_script(FORM_SUBMIT_SCRIPT, Vec::new()).await {
        Ok(_) => {
            info!(strategy = "form_submit", "Formulário submetido");
            Ok(())
        }
        Err(e) => {
            failures.push(format!("form_submit: {}", e));
            Err(StepError::EnterFallbackExhausted(failures.join("; ")))
        }
    }
}
