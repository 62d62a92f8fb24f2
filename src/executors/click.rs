//! Handler ElementClick: clique (ou clique direito) no primeiro seletor
//! candidato que ficar clicável.

use tracing::info;

use super::elements::{find_and_click, split_selectors};
use super::{HandlerContext, HandlerResult};
use crate::errors::StepError;
use crate::protocol::Step;

pub async fn run(step: &Step, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let candidates = split_selectors(&step.target);
    if candidates.is_empty() {
        return Err(StepError::InvalidTarget {
            kind: "element_click",
            reason: "nenhum seletor informado".to_string(),
        });
    }

    let right_click = step.is_right_click();
    let selector = find_and_click(ctx.driver, &candidates, ctx.timeouts.selector_policy(), right_click).await?;

    info!(%selector, right_click, "Elemento clicado");
    Ok(())
}
