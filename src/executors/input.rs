//! Handler TextInput: foca o campo, limpa e digita a description com os
//! placeholders `${chave}` já substituídos pelo value cache.

use tracing::info;

use super::elements::wait_for;
use super::{HandlerContext, HandlerResult};
use crate::errors::StepError;
use crate::protocol::Step;

pub async fn run(step: &Step, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let selector = step.target.trim();
    if selector.is_empty() {
        return Err(StepError::InvalidTarget {
            kind: "text_input",
            reason: "nenhum seletor informado".to_string(),
        });
    }

    let element = wait_for(ctx.driver, selector, ctx.timeouts.selector_policy(), true)
        .await?
        .ok_or_else(|| StepError::SelectorExhausted {
            candidates: vec![selector.to_string()],
        })?;

    let text = ctx.cache.substitute(&step.description);

    ctx.driver.click(&element).await?;
    ctx.driver.clear(&element).await?;
    ctx.driver.send_keys(&element, &text).await?;

    // O valor digitado pode ser sensível; só o tamanho vai para o log.
    info!(selector, chars = text.chars().count(), "Texto digitado");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timeouts;
    use crate::context::ValueCache;
    use crate::driver::mock::{MockDriver, MockElement};
    use crate::protocol::StepKind;

    #[tokio::test]
    async fn test_types_substituted_text() {
        let driver = MockDriver::new().with_element("#po", MockElement::new(""));
        let mut cache = ValueCache::new();
        cache.set("po_number", "4500012345");
        let timeouts = Timeouts::strict();
        let mut ctx = HandlerContext {
            driver: &driver,
            cache: &mut cache,
            timeouts: &timeouts,
            email: None,
        };
        let step = Step::new(2, "Enter PO", StepKind::TextInput)
            .with_target("#po")
            .with_description("PO ${po_number} / ${unknown}");

        run(&step, &mut ctx).await.unwrap();

        assert_eq!(driver.typed_into("#po").as_deref(), Some("PO 4500012345 / ${unknown}"));
        assert_eq!(
            driver.calls(),
            vec!["click:#po", "clear:#po", "send_keys:#po:PO 4500012345 / ${unknown}"]
        );
    }

    #[tokio::test]
    async fn test_missing_field_fails() {
        let driver = MockDriver::new();
        let mut cache = ValueCache::new();
        let timeouts = Timeouts::strict();
        let mut ctx = HandlerContext {
            driver: &driver,
            cache: &mut cache,
            timeouts: &timeouts,
            email: None,
        };
        let step = Step::new(2, "Enter PO", StepKind::TextInput)
            .with_target("#po")
            .with_description("x");

        let err = run(&step, &mut ctx).await.unwrap_err();
        assert!(matches!(err, StepError::SelectorExhausted { .. }));
        assert!(driver.calls().is_empty());
    }
}
