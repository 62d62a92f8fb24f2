//! Handlers ExtractText / ExtractAttribute: lê um valor da página e grava
//! no value cache para os steps seguintes.

use tracing::info;

use super::elements::{find_attribute, find_text};
use super::{HandlerContext, HandlerResult};
use crate::extractors::{auto_cache_key, ExtractSource, ExtractTarget, ExtractionResult};
use crate::protocol::Step;

pub async fn run(step: &Step, ctx: &mut HandlerContext<'_>, source: ExtractSource) -> HandlerResult {
    let target = ExtractTarget::parse(&step.target, source)?;
    let policy = ctx.timeouts.selector_policy();

    let raw = match (&source, target.attribute.as_deref()) {
        (ExtractSource::Attribute, Some(attribute)) => {
            find_attribute(ctx.driver, &target.selectors, attribute, policy).await?
        }
        _ => find_text(ctx.driver, &target.selectors, policy).await?,
    };
    let value = raw.trim().to_string();

    let key = target
        .cache_key
        .unwrap_or_else(|| auto_cache_key(step.order, &step.name));

    let result = ExtractionResult {
        key: key.clone(),
        source,
        chars: value.chars().count(),
    };
    ctx.cache.set(key, value);

    info!(key = %result.key, source = ?result.source, chars = result.chars, "Valor extraído para o cache");
    Ok(())
}
