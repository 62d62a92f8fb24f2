// Module: Executors
// One handler per action kind. Dispatch is a closed match over StepKind, so
// adding a kind without a handler fails to compile.

pub mod elements;
pub mod email;
pub mod extract;
pub mod input;
pub mod navigate;
pub mod click;
pub mod script;
pub mod wait;

use crate::config::Timeouts;
use crate::context::ValueCache;
use crate::driver::Driver;
use crate::email::EmailVerifier;
use crate::errors::StepError;
use crate::extractors::ExtractSource;
use crate::protocol::{Step, StepKind};

pub type HandlerResult = Result<(), StepError>;

/// Everything a handler may touch while running one step.
///
/// The value cache is the only mutable piece; it is owned by the scenario
/// run and lent here for the duration of the step.
pub struct HandlerContext<'a> {
    pub driver: &'a dyn Driver,
    pub cache: &'a mut ValueCache,
    pub timeouts: &'a Timeouts,
    pub email: Option<&'a dyn EmailVerifier>,
}

/// Runs the handler for an already resolved `kind`.
///
/// `Unknown` only reaches this point if the caller skipped classification;
/// it is treated as a click, which is what the classifier falls back to.
pub async fn dispatch(kind: StepKind, step: &Step, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    match kind {
        StepKind::Navigate => navigate::run(step, ctx).await,
        StepKind::ElementClick | StepKind::Unknown => click::run(step, ctx).await,
        StepKind::TextInput => input::run(step, ctx).await,
        StepKind::RunScript => script::run(step, ctx).await,
        StepKind::Wait => wait::run(step, ctx).await,
        StepKind::ExtractText => extract::run(step, ctx, ExtractSource::Text).await,
        StepKind::ExtractAttribute => extract::run(step, ctx, ExtractSource::Attribute).await,
        StepKind::CheckEmail => email::run(step, ctx).await,
    }
}
