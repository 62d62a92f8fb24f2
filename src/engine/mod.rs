//! # Motor de Execução
//!
//! - [`step`]: um step, do screenshot "antes" à gravação do resultado
//! - [`scenario`]: a sequência de steps de um cenário, com parada no
//!   primeiro erro e gravação do status final

pub mod scenario;
pub mod step;

pub use scenario::{RunSummary, ScenarioRunner};
pub use step::{image_digest, StepExecutor, StepOutcome, StepRun};
