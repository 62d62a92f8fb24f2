//! # rice-runner
//!
//! Motor de execução de cenários de teste de UI gravados: lê steps
//! declarativos do banco, dirige um browser via WebDriver, guarda
//! screenshots antes/depois de cada step e o status final do cenário.

pub mod batch;
pub mod classifier;
pub mod config;
pub mod context;
pub mod driver;
pub mod email;
pub mod engine;
pub mod errors;
pub mod executors;
pub mod extractors;
pub mod loader;
pub mod polling;
pub mod progress;
pub mod protocol;
pub mod storage;
pub mod telemetry;
pub mod validation;
