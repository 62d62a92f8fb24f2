//! # Módulo de Validação de Cenários
//!
//! Checa pacotes importados e listas de steps carregadas antes de executar.
//!
//! ## Para todos entenderem:
//!
//! Rodar um cenário inválido gasta um browser inteiro para descobrir, no
//! meio do caminho, que dois steps têm a mesma ordem. Aqui os problemas
//! estruturais aparecem antes, todos de uma vez.
//!
//! ## O que é validado:
//!
//! 1. **Cenário**: chave não vazia, chave única, ao menos um step
//! 2. **Ordem**: `order >= 1` e sem repetição dentro do cenário
//! 3. **Templates**: todo template referenciado existe
//! 4. **Nome**: o step tem nome próprio ou herda do template
//!
//! Tipos de step desconhecidos NÃO são erro: o classificador decide o
//! kind em tempo de execução. Eles só geram um aviso no log.

use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;

use crate::errors::ErrorCode;
use crate::loader::{ScenarioBundle, ScenarioDefinition};
use crate::protocol::{Step, StepKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Cenário sem nenhum step.
    #[error("Cenário '{scenario}': nenhum step definido")]
    EmptyScenario { scenario: String },

    #[error("Cenário com chave vazia (nome '{name}')")]
    EmptyScenarioKey { name: String },

    #[error("Cenário '{scenario}' definido mais de uma vez")]
    DuplicateScenario { scenario: String },

    /// Ordens começam em 1.
    #[error("Cenário '{scenario}': ordem {order} inválida (deve ser >= 1)")]
    InvalidStepOrder { scenario: String, order: i64 },

    #[error("Cenário '{scenario}': ordem {order} repetida")]
    DuplicateStepOrder { scenario: String, order: i64 },

    #[error("Cenário '{scenario}', step {order}: template '{template}' não existe")]
    UnknownTemplate {
        scenario: String,
        order: i64,
        template: String,
    },

    #[error("Cenário '{scenario}', step {order}: sem nome e sem template")]
    MissingStepName { scenario: String, order: i64 },
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyScenario { .. } | Self::EmptyScenarioKey { .. } | Self::DuplicateScenario { .. } => {
                ErrorCode::EMPTY_SCENARIO
            }
            Self::InvalidStepOrder { .. } | Self::MissingStepName { .. } => ErrorCode::INVALID_STEP_ORDER,
            Self::DuplicateStepOrder { .. } => ErrorCode::DUPLICATE_STEP_ORDER,
            Self::UnknownTemplate { .. } => ErrorCode::UNKNOWN_TEMPLATE,
        }
    }
}

/// `Err` traz todos os problemas encontrados, não só o primeiro.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

// ============================================================================
// STEPS CARREGADOS (antes de executar)
// ============================================================================

/// Valida os steps já resolvidos de um cenário.
pub fn validate_steps(scenario: &str, steps: &[Step]) -> ValidationResult {
    if steps.is_empty() {
        return Err(vec![ValidationError::EmptyScenario {
            scenario: scenario.to_string(),
        }]);
    }

    let mut errors = Vec::new();
    check_orders(scenario, steps.iter().map(|s| i64::from(s.order)), &mut errors);

    finish(errors)
}

// ============================================================================
// PACOTE IMPORTADO
// ============================================================================

/// Valida um pacote inteiro antes da importação.
pub fn validate_bundle(bundle: &ScenarioBundle) -> ValidationResult {
    let mut errors = Vec::new();

    let template_names: HashSet<&str> = bundle.templates.iter().map(|t| t.name.as_str()).collect();
    let mut seen_keys = HashSet::new();

    for scenario in &bundle.scenarios {
        if scenario.key.trim().is_empty() {
            errors.push(ValidationError::EmptyScenarioKey {
                name: scenario.name.clone(),
            });
            continue;
        }

        if !seen_keys.insert(scenario.key.as_str()) {
            errors.push(ValidationError::DuplicateScenario {
                scenario: scenario.key.clone(),
            });
        }

        validate_definition(scenario, &template_names, &mut errors);
    }

    finish(errors)
}

fn validate_definition(scenario: &ScenarioDefinition, templates: &HashSet<&str>, errors: &mut Vec<ValidationError>) {
    let key = scenario.key.as_str();

    if scenario.steps.is_empty() {
        errors.push(ValidationError::EmptyScenario {
            scenario: key.to_string(),
        });
        return;
    }

    check_orders(key, scenario.steps.iter().map(|s| s.order), errors);

    for step in &scenario.steps {
        if let Some(template) = step.template.as_deref() {
            if !templates.contains(template) {
                errors.push(ValidationError::UnknownTemplate {
                    scenario: key.to_string(),
                    order: step.order,
                    template: template.to_string(),
                });
            }
        }

        let has_name = step.name.as_deref().is_some_and(|n| !n.trim().is_empty());
        if !has_name && step.template.is_none() {
            errors.push(ValidationError::MissingStepName {
                scenario: key.to_string(),
                order: step.order,
            });
        }

        if let Some(label) = step.kind.as_deref().filter(|l| !l.trim().is_empty()) {
            if label.parse::<StepKind>() == Ok(StepKind::Unknown) {
                warn!(scenario = key, order = step.order, label, "Tipo de step desconhecido; será classificado na execução");
            }
        }
    }
}

fn check_orders(scenario: &str, orders: impl Iterator<Item = i64>, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();

    for order in orders {
        if order < 1 {
            errors.push(ValidationError::InvalidStepOrder {
                scenario: scenario.to_string(),
                order,
            });
        } else if !seen.insert(order) {
            errors.push(ValidationError::DuplicateStepOrder {
                scenario: scenario.to_string(),
                order,
            });
        }
    }
}

fn finish(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
