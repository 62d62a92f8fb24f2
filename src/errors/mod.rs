//! # Módulo de Códigos de Erro Estruturados
//!
//! Códigos padronizados para as falhas de step, gravados junto do
//! resultado (`[E3001] ...`) para que o relatório TES-070 e dashboards
//! consigam agrupar falhas sem interpretar texto livre.
//!
//! ## Categorias de Erro
//!
//! | Faixa  | Categoria       | Descrição                          |
//! |--------|-----------------|------------------------------------|
//! | E1xxx  | Validação       | Cenário ou step mal definido       |
//! | E2xxx  | Driver          | Falha na automação do browser      |
//! | E3xxx  | Step            | Ação executada mas não concluída   |
//! | E4xxx  | Configuração    | Persistência, ambiente, setup      |
//! | E5xxx  | Interno         | Bug no próprio Runner              |
//!
//! ## Taxonomia de falhas
//!
//! - **SoftTimeout**: timeout de página; vira warning, step passa.
//! - **SelectorExhausted**: todos os seletores falharam; step falha.
//! - **ParseFallback**: duração/target malformado; usa default e segue.
//! - **HandlerException**: qualquer [`StepError`]; capturado no executor.
//! - **ScenarioAbort**: primeira falha interrompe o cenário.

use std::fmt;

use thiserror::Error;

use crate::driver::DriverError;

// ============================================================================
// CÓDIGO DE ERRO
// ============================================================================

/// Código de erro com categoria (primeiro dígito) e número.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // E1xxx: Validação
    pub const EMPTY_SCENARIO: Self = Self(1001);
    pub const INVALID_STEP_ORDER: Self = Self(1002);
    pub const DUPLICATE_STEP_ORDER: Self = Self(1003);
    pub const INVALID_TARGET: Self = Self(1004);
    pub const UNKNOWN_TEMPLATE: Self = Self(1005);

    // E2xxx: Driver
    pub const DRIVER_TRANSPORT: Self = Self(2001);
    pub const DRIVER_PROTOCOL: Self = Self(2002);
    pub const DRIVER_TIMEOUT: Self = Self(2003);
    pub const SCRIPT_ERROR: Self = Self(2004);

    // E3xxx: Step
    pub const SELECTOR_EXHAUSTED: Self = Self(3001);
    pub const ELEMENT_NOT_INTERACTABLE: Self = Self(3002);
    pub const ATTRIBUTE_MISSING: Self = Self(3003);
    pub const EMAIL_NOT_FOUND: Self = Self(3004);
    pub const ENTER_FALLBACK_EXHAUSTED: Self = Self(3005);

    // E4xxx: Configuração
    pub const PERSISTENCE_ERROR: Self = Self(4001);
    pub const EMAIL_VERIFIER_UNAVAILABLE: Self = Self(4002);

    // E5xxx: Interno
    pub const INTERNAL_ERROR: Self = Self(5001);

    pub fn code(&self) -> u16 {
        self.0
    }

    /// Exemplo: `ErrorCode::SELECTOR_EXHAUSTED.formatted() == "E3001"`
    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }

    pub fn category(&self) -> ErrorCategory {
        match self.0 / 1000 {
            1 => ErrorCategory::Validation,
            2 => ErrorCategory::Driver,
            3 => ErrorCategory::Step,
            4 => ErrorCategory::Configuration,
            5 => ErrorCategory::Internal,
            _ => ErrorCategory::Unknown,
        }
    }

    pub fn description(&self) -> &'static str {
        match self.0 {
            1001 => "Cenário vazio",
            1002 => "Ordem de step inválida",
            1003 => "Ordem de step duplicada",
            1004 => "Target inválido",
            1005 => "Template não encontrado",
            2001 => "Falha de comunicação com o driver",
            2002 => "Resposta inesperada do driver",
            2003 => "Timeout do driver",
            2004 => "Erro de script no browser",
            3001 => "Nenhum seletor encontrou elemento",
            3002 => "Elemento não interagível",
            3003 => "Atributo ausente",
            3004 => "Email não encontrado",
            3005 => "Nenhuma estratégia de Enter funcionou",
            4001 => "Erro de persistência",
            4002 => "Verificador de email indisponível",
            5001 => "Erro interno",
            _ => "Erro desconhecido",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Driver,
    Step,
    Configuration,
    Internal,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "Validação"),
            Self::Driver => write!(f, "Driver"),
            Self::Step => write!(f, "Step"),
            Self::Configuration => write!(f, "Configuração"),
            Self::Internal => write!(f, "Interno"),
            Self::Unknown => write!(f, "Desconhecido"),
        }
    }
}

// ============================================================================
// ERRO DE STEP
// ============================================================================

/// Falha de um handler. Nunca atravessa a fronteira do Step Executor.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("nenhum seletor encontrou um elemento utilizável: {candidates:?}")]
    SelectorExhausted { candidates: Vec<String> },

    #[error("target inválido para {kind}: {reason}")]
    InvalidTarget { kind: &'static str, reason: String },

    #[error("atributo '{attribute}' ausente no elemento '{selector}'")]
    AttributeMissing { selector: String, attribute: String },

    #[error("nenhuma estratégia de Enter funcionou: {0}")]
    EnterFallbackExhausted(String),

    #[error("nenhum email recente para '{query}' em {timeout_secs}s")]
    EmailNotFound { query: String, timeout_secs: u64 },

    #[error("verificador de email indisponível: {0}")]
    EmailVerifier(String),

    #[error("falha ao persistir resultado: {0}")]
    Persistence(String),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl StepError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SelectorExhausted { .. } => ErrorCode::SELECTOR_EXHAUSTED,
            Self::InvalidTarget { .. } => ErrorCode::INVALID_TARGET,
            Self::AttributeMissing { .. } => ErrorCode::ATTRIBUTE_MISSING,
            Self::EnterFallbackExhausted(_) => ErrorCode::ENTER_FALLBACK_EXHAUSTED,
            Self::EmailNotFound { .. } => ErrorCode::EMAIL_NOT_FOUND,
            Self::EmailVerifier(_) => ErrorCode::EMAIL_VERIFIER_UNAVAILABLE,
            Self::Persistence(_) => ErrorCode::PERSISTENCE_ERROR,
            Self::Driver(e) => match e {
                DriverError::Transport(_) => ErrorCode::DRIVER_TRANSPORT,
                DriverError::Timeout(_) => ErrorCode::DRIVER_TIMEOUT,
                DriverError::Script(_) => ErrorCode::SCRIPT_ERROR,
                DriverError::NotInteractable(_) => ErrorCode::ELEMENT_NOT_INTERACTABLE,
                DriverError::NoSuchElement(_) => ErrorCode::SELECTOR_EXHAUSTED,
                DriverError::Protocol(_) => ErrorCode::DRIVER_PROTOCOL,
            },
        }
    }

    /// Mensagem gravada em `ExecutionResult.error`.
    pub fn user_message(&self) -> String {
        format!("[{}] {}", self.code(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_formatting() {
        assert_eq!(ErrorCode::EMPTY_SCENARIO.formatted(), "E1001");
        assert_eq!(ErrorCode::SELECTOR_EXHAUSTED.formatted(), "E3001");
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::DUPLICATE_STEP_ORDER.category(), ErrorCategory::Validation);
        assert_eq!(ErrorCode::DRIVER_TIMEOUT.category(), ErrorCategory::Driver);
        assert_eq!(ErrorCode::EMAIL_NOT_FOUND.category(), ErrorCategory::Step);
        assert_eq!(ErrorCode::PERSISTENCE_ERROR.category(), ErrorCategory::Configuration);
        assert_eq!(ErrorCode::INTERNAL_ERROR.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_step_error_user_message() {
        let err = StepError::SelectorExhausted {
            candidates: vec!["//div[1]".into(), "#missing".into()],
        };
        let msg = err.user_message();
        assert!(msg.starts_with("[E3001]"));
        assert!(msg.contains("#missing"));
    }

    #[test]
    fn test_driver_error_maps_to_driver_codes() {
        let err = StepError::from(DriverError::Script("ReferenceError".into()));
        assert_eq!(err.code(), ErrorCode::SCRIPT_ERROR);
        assert_eq!(err.code().category(), ErrorCategory::Driver);
    }
}
