//! # Modelo de Dados do Runner
//!
//! Tipos compartilhados entre o motor de execução, os executores de ação
//! e a camada de persistência.
//!
//! ## Para todos entenderem:
//!
//! - Um **cenário** é uma lista ordenada de **steps**.
//! - Cada step tem um **kind** (navegar, clicar, digitar...), um **target**
//!   (seletor, URL, script) e uma **description** (texto livre ou payload).
//! - Cada step executado gera exatamente um [`ExecutionResult`].
//! - O cenário termina com um único [`ScenarioStatus`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// KIND DO STEP
// ============================================================================

/// Categoria canônica de ação de um step.
///
/// `Unknown` significa que o tipo persistido está ausente ou não é
/// reconhecido; o executor então recorre ao classificador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Navigate,
    ElementClick,
    TextInput,
    RunScript,
    Wait,
    ExtractText,
    ExtractAttribute,
    CheckEmail,
    Unknown,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::ElementClick => "element_click",
            Self::TextInput => "text_input",
            Self::RunScript => "run_script",
            Self::Wait => "wait",
            Self::ExtractText => "extract_text",
            Self::ExtractAttribute => "extract_attribute",
            Self::CheckEmail => "check_email",
            Self::Unknown => "unknown",
        }
    }

    /// Steps deste tipo nunca produzem screenshots.
    pub fn captures_screenshots(&self) -> bool {
        !matches!(self, Self::Wait)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converte os rótulos gravados no banco para o enum.
///
/// Rótulos desconhecidos viram `Unknown` (nunca erro): dados legados
/// trazem tipos vazios ou livres e o classificador resolve depois.
impl FromStr for StepKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Ok(match normalized.as_str() {
            "navigate" | "navigation" | "goto" => Self::Navigate,
            "click" | "element_click" | "button" => Self::ElementClick,
            "input" | "text_input" | "type" | "text" => Self::TextInput,
            "javascript" | "run_script" | "script" | "js" => Self::RunScript,
            "wait" | "sleep" | "pause" => Self::Wait,
            "get_text" | "extract_text" | "capture" => Self::ExtractText,
            "get_attribute" | "extract_attribute" => Self::ExtractAttribute,
            "check_email" | "email" | "check_notification_email" => Self::CheckEmail,
            _ => Self::Unknown,
        })
    }
}

// ============================================================================
// STEP
// ============================================================================

/// Um step declarativo, já com override/template resolvidos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Posição na sequência (>= 1, única no cenário).
    pub order: u32,
    pub name: String,
    pub kind: StepKind,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_manual_input: bool,
}

impl Step {
    pub fn new(order: u32, name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            order,
            name: name.into(),
            kind,
            target: String::new(),
            description: String::new(),
            requires_manual_input: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Nome contendo "right click" ou "right-click" troca o clique simples
    /// por selecionar + menu de contexto.
    pub fn is_right_click(&self) -> bool {
        let name = self.name.to_lowercase();
        name.contains("right click") || name.contains("right-click")
    }
}

// ============================================================================
// RESULTADOS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Resultado de uma tentativa de step, gravado logo após o step.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    pub step_order: u32,
    /// `None` significa "não capturado", nunca "vazio".
    pub before_image: Option<Vec<u8>>,
    pub after_image: Option<Vec<u8>>,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioState {
    NotRun,
    Completed,
    Failed,
}

impl ScenarioState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRun => "not-run",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::NotRun,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStatus {
    pub status: ScenarioState,
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl ScenarioStatus {
    pub fn not_run() -> Self {
        Self {
            status: ScenarioState::NotRun,
            last_executed_at: None,
        }
    }

    pub fn finished(success: bool) -> Self {
        Self {
            status: if success {
                ScenarioState::Completed
            } else {
                ScenarioState::Failed
            },
            last_executed_at: Some(Utc::now()),
        }
    }
}

// ============================================================================
// CONFIGURAÇÃO DE BROWSER (por usuário)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
    Edge,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
            Self::Edge => "edge",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "firefox" => Self::Firefox,
            "edge" | "msedge" => Self::Edge,
            _ => Self::Chrome,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub browser_kind: BrowserKind,
    #[serde(default)]
    pub incognito: bool,
    #[serde(default)]
    pub second_screen: bool,
}

// ============================================================================
// RELATÓRIO
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StepReport {
    pub order: u32,
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_image: Option<ImageDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_image: Option<ImageDigest>,
}

/// Resumo de um screenshot para o relatório JSON (os bytes ficam no banco).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDigest {
    pub sha256: String,
    pub bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub scenario: String,
    pub run_id: String,
    pub status: ScenarioState,
    pub start_time: String,
    pub end_time: String,
    pub total_steps: usize,
    pub steps: Vec<StepReport>,
}
