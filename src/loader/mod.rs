//! # Módulo de Carregamento - Pacotes de Cenários
//!
//! Lê pacotes JSON com templates de step, cenários e configurações de
//! browser por usuário, para importação no banco.
//!
//! ## Formato:
//!
//! ```json
//! {
//!   "templates": [
//!     { "name": "Open portal", "type": "navigate", "target": "https://erp.example.com" }
//!   ],
//!   "scenarios": [
//!     {
//!       "key": "PO-001",
//!       "name": "Create purchase order",
//!       "steps": [
//!         { "order": 1, "template": "Open portal" },
//!         { "order": 2, "name": "Enter PO", "type": "text_input", "target": "#po", "description": "${po}" }
//!       ]
//!     }
//!   ],
//!   "users": [ { "user": "qa01", "browser_kind": "firefox", "incognito": true } ]
//! }
//! ```
//!
//! Campos do step sobrescrevem os do template; campos ausentes ou vazios
//! herdam do template. A junção acontece na leitura (ver `storage`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::protocol::BrowserConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScenarioBundle {
    #[serde(default)]
    pub templates: Vec<StepTemplate>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioDefinition>,
    #[serde(default)]
    pub users: Vec<UserBrowserConfig>,
}

/// Step reutilizável, referenciado por nome.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepTemplate {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioDefinition {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

/// Override específico do cenário.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepDefinition {
    pub order: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requires_manual_input: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserBrowserConfig {
    pub user: String,
    #[serde(flatten)]
    pub browser: BrowserConfig,
}

/// Carrega um pacote de cenários de um arquivo JSON.
pub fn load_bundle_from_file<P: AsRef<Path>>(path: P) -> Result<ScenarioBundle> {
    let path_ref = path.as_ref();

    let content = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read scenario bundle {:?}", path_ref))?;

    let bundle = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse scenario bundle JSON {:?}", path_ref))?;

    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BrowserKind;
    use std::io::Write;

    #[test]
    fn test_load_bundle_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "templates": [{{ "name": "Open portal", "type": "navigate", "target": "https://erp.example.com" }}],
                "scenarios": [{{
                    "key": "PO-001",
                    "name": "Create PO",
                    "steps": [
                        {{ "order": 1, "template": "Open portal" }},
                        {{ "order": 2, "name": "Wait", "type": "wait", "description": "3" }}
                    ]
                }}],
                "users": [{{ "user": "qa01", "browser_kind": "firefox", "incognito": true }}]
            }}"#
        )
        .unwrap();

        let bundle = load_bundle_from_file(file.path()).unwrap();

        assert_eq!(bundle.templates.len(), 1);
        assert_eq!(bundle.templates[0].kind.as_deref(), Some("navigate"));
        assert_eq!(bundle.scenarios[0].steps.len(), 2);
        assert_eq!(bundle.scenarios[0].steps[0].template.as_deref(), Some("Open portal"));
        assert!(bundle.scenarios[0].steps[0].name.is_none());
        assert_eq!(bundle.users[0].browser.browser_kind, BrowserKind::Firefox);
        assert!(bundle.users[0].browser.incognito);
        assert!(!bundle.users[0].browser.second_screen);
    }

    #[test]
    fn test_load_bundle_reports_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = load_bundle_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse scenario bundle"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_bundle_from_file("/nonexistent/bundle.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read scenario bundle"));
    }
}
