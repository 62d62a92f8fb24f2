//! # Módulo de Configuração do Runner
//!
//! Define os prazos de espera, endereços dos colaboradores externos e o
//! paralelismo do modo batch.
//!
//! ## Para todos entenderem:
//!
//! Todo ponto em que o runner espera algo (página carregar, elemento
//! aparecer, email chegar) tem um prazo máximo. Este módulo centraliza
//! esses prazos para que nenhum step trave para sempre.
//!
//! ## Valores padrão:
//!
//! | Campo                  | Padrão                  | Variável de ambiente         |
//! |------------------------|-------------------------|------------------------------|
//! | page_load_timeout      | 30 s                    | `RICE_PAGE_LOAD_TIMEOUT`     |
//! | selector_timeout       | 10 s                    | `RICE_SELECTOR_TIMEOUT`      |
//! | element_poll_interval  | 250 ms                  | `RICE_ELEMENT_POLL_MS`       |
//! | default_wait           | 2 s                     | -                            |
//! | email_poll_interval    | 5 s                     | `RICE_EMAIL_POLL_SECS`       |
//! | email_timeout          | 60 s                    | `RICE_EMAIL_TIMEOUT`         |
//! | email_freshness        | 5 min                   | `RICE_EMAIL_FRESHNESS_SECS`  |
//! | max_parallel           | 2                       | `RICE_MAX_PARALLEL`          |
//! | webdriver_url          | `http://localhost:9515` | `RICE_WEBDRIVER_URL`         |
//! | database_path          | `rice.db`               | `RICE_DATABASE`              |
//! | mailbox_url            | (nenhum)                | `RICE_MAILBOX_URL`           |

use std::path::PathBuf;
use std::time::Duration;

use crate::polling::PollPolicy;

pub const DEFAULT_PAGE_LOAD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SELECTOR_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ELEMENT_POLL_MS: u64 = 250;

/// Duração usada quando a descrição de um Wait não é legível.
pub const DEFAULT_WAIT_SECS: u64 = 2;

pub const DEFAULT_EMAIL_POLL_SECS: u64 = 5;
pub const DEFAULT_EMAIL_TIMEOUT_SECS: u64 = 60;

/// Emails mais antigos que isso não contam como resposta ao step.
pub const DEFAULT_EMAIL_FRESHNESS_SECS: u64 = 5 * 60;

pub const DEFAULT_MAX_PARALLEL: usize = 2;
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_DATABASE_PATH: &str = "rice.db";

/// Prazos usados pelos handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeouts {
    /// Espera por `document.readyState == "complete"` após navegar.
    pub page_load: Duration,
    /// Espera por seletor candidato (presença + clicável).
    pub selector: Duration,
    pub element_poll_interval: Duration,
    pub default_wait: Duration,
    pub email_poll_interval: Duration,
    /// Usado quando o target de CheckEmail não traz `TIMEOUT:`.
    pub email_timeout: Duration,
    pub email_freshness: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(DEFAULT_PAGE_LOAD_TIMEOUT_SECS),
            selector: Duration::from_secs(DEFAULT_SELECTOR_TIMEOUT_SECS),
            element_poll_interval: Duration::from_millis(DEFAULT_ELEMENT_POLL_MS),
            default_wait: Duration::from_secs(DEFAULT_WAIT_SECS),
            email_poll_interval: Duration::from_secs(DEFAULT_EMAIL_POLL_SECS),
            email_timeout: Duration::from_secs(DEFAULT_EMAIL_TIMEOUT_SECS),
            email_freshness: Duration::from_secs(DEFAULT_EMAIL_FRESHNESS_SECS),
        }
    }
}

impl Timeouts {
    /// Prazos curtos para testes.
    pub fn strict() -> Self {
        Self {
            page_load: Duration::from_millis(200),
            selector: Duration::from_millis(100),
            element_poll_interval: Duration::from_millis(20),
            default_wait: Duration::from_secs(DEFAULT_WAIT_SECS),
            email_poll_interval: Duration::from_millis(50),
            email_timeout: Duration::from_millis(200),
            email_freshness: Duration::from_secs(DEFAULT_EMAIL_FRESHNESS_SECS),
        }
    }

    pub fn selector_policy(&self) -> PollPolicy {
        PollPolicy::new(self.element_poll_interval, self.selector)
    }

    pub fn page_load_policy(&self) -> PollPolicy {
        PollPolicy::new(self.element_poll_interval, self.page_load)
    }
}

/// Configuração completa de uma execução.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub timeouts: Timeouts,
    pub max_parallel: usize,
    pub webdriver_url: String,
    pub database_path: PathBuf,
    pub mailbox_url: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            max_parallel: DEFAULT_MAX_PARALLEL,
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            mailbox_url: None,
        }
    }
}

impl RunnerConfig {
    /// Cria a configuração a partir de variáveis de ambiente `RICE_*`.
    ///
    /// Valores ilegíveis são ignorados e o padrão é mantido.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Mesma lógica de [`from_env`](Self::from_env) com uma fonte injetável.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let secs = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(n) = secs("RICE_PAGE_LOAD_TIMEOUT") {
            config.timeouts.page_load = Duration::from_secs(n);
        }
        if let Some(n) = secs("RICE_SELECTOR_TIMEOUT") {
            config.timeouts.selector = Duration::from_secs(n);
        }
        if let Some(n) = secs("RICE_ELEMENT_POLL_MS") {
            config.timeouts.element_poll_interval = Duration::from_millis(n.max(1));
        }
        if let Some(n) = secs("RICE_EMAIL_POLL_SECS") {
            config.timeouts.email_poll_interval = Duration::from_secs(n.max(1));
        }
        if let Some(n) = secs("RICE_EMAIL_TIMEOUT") {
            config.timeouts.email_timeout = Duration::from_secs(n);
        }
        if let Some(n) = secs("RICE_EMAIL_FRESHNESS_SECS") {
            config.timeouts.email_freshness = Duration::from_secs(n);
        }
        if let Some(n) = lookup("RICE_MAX_PARALLEL").and_then(|v| v.trim().parse::<usize>().ok()) {
            config.max_parallel = n.max(1);
        }
        if let Some(url) = lookup("RICE_WEBDRIVER_URL") {
            config.webdriver_url = url;
        }
        if let Some(path) = lookup("RICE_DATABASE") {
            config.database_path = PathBuf::from(path);
        }
        config.mailbox_url = lookup("RICE_MAILBOX_URL").filter(|u| !u.trim().is_empty());

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.timeouts.default_wait, Duration::from_secs(2));
        assert_eq!(config.timeouts.email_freshness, Duration::from_secs(300));
        assert_eq!(config.max_parallel, 2);
        assert!(config.mailbox_url.is_none());
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RICE_SELECTOR_TIMEOUT", "3"),
            ("RICE_MAX_PARALLEL", "4"),
            ("RICE_WEBDRIVER_URL", "http://grid:4444"),
            ("RICE_MAILBOX_URL", "http://mailhog:8025"),
        ]
        .into_iter()
        .collect();

        let config = RunnerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.timeouts.selector, Duration::from_secs(3));
        assert_eq!(config.max_parallel, 4);
        assert_eq!(config.webdriver_url, "http://grid:4444");
        assert_eq!(config.mailbox_url.as_deref(), Some("http://mailhog:8025"));
        assert_eq!(config.timeouts.page_load, Duration::from_secs(30));
    }

    #[test]
    fn test_unparseable_values_keep_defaults() {
        let config = RunnerConfig::from_lookup(|k| {
            (k == "RICE_PAGE_LOAD_TIMEOUT" || k == "RICE_MAX_PARALLEL").then(|| "abc".to_string())
        });
        assert_eq!(config.timeouts.page_load, Duration::from_secs(30));
        assert_eq!(config.max_parallel, DEFAULT_MAX_PARALLEL);
    }
}
