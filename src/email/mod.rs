//! # Verificação de Email
//!
//! Colaborador usado pelo step CheckEmail: procura a mensagem mais recente
//! que casa com uma consulta. A autenticação e a renderização de emails
//! ficam fora do runner; aqui só existe o contrato e um cliente HTTP para
//! caixas de teste com API de busca (MailHog e compatíveis).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("falha ao consultar a caixa de email: {0}")]
    Transport(String),

    #[error("resposta inválida da caixa de email: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl EmailMessage {
    /// Recebida dentro da janela de `window` até agora.
    pub fn is_fresh(&self, window: Duration) -> bool {
        let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        Utc::now() - self.received_at <= window
    }

    /// Todos os termos presentes no corpo, sem diferenciar maiúsculas.
    /// O assunto não conta.
    pub fn contains_all(&self, terms: &[String]) -> bool {
        let body = self.body.to_lowercase();
        terms.iter().all(|t| body.contains(&t.to_lowercase()))
    }
}

#[async_trait]
pub trait EmailVerifier: Send + Sync {
    /// Mensagem mais recente que casa com `query`, se houver.
    async fn search(&self, query: &str) -> Result<Option<EmailMessage>, EmailError>;
}

// ============================================================================
// CLIENTE HTTP (API v2 de busca estilo MailHog)
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(rename = "Content")]
    content: ItemContent,
    #[serde(rename = "Created")]
    created: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ItemContent {
    #[serde(rename = "Headers", default)]
    headers: std::collections::HashMap<String, Vec<String>>,
    #[serde(rename = "Body", default)]
    body: String,
}

pub struct MailboxApiVerifier {
    http: Client,
    base_url: String,
}

impl MailboxApiVerifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn latest(response: SearchResponse) -> Option<EmailMessage> {
        response
            .items
            .into_iter()
            .max_by_key(|item| item.created)
            .map(|item| EmailMessage {
                subject: item
                    .content
                    .headers
                    .get("Subject")
                    .and_then(|values| values.first())
                    .cloned()
                    .unwrap_or_default(),
                body: item.content.body,
                received_at: item.created,
            })
    }
}

#[async_trait]
impl EmailVerifier for MailboxApiVerifier {
    async fn search(&self, query: &str) -> Result<Option<EmailMessage>, EmailError> {
        let url = format!(
            "{}/api/v2/search?kind=containing&query={}",
            self.base_url,
            urlencoding::encode(query)
        );
        debug!(%url, "Consultando caixa de email");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| EmailError::InvalidResponse(e.to_string()))?;

        Ok(Self::latest(parsed))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Devolve as respostas enfileiradas em ordem; depois disso, `None`.
    #[derive(Clone, Default)]
    pub struct MockVerifier {
        responses: Arc<Mutex<VecDeque<Option<EmailMessage>>>>,
        pub queries: Arc<Mutex<Vec<String>>>,
    }

    impl MockVerifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn then(self, message: Option<EmailMessage>) -> Self {
            self.responses.lock().push_back(message);
            self
        }
    }

    #[async_trait]
    impl EmailVerifier for MockVerifier {
        async fn search(&self, query: &str) -> Result<Option<EmailMessage>, EmailError> {
            self.queries.lock().push(query.to_string());
            Ok(self.responses.lock().pop_front().flatten())
        }
    }
}
