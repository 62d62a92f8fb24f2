//! # Driver de Browser
//!
//! Contrato entre os handlers de ação e a automação do browser.
//!
//! Os handlers só conhecem o trait [`Driver`]; a implementação real é o
//! cliente W3C WebDriver em [`webdriver`], e os testes usam um mock.
//!
//! ## Primitivas
//!
//! O trait expõe operações de uma única tentativa (`find` devolve `None`
//! se o elemento não existe agora). As esperas limitadas ficam em
//! [`crate::polling`], e as operações compostas (`find_and_click`,
//! `find_text`, ...) ficam em [`crate::executors::elements`].

pub mod webdriver;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::BrowserConfig;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("falha de transporte com o driver: {0}")]
    Transport(String),

    #[error("timeout do driver: {0}")]
    Timeout(String),

    #[error("elemento não encontrado: {0}")]
    NoSuchElement(String),

    #[error("elemento não interagível: {0}")]
    NotInteractable(String),

    #[error("erro de script: {0}")]
    Script(String),

    #[error("resposta inesperada do driver: {0}")]
    Protocol(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Estratégia de localização de um seletor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    XPath(String),
    Css(String),
}

impl Locator {
    /// `//` no início indica XPath; o resto é seletor CSS.
    pub fn parse(selector: &str) -> Self {
        let selector = selector.trim();
        if selector.starts_with("//") || selector.starts_with("(//") {
            Self::XPath(selector.to_string())
        } else {
            Self::Css(selector.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::XPath(s) | Self::Css(s) => s,
        }
    }

    /// Nome da estratégia no protocolo W3C.
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::XPath(_) => "xpath",
            Self::Css(_) => "css selector",
        }
    }
}

/// Referência opaca a um elemento resolvido pelo driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

/// Capacidades de browser usadas pelos handlers.
///
/// Um driver pertence exclusivamente a uma execução de cenário; nunca é
/// acessado por dois steps ao mesmo tempo.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    async fn current_url(&self) -> DriverResult<String>;

    /// Uma tentativa: `Ok(None)` quando nada casa agora.
    async fn find(&self, locator: &Locator) -> DriverResult<Option<ElementHandle>>;

    /// Visível e habilitado.
    async fn is_clickable(&self, element: &ElementHandle) -> DriverResult<bool>;

    async fn click(&self, element: &ElementHandle) -> DriverResult<()>;

    async fn context_click(&self, element: &ElementHandle) -> DriverResult<()>;

    async fn clear(&self, element: &ElementHandle) -> DriverResult<()>;

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    /// Evento de tecla Enter nativo no elemento ativo.
    async fn press_enter(&self) -> DriverResult<()>;

    async fn text(&self, element: &ElementHandle) -> DriverResult<String>;

    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>>;

    async fn execute_script(&self, body: &str, args: Vec<Value>) -> DriverResult<Value>;

    /// PNG da viewport atual.
    async fn screenshot(&self) -> DriverResult<Vec<u8>>;

    /// Encerra a sessão; chamado uma vez ao fim da execução.
    async fn close(&self) -> DriverResult<()>;
}

/// Abre um driver novo por execução (usado pelo modo batch e pela CLI).
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self, config: &BrowserConfig) -> DriverResult<Box<dyn Driver>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_parse() {
        assert_eq!(Locator::parse("//div[1]"), Locator::XPath("//div[1]".into()));
        assert_eq!(Locator::parse(" (//a)[2] "), Locator::XPath("(//a)[2]".into()));
        assert_eq!(Locator::parse("#missing"), Locator::Css("#missing".into()));
        assert_eq!(Locator::parse("#missing").strategy(), "css selector");
    }
}
