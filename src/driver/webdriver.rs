//! # Cliente W3C WebDriver
//!
//! Implementa [`Driver`] falando o protocolo W3C WebDriver via HTTP
//! (chromedriver, geckodriver, msedgedriver ou um Selenium Grid).
//!
//! ## Exemplo:
//!
//! ```ignore
//! let config = BrowserConfig::default();
//! let driver = WebDriverClient::connect("http://localhost:9515", &config, Duration::from_secs(30)).await?;
//! driver.navigate("https://erp.example.com").await?;
//! let png = driver.screenshot().await?;
//! driver.close().await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use super::{Driver, DriverError, DriverFactory, DriverResult, ElementHandle, Locator};
use crate::protocol::{BrowserConfig, BrowserKind};

/// Chave W3C que identifica uma referência de elemento no JSON.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Código da tecla Enter no protocolo de ações.
const ENTER_KEY: &str = "\u{E007}";

/// Deslocamento horizontal da janela quando o usuário usa segunda tela.
const SECOND_SCREEN_OFFSET_X: i64 = 1920;

/// Folga do cliente HTTP além do timeout de carregamento de página.
const HTTP_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

pub struct WebDriverClient {
    http: Client,
    base_url: String,
    session_id: String,
}

impl WebDriverClient {
    /// Cria uma sessão nova com as capacidades derivadas de `config`.
    #[instrument(skip(config), fields(browser = config.browser_kind.as_str()))]
    pub async fn connect(
        base_url: &str,
        config: &BrowserConfig,
        page_load_timeout: Duration,
    ) -> DriverResult<Self> {
        let http = Client::builder()
            .timeout(page_load_timeout + HTTP_TIMEOUT_SLACK)
            .build()
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let body = json!({ "capabilities": { "alwaysMatch": capabilities(config) } });
        let value = send(&http, Method::POST, &format!("{}/session", base_url), Some(body)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol(format!("sessão sem sessionId: {}", value)))?
            .to_string();

        let client = Self {
            http,
            base_url,
            session_id,
        };

        client
            .command(
                Method::POST,
                "timeouts",
                Some(json!({ "pageLoad": page_load_timeout.as_millis() as u64 })),
            )
            .await?;

        if config.second_screen {
            client
                .command(
                    Method::POST,
                    "window/rect",
                    Some(json!({ "x": SECOND_SCREEN_OFFSET_X, "y": 0 })),
                )
                .await?;
        }
        client.command(Method::POST, "window/maximize", Some(json!({}))).await?;

        info!(session_id = %client.session_id, "Sessão WebDriver criada");
        Ok(client)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        let url = format!("{}/session/{}/{}", self.base_url, self.session_id, path);
        send(&self.http, method, &url, body).await
    }

    async fn element_command(
        &self,
        method: Method,
        element: &ElementHandle,
        suffix: &str,
        body: Option<Value>,
    ) -> DriverResult<Value> {
        let path = format!("element/{}/{}", element.0, suffix);
        self.command(method, &path, body).await
    }

    async fn element_flag(&self, element: &ElementHandle, suffix: &str) -> DriverResult<bool> {
        let value = self.element_command(Method::GET, element, suffix, None).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn perform_actions(&self, actions: Value) -> DriverResult<()> {
        self.command(Method::POST, "actions", Some(json!({ "actions": actions })))
            .await?;
        self.command(Method::DELETE, "actions", None).await?;
        Ok(())
    }
}

fn capabilities(config: &BrowserConfig) -> Value {
    match config.browser_kind {
        BrowserKind::Chrome => {
            let mut args = vec!["--start-maximized"];
            if config.incognito {
                args.push("--incognito");
            }
            json!({ "browserName": "chrome", "goog:chromeOptions": { "args": args } })
        }
        BrowserKind::Edge => {
            let mut args = vec!["--start-maximized"];
            if config.incognito {
                args.push("-inprivate");
            }
            json!({ "browserName": "MicrosoftEdge", "ms:edgeOptions": { "args": args } })
        }
        BrowserKind::Firefox => {
            let args: Vec<&str> = if config.incognito { vec!["-private"] } else { vec![] };
            json!({ "browserName": "firefox", "moz:firefoxOptions": { "args": args } })
        }
    }
}

/// Envia um comando e desembrulha o envelope `{ "value": ... }`.
async fn send(http: &Client, method: Method, url: &str, body: Option<Value>) -> DriverResult<Value> {
    debug!(%method, %url, "webdriver command");
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            DriverError::Timeout(e.to_string())
        } else {
            DriverError::Transport(e.to_string())
        }
    })?;

    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| DriverError::Protocol(format!("resposta não-JSON ({}): {}", status, e)))?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        Ok(value)
    } else {
        Err(map_protocol_error(&value))
    }
}

fn map_protocol_error(value: &Value) -> DriverError {
    let kind = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let detail = format!("{}: {}", kind, message);

    match kind {
        "no such element" | "stale element reference" => DriverError::NoSuchElement(detail),
        "timeout" | "script timeout" => DriverError::Timeout(detail),
        "javascript error" => DriverError::Script(detail),
        "element not interactable" | "element click intercepted" => {
            DriverError::NotInteractable(detail)
        }
        _ => DriverError::Protocol(detail),
    }
}

fn element_ref(element: &ElementHandle) -> Value {
    json!({ ELEMENT_KEY: element.0 })
}

#[async_trait]
impl Driver for WebDriverClient {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let value = self.command(Method::GET, "url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol(format!("url inválida: {}", value)))
    }

    async fn find(&self, locator: &Locator) -> DriverResult<Option<ElementHandle>> {
        let body = json!({ "using": locator.strategy(), "value": locator.as_str() });
        match self.command(Method::POST, "element", Some(body)).await {
            Ok(value) => value
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| Some(ElementHandle(id.to_string())))
                .ok_or_else(|| DriverError::Protocol(format!("elemento sem referência: {}", value))),
            Err(DriverError::NoSuchElement(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn is_clickable(&self, element: &ElementHandle) -> DriverResult<bool> {
        Ok(self.element_flag(element, "displayed").await?
            && self.element_flag(element, "enabled").await?)
    }

    async fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        self.element_command(Method::POST, element, "click", Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn context_click(&self, element: &ElementHandle) -> DriverResult<()> {
        self.perform_actions(json!([{
            "type": "pointer",
            "id": "mouse",
            "parameters": { "pointerType": "mouse" },
            "actions": [
                { "type": "pointerMove", "duration": 0, "origin": element_ref(element), "x": 0, "y": 0 },
                { "type": "pointerDown", "button": 2 },
                { "type": "pointerUp", "button": 2 }
            ]
        }]))
        .await
    }

    async fn clear(&self, element: &ElementHandle) -> DriverResult<()> {
        self.element_command(Method::POST, element, "clear", Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        self.element_command(Method::POST, element, "value", Some(json!({ "text": text })))
            .await
            .map(|_| ())
    }

    async fn press_enter(&self) -> DriverResult<()> {
        self.perform_actions(json!([{
            "type": "key",
            "id": "keyboard",
            "actions": [
                { "type": "keyDown", "value": ENTER_KEY },
                { "type": "keyUp", "value": ENTER_KEY }
            ]
        }]))
        .await
    }

    async fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        let value = self.element_command(Method::GET, element, "text", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        let suffix = format!("attribute/{}", urlencoding::encode(name));
        let value = self.element_command(Method::GET, element, &suffix, None).await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn execute_script(&self, body: &str, args: Vec<Value>) -> DriverResult<Value> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": body, "args": args })),
        )
        .await
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        let value = self.command(Method::GET, "screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DriverError::Protocol("screenshot sem dados".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::Protocol(format!("screenshot base64 inválido: {}", e)))
    }

    async fn close(&self) -> DriverResult<()> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        send(&self.http, Method::DELETE, &url, None).await.map(|_| ())
    }
}

/// Abre uma sessão WebDriver nova por execução de cenário.
pub struct WebDriverFactory {
    base_url: String,
    page_load_timeout: Duration,
}

impl WebDriverFactory {
    pub fn new(base_url: impl Into<String>, page_load_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            page_load_timeout,
        }
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn launch(&self, config: &BrowserConfig) -> DriverResult<Box<dyn Driver>> {
        let client = WebDriverClient::connect(&self.base_url, config, self.page_load_timeout).await?;
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_incognito_capabilities() {
        let config = BrowserConfig {
            browser_kind: BrowserKind::Chrome,
            incognito: true,
            second_screen: false,
        };
        let caps = capabilities(&config);
        assert_eq!(caps["browserName"], "chrome");
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--incognito"));
    }

    #[test]
    fn test_firefox_private_capabilities() {
        let config = BrowserConfig {
            browser_kind: BrowserKind::Firefox,
            incognito: true,
            second_screen: true,
        };
        let caps = capabilities(&config);
        assert_eq!(caps["browserName"], "firefox");
        assert_eq!(caps["moz:firefoxOptions"]["args"][0], "-private");
    }

    #[test]
    fn test_protocol_error_mapping() {
        let err = map_protocol_error(&json!({ "error": "no such element", "message": "x" }));
        assert!(matches!(err, DriverError::NoSuchElement(_)));
        let err = map_protocol_error(&json!({ "error": "timeout", "message": "page load" }));
        assert!(matches!(err, DriverError::Timeout(_)));
        let err = map_protocol_error(&json!({ "error": "javascript error", "message": "boom" }));
        assert!(matches!(err, DriverError::Script(_)));
        let err = map_protocol_error(&json!({ "error": "session not created" }));
        assert!(matches!(err, DriverError::Protocol(_)));
    }
}
