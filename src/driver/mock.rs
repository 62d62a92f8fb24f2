//! Driver em memória para os testes do motor e dos handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Driver, DriverError, DriverResult, ElementHandle, Locator};

#[derive(Debug, Clone)]
pub struct MockElement {
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub clickable: bool,
}

impl MockElement {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            attributes: HashMap::new(),
            clickable: true,
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.clickable = false;
        self
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum NavigateBehavior {
    #[default]
    Succeed,
    TimeOut,
    Fail,
}

#[derive(Debug, Default)]
struct MockState {
    url: String,
    elements: HashMap<String, MockElement>,
    calls: Vec<String>,
    navigate: NavigateBehavior,
    failing_scripts: Vec<String>,
    press_enter_fails: bool,
    screenshot_fails: bool,
    screenshots: u32,
    typed: HashMap<String, String>,
}

/// Cada seletor registrado com [`MockDriver::with_element`] casa
/// exatamente pelo texto do seletor; o resto não existe.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(self, selector: &str, element: MockElement) -> Self {
        self.state.lock().elements.insert(selector.to_string(), element);
        self
    }

    pub fn with_url(self, url: &str) -> Self {
        self.state.lock().url = url.to_string();
        self
    }

    pub fn with_navigation_timeout(self) -> Self {
        self.state.lock().navigate = NavigateBehavior::TimeOut;
        self
    }

    pub fn with_navigation_failure(self) -> Self {
        self.state.lock().navigate = NavigateBehavior::Fail;
        self
    }

    /// Scripts contendo `fragment` lançam erro de JavaScript.
    pub fn with_failing_script(self, fragment: &str) -> Self {
        self.state.lock().failing_scripts.push(fragment.to_string());
        self
    }

    pub fn with_press_enter_failure(self) -> Self {
        self.state.lock().press_enter_fails = true;
        self
    }

    pub fn with_screenshot_failure(self) -> Self {
        self.state.lock().screenshot_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn screenshot_count(&self) -> u32 {
        self.state.lock().screenshots
    }

    pub fn typed_into(&self, selector: &str) -> Option<String> {
        self.state.lock().typed.get(selector).cloned()
    }

    pub fn url(&self) -> String {
        self.state.lock().url.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }

    fn element(&self, handle: &ElementHandle) -> DriverResult<MockElement> {
        self.state
            .lock()
            .elements
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| DriverError::NoSuchElement(handle.0.clone()))
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.record(format!("navigate:{}", url));
        let mut state = self.state.lock();
        match state.navigate {
            NavigateBehavior::Succeed => {
                state.url = url.to_string();
                Ok(())
            }
            // A página carregou parcialmente: a URL muda mesmo com timeout.
            NavigateBehavior::TimeOut => {
                state.url = url.to_string();
                Err(DriverError::Timeout(format!("page load {}", url)))
            }
            NavigateBehavior::Fail => Err(DriverError::Transport(format!("navigate {}", url))),
        }
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn find(&self, locator: &Locator) -> DriverResult<Option<ElementHandle>> {
        let state = self.state.lock();
        Ok(state
            .elements
            .contains_key(locator.as_str())
            .then(|| ElementHandle(locator.as_str().to_string())))
    }

    async fn is_clickable(&self, element: &ElementHandle) -> DriverResult<bool> {
        Ok(self.element(element)?.clickable)
    }

    async fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        self.element(element)?;
        self.record(format!("click:{}", element.0));
        Ok(())
    }

    async fn context_click(&self, element: &ElementHandle) -> DriverResult<()> {
        self.element(element)?;
        self.record(format!("context_click:{}", element.0));
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> DriverResult<()> {
        self.record(format!("clear:{}", element.0));
        self.state.lock().typed.remove(&element.0);
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        self.record(format!("send_keys:{}:{}", element.0, text));
        self.state
            .lock()
            .typed
            .entry(element.0.clone())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn press_enter(&self) -> DriverResult<()> {
        self.record("press_enter".to_string());
        if self.state.lock().press_enter_fails {
            return Err(DriverError::NotInteractable("no active element".into()));
        }
        Ok(())
    }

    async fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        Ok(self.element(element)?.text)
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        Ok(self.element(element)?.attributes.get(name).cloned())
    }

    async fn execute_script(&self, body: &str, _args: Vec<Value>) -> DriverResult<Value> {
        self.record(format!("script:{}", body));
        let fails = self
            .state
            .lock()
            .failing_scripts
            .iter()
            .any(|fragment| body.contains(fragment.as_str()));
        if fails {
            return Err(DriverError::Script(format!("script failed: {}", body)));
        }
        if body.contains("document.readyState") {
            return Ok(Value::String("complete".into()));
        }
        Ok(Value::Null)
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        let mut state = self.state.lock();
        if state.screenshot_fails {
            return Err(DriverError::Transport("screenshot unavailable".into()));
        }
        state.screenshots += 1;
        Ok(vec![0x89, b'P', b'N', b'G', state.screenshots as u8])
    }

    async fn close(&self) -> DriverResult<()> {
        self.record("close".to_string());
        Ok(())
    }
}
