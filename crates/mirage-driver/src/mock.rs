//! In-memory mock driver
//!
//! A deterministic driver implementation for tests: responses are
//! scripted per URL fragment, evaluate results per script marker, and
//! synthetic network/console events can be pushed into any page's
//! subscription channels. No real browser is involved.

use crate::events::{
    ConsoleEvent, DialogEvent, PageErrorEvent, RequestEvent, ResourceType, ResponseEvent,
    RouteDecision, RouteRequest,
};
use crate::traits::{
    BrowserHandle, ContextHandle, ContextOptions, Driver, LaunchOptions, PageHandle, RouteHandler,
};
use async_trait::async_trait;
use mirage_types::DriverError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// A scripted response for the mock network
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub resource_type: ResourceType,
    pub elapsed_ms: f64,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HashMap::from([("content-type".to_string(), "text/html".to_string())]),
            body: "<html><body>ok</body></html>".to_string(),
            resource_type: ResourceType::Document,
            elapsed_ms: 20.0,
        }
    }
}

impl MockResponse {
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

struct PageState {
    context_id: String,
    current_url: String,
    responses_tx: broadcast::Sender<ResponseEvent>,
    requests_tx: broadcast::Sender<RequestEvent>,
    console_tx: broadcast::Sender<ConsoleEvent>,
    dialogs_tx: broadcast::Sender<DialogEvent>,
    page_errors_tx: broadcast::Sender<PageErrorEvent>,
    closed: bool,
}

#[derive(Default)]
struct MockState {
    scripted: Vec<(String, MockResponse)>,
    eval_results: Vec<(String, serde_json::Value)>,
    init_scripts: HashMap<String, Vec<String>>,
    world_scripts: HashMap<String, Vec<String>>,
    extra_headers: HashMap<String, Vec<(String, String)>>,
    route_handlers: HashMap<String, RouteHandler>,
    pages: HashMap<String, PageState>,
    cookie_clears: Vec<(String, Option<String>)>,
    evaluated: Vec<String>,
    interactions: u64,
    closed_contexts: Vec<String>,
    closed_browsers: Vec<String>,
}

/// Shared mock driver; clone-cheap via `Arc` internals.
#[derive(Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
    connected: Arc<AtomicBool>,
    id_counter: Arc<AtomicU64>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            connected: Arc::new(AtomicBool::new(true)),
            id_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.id_counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Script the response for any URL containing `url_part`.
    pub fn script_response(&self, url_part: &str, response: MockResponse) {
        let mut state = self.state.lock().unwrap();
        state.scripted.push((url_part.to_string(), response));
    }

    /// Script an `evaluate` result for scripts containing `marker`.
    pub fn script_eval(&self, marker: &str, value: serde_json::Value) {
        let mut state = self.state.lock().unwrap();
        state.eval_results.push((marker.to_string(), value));
    }

    /// Simulate the driver transport dying.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Push a synthetic response event into a page's subscription stream.
    pub fn emit_response(&self, page_id: &str, event: ResponseEvent) {
        let state = self.state.lock().unwrap();
        if let Some(page) = state.pages.get(page_id) {
            let _ = page.responses_tx.send(event);
        }
    }

    /// Push a synthetic console event into a page's subscription stream.
    pub fn emit_console(&self, page_id: &str, event: ConsoleEvent) {
        let state = self.state.lock().unwrap();
        if let Some(page) = state.pages.get(page_id) {
            let _ = page.console_tx.send(event);
        }
    }

    /// Push a synthetic dialog into a page's subscription stream.
    pub fn emit_dialog(&self, page_id: &str, event: DialogEvent) {
        let state = self.state.lock().unwrap();
        if let Some(page) = state.pages.get(page_id) {
            let _ = page.dialogs_tx.send(event);
        }
    }

    /// Push a synthetic page error into a page's subscription stream.
    pub fn emit_page_error(&self, page_id: &str, event: PageErrorEvent) {
        let state = self.state.lock().unwrap();
        if let Some(page) = state.pages.get(page_id) {
            let _ = page.page_errors_tx.send(event);
        }
    }

    /// Run a context's route handler against a synthetic request,
    /// emitting request events to pages of the context.
    pub async fn simulate_request(
        &self,
        context_id: &str,
        url: &str,
        resource_type: ResourceType,
        body_bytes: u64,
    ) -> RouteDecision {
        let handler = {
            let state = self.state.lock().unwrap();
            state.route_handlers.get(context_id).cloned()
        };
        let decision = match handler {
            Some(handler) => {
                handler(RouteRequest {
                    url: url.to_string(),
                    method: "GET".to_string(),
                    resource_type,
                    headers: HashMap::new(),
                })
                .await
            }
            None => RouteDecision::Continue,
        };
        let state = self.state.lock().unwrap();
        for page in state.pages.values().filter(|p| p.context_id == context_id) {
            let _ = page.requests_tx.send(RequestEvent {
                url: url.to_string(),
                method: "GET".to_string(),
                resource_type,
                body_bytes,
            });
        }
        decision
    }

    // --- assertion helpers ---

    pub fn init_scripts_for(&self, context_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .init_scripts
            .get(context_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn world_scripts_for(&self, context_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .world_scripts
            .get(context_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn extra_headers_for(&self, context_id: &str) -> Vec<(String, String)> {
        self.state
            .lock()
            .unwrap()
            .extra_headers
            .get(context_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn cookie_clears(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().unwrap().cookie_clears.clone()
    }

    pub fn evaluated_scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().evaluated.clone()
    }

    pub fn interaction_count(&self) -> u64 {
        self.state.lock().unwrap().interactions
    }

    pub fn closed_contexts(&self) -> Vec<String> {
        self.state.lock().unwrap().closed_contexts.clone()
    }

    fn lookup_response(&self, url: &str) -> MockResponse {
        let state = self.state.lock().unwrap();
        state
            .scripted
            .iter()
            .rev()
            .find(|(part, _)| url.contains(part.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn launch(&self, _options: LaunchOptions) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DriverError::Disconnected);
        }
        Ok(Arc::new(MockBrowser {
            id: self.next_id("browser"),
            driver: self.clone(),
        }))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub struct MockBrowser {
    id: String,
    driver: MockDriver,
}

#[async_trait]
impl BrowserHandle for MockBrowser {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_context(
        &self,
        _options: ContextOptions,
    ) -> Result<Arc<dyn ContextHandle>, DriverError> {
        if !self.driver.is_connected() {
            return Err(DriverError::Disconnected);
        }
        Ok(Arc::new(MockContext {
            id: self.driver.next_id("context"),
            driver: self.driver.clone(),
        }))
    }

    fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut state = self.driver.state.lock().unwrap();
        state.closed_browsers.push(self.id.clone());
        Ok(())
    }
}

pub struct MockContext {
    id: String,
    driver: MockDriver,
}

#[async_trait]
impl ContextHandle for MockContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, DriverError> {
        let page_id = self.driver.next_id("page");
        let (responses_tx, _) = broadcast::channel(256);
        let (requests_tx, _) = broadcast::channel(256);
        let (console_tx, _) = broadcast::channel(256);
        let (dialogs_tx, _) = broadcast::channel(64);
        let (page_errors_tx, _) = broadcast::channel(64);
        let mut state = self.driver.state.lock().unwrap();
        state.pages.insert(
            page_id.clone(),
            PageState {
                context_id: self.id.clone(),
                current_url: "about:blank".to_string(),
                responses_tx,
                requests_tx,
                console_tx,
                dialogs_tx,
                page_errors_tx,
                closed: false,
            },
        );
        Ok(Arc::new(MockPage {
            id: page_id,
            driver: self.driver.clone(),
        }))
    }

    async fn add_init_script(&self, script: &str) -> Result<(), DriverError> {
        let mut state = self.driver.state.lock().unwrap();
        state
            .init_scripts
            .entry(self.id.clone())
            .or_default()
            .push(script.to_string());
        Ok(())
    }

    async fn register_script_in_worlds(&self, script: &str) -> Result<(), DriverError> {
        let mut state = self.driver.state.lock().unwrap();
        state
            .world_scripts
            .entry(self.id.clone())
            .or_default()
            .push(script.to_string());
        Ok(())
    }

    async fn set_extra_headers(&self, headers: Vec<(String, String)>) -> Result<(), DriverError> {
        let mut state = self.driver.state.lock().unwrap();
        state.extra_headers.insert(self.id.clone(), headers);
        Ok(())
    }

    async fn intercept_routes(&self, handler: RouteHandler) -> Result<(), DriverError> {
        let mut state = self.driver.state.lock().unwrap();
        state.route_handlers.insert(self.id.clone(), handler);
        Ok(())
    }

    async fn clear_cookies(&self, origin: Option<&str>) -> Result<(), DriverError> {
        let mut state = self.driver.state.lock().unwrap();
        state
            .cookie_clears
            .push((self.id.clone(), origin.map(|s| s.to_string())));
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut state = self.driver.state.lock().unwrap();
        state.closed_contexts.push(self.id.clone());
        state.pages.retain(|_, p| p.context_id != self.id);
        Ok(())
    }
}

pub struct MockPage {
    id: String,
    driver: MockDriver,
}

impl MockPage {
    fn with_page<T>(&self, f: impl FnOnce(&mut PageState) -> T) -> Result<T, DriverError> {
        let mut state = self.driver.state.lock().unwrap();
        let page = state
            .pages
            .get_mut(&self.id)
            .ok_or_else(|| DriverError::PageOperation("page gone".into()))?;
        if page.closed {
            return Err(DriverError::PageOperation("page closed".into()));
        }
        Ok(f(page))
    }
}

#[async_trait]
impl PageHandle for MockPage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn goto(&self, url: &str) -> Result<ResponseEvent, DriverError> {
        if !self.driver.is_connected() {
            return Err(DriverError::Disconnected);
        }
        let context_id = self.with_page(|p| p.context_id.clone())?;
        let handler = {
            let state = self.driver.state.lock().unwrap();
            state.route_handlers.get(&context_id).cloned()
        };

        let scripted = self.driver.lookup_response(url);
        let response = match handler {
            Some(handler) => {
                let decision = handler(RouteRequest {
                    url: url.to_string(),
                    method: "GET".to_string(),
                    resource_type: ResourceType::Document,
                    headers: HashMap::new(),
                })
                .await;
                match decision {
                    RouteDecision::Abort => {
                        return Err(DriverError::PageOperation(format!("aborted: {url}")))
                    }
                    RouteDecision::Fulfill {
                        status,
                        headers,
                        body,
                    } => ResponseEvent {
                        url: url.to_string(),
                        status,
                        headers,
                        body_bytes: body.len() as u64,
                        resource_type: ResourceType::Document,
                        elapsed_ms: 1.0,
                        body: Some(body),
                    },
                    RouteDecision::Continue => ResponseEvent {
                        url: url.to_string(),
                        status: scripted.status,
                        headers: scripted.headers.clone(),
                        body_bytes: scripted.body.len() as u64,
                        resource_type: scripted.resource_type,
                        elapsed_ms: scripted.elapsed_ms,
                        body: Some(scripted.body.clone().into_bytes()),
                    },
                }
            }
            None => ResponseEvent {
                url: url.to_string(),
                status: scripted.status,
                headers: scripted.headers.clone(),
                body_bytes: scripted.body.len() as u64,
                resource_type: scripted.resource_type,
                elapsed_ms: scripted.elapsed_ms,
                body: Some(scripted.body.clone().into_bytes()),
            },
        };

        self.with_page(|p| {
            p.current_url = url.to_string();
            let _ = p.responses_tx.send(response.clone());
        })?;
        Ok(response)
    }

    async fn url(&self) -> Result<String, DriverError> {
        self.with_page(|p| p.current_url.clone())
    }

    async fn content(&self) -> Result<String, DriverError> {
        let url = self.with_page(|p| p.current_url.clone())?;
        Ok(self.driver.lookup_response(&url).body)
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError> {
        self.with_page(|_| ())?;
        let mut state = self.driver.state.lock().unwrap();
        state.evaluated.push(script.to_string());
        let value = state
            .eval_results
            .iter()
            .rev()
            .find(|(marker, _)| script.contains(marker.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or(serde_json::Value::Null);
        Ok(value)
    }

    async fn reload(&self) -> Result<(), DriverError> {
        let url = self.with_page(|p| p.current_url.clone())?;
        self.goto(&url).await.map(|_| ())
    }

    async fn mouse_move(&self, _x: f64, _y: f64) -> Result<(), DriverError> {
        self.driver.state.lock().unwrap().interactions += 1;
        Ok(())
    }

    async fn scroll_by(&self, _dx: f64, _dy: f64) -> Result<(), DriverError> {
        self.driver.state.lock().unwrap().interactions += 1;
        Ok(())
    }

    async fn click(&self, _selector: &str) -> Result<(), DriverError> {
        self.driver.state.lock().unwrap().interactions += 1;
        Ok(())
    }

    fn subscribe_responses(&self) -> broadcast::Receiver<ResponseEvent> {
        let state = self.driver.state.lock().unwrap();
        state.pages[&self.id].responses_tx.subscribe()
    }

    fn subscribe_requests(&self) -> broadcast::Receiver<RequestEvent> {
        let state = self.driver.state.lock().unwrap();
        state.pages[&self.id].requests_tx.subscribe()
    }

    fn subscribe_console(&self) -> broadcast::Receiver<ConsoleEvent> {
        let state = self.driver.state.lock().unwrap();
        state.pages[&self.id].console_tx.subscribe()
    }

    fn subscribe_dialogs(&self) -> broadcast::Receiver<DialogEvent> {
        let state = self.driver.state.lock().unwrap();
        state.pages[&self.id].dialogs_tx.subscribe()
    }

    fn subscribe_page_errors(&self) -> broadcast::Receiver<PageErrorEvent> {
        let state = self.driver.state.lock().unwrap();
        state.pages[&self.id].page_errors_tx.subscribe()
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.with_page(|p| p.closed = true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_are_served_by_fragment() {
        let driver = MockDriver::new();
        driver.script_response(
            "example.com",
            MockResponse::default().with_status(429).with_body("slow down"),
        );

        let browser = driver.launch(LaunchOptions::default()).await.unwrap();
        let context = browser.new_context(ContextOptions::default()).await.unwrap();
        let page = context.new_page().await.unwrap();

        let response = page.goto("https://example.com/tickets").await.unwrap();
        assert_eq!(response.status, 429);
        assert_eq!(page.content().await.unwrap(), "slow down");
    }

    #[tokio::test]
    async fn route_handler_can_fulfill_and_abort() {
        let driver = MockDriver::new();
        let browser = driver.launch(LaunchOptions::default()).await.unwrap();
        let context = browser.new_context(ContextOptions::default()).await.unwrap();

        context
            .intercept_routes(Arc::new(|request: RouteRequest| {
                Box::pin(async move {
                    if request.url.contains("blocked") {
                        RouteDecision::Abort
                    } else {
                        RouteDecision::Fulfill {
                            status: 204,
                            headers: HashMap::new(),
                            body: Vec::new(),
                        }
                    }
                })
            }))
            .await
            .unwrap();

        let page = context.new_page().await.unwrap();
        assert!(page.goto("https://x.test/blocked.png").await.is_err());
        let ok = page.goto("https://x.test/fine").await.unwrap();
        assert_eq!(ok.status, 204);
    }

    #[tokio::test]
    async fn synthetic_events_reach_subscribers() {
        let driver = MockDriver::new();
        let browser = driver.launch(LaunchOptions::default()).await.unwrap();
        let context = browser.new_context(ContextOptions::default()).await.unwrap();
        let page = context.new_page().await.unwrap();

        let mut responses = page.subscribe_responses();
        driver.emit_response(
            page.id(),
            ResponseEvent {
                url: "https://x.test/".into(),
                status: 403,
                headers: HashMap::new(),
                body_bytes: 0,
                resource_type: ResourceType::Document,
                elapsed_ms: 5.0,
                body: None,
            },
        );
        let event = responses.recv().await.unwrap();
        assert_eq!(event.status, 403);
    }

    #[tokio::test]
    async fn disconnect_fails_future_launches() {
        let driver = MockDriver::new();
        driver.disconnect();
        assert!(driver.launch(LaunchOptions::default()).await.is_err());
    }
}
