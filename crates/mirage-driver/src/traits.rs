//! Driver trait definitions
//!
//! Mirage consumes a headless browser through these traits; the concrete
//! control library (CDP, WebDriver BiDi, ...) lives outside the core. The
//! surface is intentionally minimal: launch, context creation with init
//! scripts and interception, page navigation and input, and event
//! subscriptions.

use crate::events::{
    ConsoleEvent, DialogEvent, PageErrorEvent, RequestEvent, ResponseEvent, RouteDecision,
    RouteRequest,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use mirage_types::DriverError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Route interception callback; must not block.
pub type RouteHandler =
    Arc<dyn Fn(RouteRequest) -> BoxFuture<'static, RouteDecision> + Send + Sync>;

/// Options for launching a browser process
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    pub args: Vec<String>,
    pub proxy: Option<String>,
}

/// Options for creating a browsing context
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub user_agent: Option<String>,
    pub viewport: Option<(u32, u32)>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    /// (latitude, longitude)
    pub geolocation: Option<(f64, f64)>,
    /// Permission names pre-granted to the context
    pub permissions: Vec<String>,
    /// "light" or "dark"
    pub color_scheme: Option<String>,
    pub extra_headers: HashMap<String, String>,
    pub proxy: Option<String>,
}

/// Entry point: launches browsers
#[async_trait]
pub trait Driver: Send + Sync {
    async fn launch(&self, options: LaunchOptions) -> Result<Arc<dyn BrowserHandle>, DriverError>;

    /// False once the underlying transport is gone; treated as fatal.
    fn is_connected(&self) -> bool;
}

/// A live browser process
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    fn id(&self) -> &str;

    async fn new_context(
        &self,
        options: ContextOptions,
    ) -> Result<Arc<dyn ContextHandle>, DriverError>;

    fn is_connected(&self) -> bool;

    async fn close(&self) -> Result<(), DriverError>;
}

/// A live browsing context (cookie/storage scope)
#[async_trait]
pub trait ContextHandle: Send + Sync {
    fn id(&self) -> &str;

    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, DriverError>;

    /// Register a script evaluated before any site script on every new
    /// document in the driver's utility world.
    async fn add_init_script(&self, script: &str) -> Result<(), DriverError>;

    /// Best-effort CDP registration of the same script into every
    /// auxiliary JS world the driver exposes. Sites may run detection in a
    /// world distinct from the utility world.
    async fn register_script_in_worlds(&self, script: &str) -> Result<(), DriverError>;

    async fn set_extra_headers(&self, headers: Vec<(String, String)>) -> Result<(), DriverError>;

    /// Install a route handler for every request leaving the context.
    async fn intercept_routes(&self, handler: RouteHandler) -> Result<(), DriverError>;

    /// Clear cookies, scoped to one origin when given.
    async fn clear_cookies(&self, origin: Option<&str>) -> Result<(), DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}

/// A live page inside a context
#[async_trait]
pub trait PageHandle: Send + Sync {
    fn id(&self) -> &str;

    async fn goto(&self, url: &str) -> Result<ResponseEvent, DriverError>;

    async fn url(&self) -> Result<String, DriverError>;

    async fn content(&self) -> Result<String, DriverError>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError>;

    async fn reload(&self) -> Result<(), DriverError>;

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), DriverError>;

    async fn scroll_by(&self, dx: f64, dy: f64) -> Result<(), DriverError>;

    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    fn subscribe_responses(&self) -> broadcast::Receiver<ResponseEvent>;

    fn subscribe_requests(&self) -> broadcast::Receiver<RequestEvent>;

    fn subscribe_console(&self) -> broadcast::Receiver<ConsoleEvent>;

    fn subscribe_dialogs(&self) -> broadcast::Receiver<DialogEvent>;

    fn subscribe_page_errors(&self) -> broadcast::Receiver<PageErrorEvent>;

    async fn close(&self) -> Result<(), DriverError>;
}
