//! Network and console event records surfaced by the driver

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Coarse resource classification, mirroring what CDP reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    Xhr,
    Fetch,
    Websocket,
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Document => "document",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Image => "image",
            ResourceType::Media => "media",
            ResourceType::Font => "font",
            ResourceType::Script => "script",
            ResourceType::Xhr => "xhr",
            ResourceType::Fetch => "fetch",
            ResourceType::Websocket => "websocket",
            ResourceType::Other => "other",
        }
    }
}

/// A response observed on a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub url: String,
    pub status: u16,
    /// Lowercased header names
    pub headers: HashMap<String, String>,
    pub body_bytes: u64,
    pub resource_type: ResourceType,
    /// Wall-clock from request start to response end
    pub elapsed_ms: f64,
    /// Response body when the driver captured it; drivers may omit bodies
    /// for large or streamed responses.
    pub body: Option<Vec<u8>>,
}

impl ResponseEvent {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }
}

/// A request leaving a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
    pub url: String,
    pub method: String,
    pub resource_type: ResourceType,
    pub body_bytes: u64,
}

/// Console message severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warning,
    Error,
    Debug,
}

/// A console message emitted by page script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEvent {
    pub level: ConsoleLevel,
    pub text: String,
}

/// A JavaScript dialog raised by the page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogEvent {
    /// alert, confirm, prompt or beforeunload
    pub kind: String,
    pub message: String,
}

/// An uncaught page error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageErrorEvent {
    pub message: String,
}

/// A request intercepted by a route handler
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub url: String,
    pub method: String,
    pub resource_type: ResourceType,
    pub headers: HashMap<String, String>,
}

/// What the route handler decided to do with a request
#[derive(Debug, Clone)]
pub enum RouteDecision {
    /// Let the request through to the network
    Continue,
    /// Refuse the request
    Abort,
    /// Answer locally without touching the network
    Fulfill {
        status: u16,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    },
}
