//! Headless rendering capability used for map screenshots.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RenderError;

/// Browser viewport size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Opens pages in some headless browser.
#[async_trait]
pub trait MapRenderer: Send + Sync {
    /// Open `url` and wait until it has loaded, at most `load_timeout`.
    async fn open(
        &self,
        url: &str,
        viewport: Viewport,
        load_timeout: Duration,
    ) -> Result<Box<dyn RenderPage>, RenderError>;
}

/// One open page. Dropping it without [`close`](RenderPage::close) may leak
/// the browser session.
#[async_trait]
pub trait RenderPage: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError>;

    /// Evaluate a JavaScript expression and return its JSON value.
    async fn evaluate(&mut self, expression: &str) -> Result<Value, RenderError>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, RenderError>;

    async fn close(&mut self);
}
