//! Browser session abstraction used by the recorder.

use async_trait::async_trait;
use std::path::Path;

use crate::error::MediaResult;

/// Name of the page binding carrying ready/done signals to the host.
pub const BINDING_NAME: &str = "__reelBinding";

/// Installed before any page script runs. Templates call `window.reelReady()`
/// once content and fonts are settled; `window.reelDone()` is accepted but unused.
pub const HOOKS_SCRIPT: &str = r#"(() => {
  const send = (signal) => {
    if (typeof window.__reelBinding === 'function') {
      window.__reelBinding(signal);
    }
  };
  window.reelReady = () => send('ready');
  window.reelDone = () => send('done');
})();"#;

/// Resolves once the document's fonts have finished loading.
pub const FONTS_READY_SCRIPT: &str =
    "document.fonts ? document.fonts.ready.then(() => document.fonts.status) : 'unsupported'";

/// Browser viewport in CSS pixels (device scale factor 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Starts isolated browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a fresh browser with its own profile directory and one blank page.
    async fn launch(
        &self,
        viewport: Viewport,
        profile_dir: &Path,
    ) -> MediaResult<Box<dyn BrowserSession>>;
}

/// One browser with a single page under recording.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and return once the DOM is available.
    async fn open(&mut self, url: &str) -> MediaResult<()>;

    /// Resolve when the page calls its ready hook.
    async fn wait_ready(&mut self) -> MediaResult<()>;

    /// Evaluate an expression, awaiting promises, and return its JSON value.
    async fn evaluate(&mut self, expression: &str) -> MediaResult<serde_json::Value>;

    /// Lossless capture of the current viewport.
    async fn capture_png(&mut self) -> MediaResult<Vec<u8>>;

    /// Most recent uncaught page error, if any.
    fn last_page_error(&self) -> Option<String>;

    /// Close the page and shut the browser down.
    async fn close(self: Box<Self>) -> MediaResult<()>;
}
