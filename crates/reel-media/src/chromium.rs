//! Chromium session driven over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, EventDomContentEventFired,
    NavigateParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    AddBindingParams, ConsoleApiCalledType, EvaluateParams, EventBindingCalled,
    EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
};
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserLauncher, BrowserSession, Viewport, BINDING_NAME, HOOKS_SCRIPT};
use crate::error::{MediaError, MediaResult};

/// Launches headless Chromium, one browser process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        viewport: Viewport,
        profile_dir: &Path,
    ) -> MediaResult<Box<dyn BrowserSession>> {
        let mut builder = BrowserConfig::builder()
            .window_size(viewport.width, viewport.height)
            .viewport(CdpViewport {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            })
            .user_data_dir(profile_dir)
            .arg("--hide-scrollbars")
            .arg("--mute-audio")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--font-render-hinting=none");
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(MediaError::browser)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(MediaError::browser)?;
        let handler_task = tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        let mut session = ChromiumSession {
            browser,
            page: None,
            ready: None,
            last_error: Arc::new(Mutex::new(None)),
            tasks: vec![handler_task],
        };
        // The session owns the browser from here on, so a failed page setup
        // still shuts the process down.
        if let Err(e) = session.attach_page().await {
            if let Err(close_err) = Box::new(session).close().await {
                warn!("Failed to close browser after setup error: {}", close_err);
            }
            return Err(e);
        }

        debug!(
            width = viewport.width,
            height = viewport.height,
            "Launched headless browser"
        );
        Ok(Box::new(session))
    }
}

struct ChromiumSession {
    browser: Browser,
    page: Option<Page>,
    ready: Option<oneshot::Receiver<()>>,
    last_error: Arc<Mutex<Option<String>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChromiumSession {
    fn page(&self) -> MediaResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| MediaError::internal("browser page is not attached"))
    }

    /// Open the blank page, wire diagnostics and install the ready/done hooks.
    async fn attach_page(&mut self) -> MediaResult<()> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(MediaError::browser)?;

        let mut console = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(MediaError::browser)?;
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = console.next().await {
                forward_console(&event.r#type, &event.args);
            }
        }));

        let mut exceptions = page
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(MediaError::browser)?;
        let last_error = Arc::clone(&self.last_error);
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = exceptions.next().await {
                let details = &event.exception_details;
                let message = details
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                warn!(
                    target: "reel_media::page",
                    line = details.line_number,
                    column = details.column_number,
                    "Uncaught page error: {}",
                    message
                );
                if let Ok(mut slot) = last_error.lock() {
                    *slot = Some(message);
                }
            }
        }));

        let mut bindings = page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(MediaError::browser)?;
        let (ready_tx, ready_rx) = oneshot::channel();
        self.ready = Some(ready_rx);
        self.tasks.push(tokio::spawn(async move {
            let mut ready_tx = Some(ready_tx);
            while let Some(event) = bindings.next().await {
                if event.name != BINDING_NAME {
                    continue;
                }
                match event.payload.as_str() {
                    "ready" => match ready_tx.take() {
                        Some(tx) => {
                            let _ = tx.send(());
                        }
                        None => debug!("Ignoring repeated ready signal"),
                    },
                    "done" => debug!("Page signalled done"),
                    other => debug!("Ignoring unknown page signal: {}", other),
                }
            }
        }));

        page.execute(AddBindingParams::new(BINDING_NAME))
            .await
            .map_err(MediaError::browser)?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(HOOKS_SCRIPT))
            .await
            .map_err(MediaError::browser)?;

        self.page = Some(page);
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open(&mut self, url: &str) -> MediaResult<()> {
        let page = self.page()?;
        let mut dom_ready = page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(MediaError::browser)?;

        let response = page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| MediaError::Navigation(format!("{}: {}", url, e)))?;
        if let Some(error_text) = &response.result.error_text {
            return Err(MediaError::Navigation(format!("{}: {}", url, error_text)));
        }

        dom_ready
            .next()
            .await
            .ok_or_else(|| MediaError::Navigation(format!("{}: page closed before DOM was ready", url)))?;
        Ok(())
    }

    async fn wait_ready(&mut self) -> MediaResult<()> {
        let ready = self
            .ready
            .as_mut()
            .ok_or_else(|| MediaError::internal("ready signal already consumed"))?;
        ready
            .await
            .map_err(|_| MediaError::browser("page closed before signalling ready"))?;
        self.ready = None;
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> MediaResult<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(MediaError::Script)?;
        let result = self
            .page()?
            .evaluate_expression(params)
            .await
            .map_err(|e| MediaError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn capture_png(&mut self) -> MediaResult<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page()?
            .screenshot(params)
            .await
            .map_err(MediaError::browser)
    }

    fn last_page_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }

    async fn close(mut self: Box<Self>) -> MediaResult<()> {
        let mut first_error = None;

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                first_error.get_or_insert(MediaError::browser(e));
            }
        }
        if let Err(e) = self.browser.close().await {
            first_error.get_or_insert(MediaError::browser(e));
        }
        if let Err(e) = self.browser.wait().await {
            first_error.get_or_insert(MediaError::Io(e));
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Log a console call under the page target at a matching level.
fn forward_console(kind: &ConsoleApiCalledType, args: &[RemoteObject]) {
    let text = args
        .iter()
        .map(|arg| match (&arg.value, &arg.description) {
            (Some(serde_json::Value::String(s)), _) => s.clone(),
            (Some(value), _) => value.to_string(),
            (None, Some(description)) => description.clone(),
            (None, None) => String::new(),
        })
        .collect::<Vec<_>>()
        .join(" ");

    match kind {
        ConsoleApiCalledType::Error | ConsoleApiCalledType::Assert => {
            error!(target: "reel_media::page", "{}", text)
        }
        ConsoleApiCalledType::Warning => warn!(target: "reel_media::page", "{}", text),
        ConsoleApiCalledType::Debug | ConsoleApiCalledType::Trace => {
            debug!(target: "reel_media::page", "{}", text)
        }
        _ => info!(target: "reel_media::page", "{}", text),
    }
}
