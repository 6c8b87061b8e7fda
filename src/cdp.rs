//! Chrome DevTools Protocol backend

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::point::Point;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions};
use log::debug;

use crate::dom::{self, ActionTarget, DocumentSize, ElementState};
use crate::{Engine, EngineConfig, Error, Locator, Result, Viewport};

/// CDP-based engine (uses the `headless_chrome` crate)
///
/// Each instance launches its own Chrome process with a single tab, so two
/// engines never share cookies, storage or pointer state.
pub struct CdpEngine {
    browser: Browser,
    tab: Arc<Tab>,
    config: EngineConfig,
}

impl CdpEngine {
    /// Evaluate one of the `dom` scripts and return the JSON string it produced
    fn eval_json(&self, script: &str) -> Result<String> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| Error::ScriptError(format!("Evaluation failed: {}", e)))?;

        match result.value {
            Some(serde_json::Value::String(json)) => Ok(json),
            Some(other) => Err(Error::ScriptError(format!("Unexpected script result: {}", other))),
            None => Err(Error::ScriptError("No value returned from evaluation".into())),
        }
    }

    fn document_size(&self) -> Result<DocumentSize> {
        dom::parse_result(&self.eval_json(dom::DOCUMENT_SIZE_SCRIPT)?)
    }
}

impl Engine for CdpEngine {
    fn new(config: EngineConfig) -> Result<Self>
    where
        Self: Sized,
    {
        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(config.sandbox)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .path(config.browser_path.clone())
            .idle_browser_timeout(Duration::from_millis(config.idle_timeout_ms))
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_millis(config.timeout_ms));

        let mut engine = Self { browser, tab, config };
        engine.set_viewport(engine.config.viewport)?;
        Ok(engine)
    }

    fn load_url(&mut self, url: &str) -> Result<()> {
        debug!("navigating to {}", url);
        self.tab
            .navigate_to(url)
            .map_err(|e| Error::NavigationError(format!("Navigation to {} failed: {}", url, e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::NavigationError(format!("Wait for navigation failed: {}", e)))?;

        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.tab
            .set_bounds(Bounds::Normal {
                left: Some(0),
                top: Some(0),
                width: Some(f64::from(viewport.width)),
                height: Some(f64::from(viewport.height)),
            })
            .map_err(|e| Error::CdpError(format!("Failed to resize viewport to {}: {}", viewport, e)))?;
        self.config.viewport = viewport;
        Ok(())
    }

    fn query(&mut self, locator: &Locator) -> Result<ElementState> {
        let script = dom::query_script(locator)?;
        dom::parse_result(&self.eval_json(&script)?)
    }

    fn computed_style(&mut self, locator: &Locator, property: &str) -> Result<Option<String>> {
        let script = dom::style_script(locator, property)?;
        dom::parse_style(&self.eval_json(&script)?)
    }

    fn action_target(&mut self, locator: &Locator, check_enabled: bool) -> Result<ActionTarget> {
        let script = dom::target_script(locator, check_enabled)?;
        dom::parse_result(&self.eval_json(&script)?)
    }

    fn click_at(&mut self, x: f64, y: f64) -> Result<()> {
        self.tab
            .click_point(Point { x, y })
            .map_err(|e| Error::InteractionError(format!("Click at ({}, {}) failed: {}", x, y, e)))?;
        Ok(())
    }

    fn hover_at(&mut self, x: f64, y: f64) -> Result<()> {
        self.tab
            .move_mouse_to_point(Point { x, y })
            .map_err(|e| Error::InteractionError(format!("Hover at ({}, {}) failed: {}", x, y, e)))?;
        Ok(())
    }

    fn render_png(&mut self, full_page: bool) -> Result<Vec<u8>> {
        if !full_page {
            return self
                .tab
                .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|e| Error::RenderError(format!("Screenshot failed: {}", e)));
        }

        let size = self.document_size()?;
        let data = self
            .tab
            .call_method(Page::CaptureScreenshot {
                format: Some(Page::CaptureScreenshotFormatOption::Png),
                quality: None,
                clip: Some(Page::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: size.width.max(1.0),
                    height: size.height.max(1.0),
                    scale: 1.0,
                }),
                from_surface: Some(true),
                capture_beyond_viewport: Some(true),
                optimize_for_speed: None,
            })
            .map_err(|e| Error::RenderError(format!("Full-page screenshot failed: {}", e)))?
            .data;

        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| Error::RenderError(format!("Screenshot was not valid base64: {}", e)))
    }

    fn close(self) -> Result<()> {
        let closed = self.tab.close(false);
        // Dropping the browser terminates the Chrome process.
        drop(self.browser);
        closed.map_err(|e| Error::CdpError(format!("Failed to close tab: {}", e)))?;
        Ok(())
    }
}
