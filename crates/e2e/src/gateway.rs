//! Boundary between the orchestration layer and the browser driver
//!
//! [`BrowserDriver`] is the capability the suite needs from an automation
//! backend. [`UiGateway`] is its only caller: it resolves locators, performs
//! the action and classifies every driver failure into a [`FailureKind`], so
//! retry and wait policy never see driver-specific errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use tracing::{debug, trace};

use ezyscribe_common::{ActionFailure, ActionResult, FailureKind};

/// W3C WebDriver element reference key
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Key sequence for the Enter key
pub const ENTER_KEY: &str = "\u{E007}";

/// W3C WebDriver error codes the suite distinguishes
pub mod codes {
    pub const NO_SUCH_ELEMENT: &str = "no such element";
    pub const STALE_ELEMENT: &str = "stale element reference";
    pub const NOT_INTERACTABLE: &str = "element not interactable";
    pub const CLICK_INTERCEPTED: &str = "element click intercepted";
    pub const INVALID_ELEMENT_STATE: &str = "invalid element state";
    pub const TIMEOUT: &str = "timeout";
    pub const SCRIPT_TIMEOUT: &str = "script timeout";
    pub const INVALID_SESSION: &str = "invalid session id";
    pub const SESSION_NOT_CREATED: &str = "session not created";
    pub const NO_SUCH_WINDOW: &str = "no such window";
    pub const NO_SUCH_ALERT: &str = "no such alert";
    pub const INVALID_SELECTOR: &str = "invalid selector";
    pub const INVALID_ARGUMENT: &str = "invalid argument";
    pub const JAVASCRIPT_ERROR: &str = "javascript error";
    pub const UNKNOWN_ERROR: &str = "unknown error";
    /// Not a W3C code: the HTTP transport to the driver failed
    pub const TRANSPORT: &str = "transport error";
}

/// How to find an element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "using", content = "value", rename_all = "snake_case")]
pub enum Locator {
    Css(String),
    XPath(String),
    TagName(String),
    /// `name` attribute
    Name(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Locator::TagName(name.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Locator::Name(name.into())
    }

    /// W3C `using` strategy and value
    pub fn strategy(&self) -> (&'static str, String) {
        match self {
            Locator::Css(s) => ("css selector", s.clone()),
            Locator::XPath(s) => ("xpath", s.clone()),
            Locator::TagName(s) => ("tag name", s.clone()),
            Locator::Name(s) => ("css selector", format!("[name=\"{}\"]", s)),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css={}", s),
            Locator::XPath(s) => write!(f, "xpath={}", s),
            Locator::TagName(s) => write!(f, "tag={}", s),
            Locator::Name(s) => write!(f, "name={}", s),
        }
    }
}

/// Opaque driver-side element id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// JSON form for passing the element to a script
    pub fn to_script_arg(&self) -> Value {
        json!({ ELEMENT_KEY: self.0 })
    }
}

/// A failure reported by the driver, identified by its W3C error code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct DriverError {
    pub code: String,
    pub message: String,
}

impl DriverError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Capabilities required from a browser automation backend
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    async fn refresh(&self) -> DriverResult<()>;

    async fn current_url(&self) -> DriverResult<String>;

    async fn find_element(&self, locator: &Locator) -> DriverResult<ElementHandle>;

    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementHandle>>;

    /// Find a descendant of `parent`
    async fn find_child(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> DriverResult<ElementHandle>;

    async fn click(&self, element: &ElementHandle) -> DriverResult<()>;

    async fn clear(&self, element: &ElementHandle) -> DriverResult<()>;

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    async fn text(&self, element: &ElementHandle) -> DriverResult<String>;

    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>>;

    async fn is_displayed(&self, element: &ElementHandle) -> DriverResult<bool>;

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> DriverResult<Value>;

    async fn delete_all_cookies(&self) -> DriverResult<()>;

    async fn quit(&self) -> DriverResult<()>;
}

/// Map a driver failure to the suite taxonomy
pub fn classify(error: &DriverError) -> FailureKind {
    match error.code.as_str() {
        codes::STALE_ELEMENT => FailureKind::StaleReference,
        codes::NOT_INTERACTABLE | codes::CLICK_INTERCEPTED | codes::INVALID_ELEMENT_STATE => {
            FailureKind::NotInteractable
        }
        codes::NO_SUCH_ELEMENT | codes::NO_SUCH_ALERT => FailureKind::NotFound,
        codes::TIMEOUT | codes::SCRIPT_TIMEOUT => FailureKind::Timeout,
        codes::INVALID_SESSION
        | codes::SESSION_NOT_CREATED
        | codes::NO_SUCH_WINDOW
        | codes::TRANSPORT => FailureKind::SessionLost,
        codes::INVALID_SELECTOR | codes::INVALID_ARGUMENT | codes::JAVASCRIPT_ERROR => {
            FailureKind::InvalidInput
        }
        codes::UNKNOWN_ERROR if is_disconnect(&error.message) => FailureKind::SessionLost,
        _ => FailureKind::Unknown,
    }
}

fn is_disconnect(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("disconnected") || message.contains("not reachable")
}

/// Capability-typed UI actions over an exclusively owned driver
pub struct UiGateway {
    driver: Box<dyn BrowserDriver>,
    base_url: String,
}

impl UiGateway {
    pub fn new(driver: Box<dyn BrowserDriver>, base_url: impl Into<String>) -> Self {
        Self {
            driver,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn lift<T>(
        &self,
        action: &str,
        target: &dyn fmt::Display,
        result: DriverResult<T>,
    ) -> ActionResult<T> {
        result.map_err(|e| {
            let kind = classify(&e);
            trace!(action, %target, code = %e.code, %kind, "Driver failure classified");
            ActionFailure::new(kind, format!("{} {}", action, target)).with_cause(e.to_string())
        })
    }

    async fn find(&self, locator: &Locator) -> ActionResult<ElementHandle> {
        let found = self.driver.find_element(locator).await;
        self.lift("find", locator, found)
    }

    /// Open a path relative to the base URL, or an absolute URL
    pub async fn navigate(&self, path: &str) -> ActionResult<()> {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };
        debug!(%url, "navigate");
        let result = self.driver.navigate(&url).await;
        self.lift("navigate", &url, result)
    }

    pub async fn refresh(&self) -> ActionResult<()> {
        debug!("refresh");
        let result = self.driver.refresh().await;
        self.lift("refresh", &"page", result)
    }

    pub async fn current_url(&self) -> ActionResult<String> {
        let result = self.driver.current_url().await;
        self.lift("read url", &"page", result)
    }

    pub async fn click(&self, locator: &Locator) -> ActionResult<()> {
        debug!(%locator, "click");
        let element = self.find(locator).await?;
        let result = self.driver.click(&element).await;
        self.lift("click", locator, result)
    }

    /// Click through a script, bypassing overlays that intercept pointer events
    pub async fn js_click(&self, locator: &Locator) -> ActionResult<()> {
        debug!(%locator, "js click");
        let element = self.find(locator).await?;
        let result = self
            .driver
            .execute_script("arguments[0].click();", vec![element.to_script_arg()])
            .await
            .map(|_| ());
        self.lift("js click", locator, result)
    }

    /// Click the first displayed match
    pub async fn click_first_visible(&self, locator: &Locator) -> ActionResult<()> {
        debug!(%locator, "click first visible");
        let found = self.driver.find_elements(locator).await;
        let elements = self.lift("find all", locator, found)?;
        for element in elements {
            let displayed = self.driver.is_displayed(&element).await;
            if self.lift("check visibility", locator, displayed)? {
                let result = self
                    .driver
                    .execute_script("arguments[0].click();", vec![element.to_script_arg()])
                    .await
                    .map(|_| ());
                return self.lift("js click", locator, result);
            }
        }
        Err(ActionFailure::not_yet_rendered(format!("no visible {}", locator)))
    }

    pub async fn type_text(&self, locator: &Locator, text: &str) -> ActionResult<()> {
        debug!(%locator, chars = text.len(), "type");
        let element = self.find(locator).await?;
        let result = self.driver.send_keys(&element, text).await;
        self.lift("type into", locator, result)
    }

    /// Clear an input both natively and through its value property
    pub async fn clear(&self, locator: &Locator) -> ActionResult<()> {
        debug!(%locator, "clear");
        let element = self.find(locator).await?;
        let cleared = self.driver.clear(&element).await;
        self.lift("clear", locator, cleared)?;
        let result = self
            .driver
            .execute_script("arguments[0].value = '';", vec![element.to_script_arg()])
            .await
            .map(|_| ());
        self.lift("clear value of", locator, result)
    }

    pub async fn press_enter(&self, locator: &Locator) -> ActionResult<()> {
        self.type_text(locator, ENTER_KEY).await
    }

    /// Visible text, trimmed
    pub async fn read_text(&self, locator: &Locator) -> ActionResult<String> {
        let element = self.find(locator).await?;
        let text = self.driver.text(&element).await;
        self.lift("read text of", locator, text).map(|t| t.trim().to_string())
    }

    /// Trimmed text of every match, in document order
    pub async fn read_all(&self, locator: &Locator) -> ActionResult<Vec<String>> {
        let found = self.driver.find_elements(locator).await;
        let elements = self.lift("find all", locator, found)?;
        let mut texts = Vec::with_capacity(elements.len());
        for element in &elements {
            let text = self.driver.text(element).await;
            texts.push(self.lift("read text of", locator, text)?.trim().to_string());
        }
        Ok(texts)
    }

    /// Text of `child` inside each `parent` match; parents without the child are
    /// skipped
    pub async fn read_child_texts(
        &self,
        parent: &Locator,
        child: &Locator,
    ) -> ActionResult<Vec<String>> {
        let found = self.driver.find_elements(parent).await;
        let parents = self.lift("find all", parent, found)?;
        let mut texts = Vec::with_capacity(parents.len());
        for element in &parents {
            let found = self.driver.find_child(element, child).await;
            let child_element = match self.lift("find child", child, found) {
                Ok(child_element) => child_element,
                Err(failure) if failure.kind == FailureKind::NotFound => continue,
                Err(failure) => return Err(failure),
            };
            let text = self.driver.text(&child_element).await;
            texts.push(self.lift("read text of", child, text)?.trim().to_string());
        }
        Ok(texts)
    }

    /// Text of a descendant of the first `parent` match
    pub async fn read_child_text(&self, parent: &Locator, child: &Locator) -> ActionResult<String> {
        let element = self.find(parent).await?;
        let found = self.driver.find_child(&element, child).await;
        let child_element = self.lift("find child", child, found)?;
        let text = self.driver.text(&child_element).await;
        self.lift("read text of", child, text).map(|t| t.trim().to_string())
    }

    pub async fn read_attribute(
        &self,
        locator: &Locator,
        name: &str,
    ) -> ActionResult<Option<String>> {
        let element = self.find(locator).await?;
        let value = self.driver.attribute(&element, name).await;
        self.lift("read attribute of", locator, value)
    }

    pub async fn scroll_into_view(&self, locator: &Locator) -> ActionResult<()> {
        debug!(%locator, "scroll into view");
        let element = self.find(locator).await?;
        let result = self
            .driver
            .execute_script("arguments[0].scrollIntoView(true);", vec![element.to_script_arg()])
            .await
            .map(|_| ());
        self.lift("scroll to", locator, result)
    }

    /// Number of matches; zero is not a failure
    pub async fn count(&self, locator: &Locator) -> ActionResult<usize> {
        let found = self.driver.find_elements(locator).await;
        self.lift("count", locator, found).map(|elements| elements.len())
    }

    pub async fn is_present(&self, locator: &Locator) -> ActionResult<bool> {
        Ok(self.count(locator).await? > 0)
    }

    /// Whether the first match is displayed; absent counts as not visible
    pub async fn is_visible(&self, locator: &Locator) -> ActionResult<bool> {
        let found = self.driver.find_elements(locator).await;
        let elements = self.lift("find all", locator, found)?;
        match elements.first() {
            Some(element) => {
                let displayed = self.driver.is_displayed(element).await;
                self.lift("check visibility", locator, displayed)
            }
            None => Ok(false),
        }
    }

    pub async fn execute_script(&self, script: &str, args: Vec<Value>) -> ActionResult<Value> {
        let result = self.driver.execute_script(script, args).await;
        self.lift("execute", &"script", result)
    }

    /// Drop cookies and web storage so the next page load starts signed out
    pub async fn reset_session(&self) -> ActionResult<()> {
        debug!("reset session state");
        let result = self.driver.delete_all_cookies().await;
        self.lift("delete", &"cookies", result)?;
        let result = self
            .driver
            .execute_script(
                "window.localStorage.clear(); window.sessionStorage.clear();",
                Vec::new(),
            )
            .await
            .map(|_| ());
        self.lift("clear", &"web storage", result)
    }

    /// End the browser session
    pub async fn quit(&self) -> ActionResult<()> {
        let result = self.driver.quit().await;
        self.lift("quit", &"session", result)
    }
}
