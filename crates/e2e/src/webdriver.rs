//! W3C WebDriver client over HTTP
//!
//! Talks to chromedriver (or any W3C endpoint) with plain JSON requests. All
//! protocol errors are returned as [`DriverError`] with the W3C error code, so
//! [`crate::gateway::classify`] can map them.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use ezyscribe_common::{ActionFailure, BrowserConfig, SuiteConfig, VerificationOutcome, WaitSpec};

use crate::error::{E2eError, E2eResult};
use crate::gateway::{
    codes, BrowserDriver, DriverError, DriverResult, ElementHandle, Locator, ELEMENT_KEY,
};
use crate::wait::{Observation, WaitPolicy};

/// Per-request HTTP timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A live WebDriver session
pub struct WebDriverClient {
    http: Client,
    endpoint: String,
    session_id: String,
}

impl WebDriverClient {
    /// Wait for the endpoint to report ready, then open a Chrome session
    pub async fn connect(config: &SuiteConfig) -> E2eResult<Self> {
        let endpoint = config.webdriver_url.trim_end_matches('/').to_string();
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        wait_for_ready(&http, &endpoint, config.timing.startup_wait).await?;

        let capabilities = chrome_capabilities(&config.browser);
        debug!(%endpoint, "Creating WebDriver session");
        let response = http
            .post(format!("{}/session", endpoint))
            .json(&capabilities)
            .send()
            .await?;
        let success = response.status().is_success();
        let body: Value = response.json().await?;

        let session_id = parse_response(success, body)
            .and_then(|value| parse_session_id(&value))
            .map_err(|e| E2eError::SessionStartup(e.to_string()))?;

        info!(%endpoint, session = %session_id, "WebDriver session started");
        Ok(Self {
            http,
            endpoint,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> DriverResult<Value> {
        let url = if path.is_empty() {
            format!("{}/session/{}", self.endpoint, self.session_id)
        } else {
            format!("{}/session/{}/{}", self.endpoint, self.session_id, path)
        };

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let success = response.status().is_success();
        let body: Value = response.json().await.map_err(transport_error)?;
        parse_response(success, body)
    }

    async fn post(&self, path: &str, body: Value) -> DriverResult<Value> {
        self.command(Method::POST, path, Some(body)).await
    }

    async fn get(&self, path: &str) -> DriverResult<Value> {
        self.command(Method::GET, path, None).await
    }
}

#[async_trait]
impl BrowserDriver for WebDriverClient {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.post("url", json!({ "url": url })).await.map(|_| ())
    }

    async fn refresh(&self) -> DriverResult<()> {
        self.post("refresh", json!({})).await.map(|_| ())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let value = self.get("url").await?;
        expect_string(&value)
    }

    async fn find_element(&self, locator: &Locator) -> DriverResult<ElementHandle> {
        let value = self.post("element", locator_body(locator)).await?;
        parse_element(&value)
    }

    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementHandle>> {
        let value = self.post("elements", locator_body(locator)).await?;
        parse_elements(&value)
    }

    async fn find_child(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> DriverResult<ElementHandle> {
        let path = format!("element/{}/element", parent.id());
        let value = self.post(&path, locator_body(locator)).await?;
        parse_element(&value)
    }

    async fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        let path = format!("element/{}/click", element.id());
        self.post(&path, json!({})).await.map(|_| ())
    }

    async fn clear(&self, element: &ElementHandle) -> DriverResult<()> {
        let path = format!("element/{}/clear", element.id());
        self.post(&path, json!({})).await.map(|_| ())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let path = format!("element/{}/value", element.id());
        self.post(&path, json!({ "text": text })).await.map(|_| ())
    }

    async fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        let value = self.get(&format!("element/{}/text", element.id())).await?;
        expect_string(&value)
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        let value = self
            .get(&format!("element/{}/attribute/{}", element.id(), name))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn is_displayed(&self, element: &ElementHandle) -> DriverResult<bool> {
        let value = self.get(&format!("element/{}/displayed", element.id())).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> DriverResult<Value> {
        self.post("execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    async fn delete_all_cookies(&self) -> DriverResult<()> {
        self.command(Method::DELETE, "cookie", None).await.map(|_| ())
    }

    async fn quit(&self) -> DriverResult<()> {
        info!(session = %self.session_id, "Closing WebDriver session");
        self.command(Method::DELETE, "", None).await.map(|_| ())
    }
}

/// Poll `GET /status` until the endpoint reports `ready: true`
async fn wait_for_ready(http: &Client, endpoint: &str, spec: WaitSpec) -> E2eResult<()> {
    let status_url = format!("{}/status", endpoint);
    let policy = WaitPolicy::new(spec);
    let mut announced = false;

    let outcome = policy
        .wait_until("webdriver ready", || {
            let request = http.get(&status_url).send();
            let first = !announced;
            announced = true;
            async move {
                match request.await {
                    Ok(response) => match response.json::<Value>().await {
                        Ok(body) if body["value"]["ready"].as_bool().unwrap_or(false) => {
                            Ok(Observation::Ready(()))
                        }
                        Ok(_) => Ok(Observation::Pending(None)),
                        Err(e) => Err(ActionFailure::not_yet_rendered(e.to_string())),
                    },
                    Err(e) => {
                        if first {
                            info!("Waiting for WebDriver to start...");
                        }
                        // connection refused is expected while the driver boots
                        if !e.is_connect() {
                            warn!("WebDriver status error: {}", e);
                        }
                        Err(ActionFailure::not_yet_rendered(e.to_string()))
                    }
                }
            }
        })
        .await
        .map_err(|failure| E2eError::Protocol(failure.to_string()))?;

    match outcome {
        VerificationOutcome::Matched { .. } => Ok(()),
        VerificationOutcome::TimedOut { polls, .. } => Err(E2eError::DriverUnavailable {
            url: endpoint.to_string(),
            attempts: polls,
        }),
    }
}

fn transport_error(e: reqwest::Error) -> DriverError {
    if e.is_timeout() {
        DriverError::new(codes::TIMEOUT, e.to_string())
    } else {
        DriverError::new(codes::TRANSPORT, e.to_string())
    }
}

fn locator_body(locator: &Locator) -> Value {
    let (using, value) = locator.strategy();
    json!({ "using": using, "value": value })
}

/// Chrome capabilities for a new session
pub fn chrome_capabilities(browser: &BrowserConfig) -> Value {
    let mut args: Vec<String> = vec![
        "--disable-notifications".to_string(),
        "--disable-extensions".to_string(),
        "--disable-infobars".to_string(),
        format!("--window-size={},{}", browser.window_width, browser.window_height),
    ];
    if browser.incognito {
        args.push("--incognito".to_string());
    }
    if browser.allow_microphone {
        args.push("--use-fake-ui-for-media-stream".to_string());
    }
    if browser.headless {
        args.push("--headless=new".to_string());
    }
    args.extend(browser.extra_args.iter().cloned());

    let mut prefs = Map::new();
    prefs.insert("credentials_enable_service".to_string(), json!(false));
    prefs.insert("profile.password_manager_enabled".to_string(), json!(false));
    if browser.allow_microphone {
        prefs.insert(
            "profile.default_content_setting_values.media_stream_mic".to_string(),
            json!(1),
        );
    }

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": {
                    "args": args,
                    "prefs": prefs,
                    "excludeSwitches": ["enable-automation"],
                }
            }
        }
    })
}

/// Unwrap a W3C response body: `{"value": ...}` on success,
/// `{"value": {"error": code, "message": ..}}` on failure
pub fn parse_response(success: bool, body: Value) -> DriverResult<Value> {
    let mut body = body;
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if let Some(code) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(DriverError::new(code, message));
    }
    if !success {
        return Err(DriverError::new(codes::UNKNOWN_ERROR, value.to_string()));
    }
    Ok(value)
}

fn parse_session_id(value: &Value) -> DriverResult<String> {
    value
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriverError::new(codes::SESSION_NOT_CREATED, "response has no sessionId"))
}

/// Element reference from a find response
pub fn parse_element(value: &Value) -> DriverResult<ElementHandle> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get("ELEMENT"))
        .and_then(Value::as_str)
        .map(ElementHandle::new)
        .ok_or_else(|| {
            DriverError::new(
                codes::UNKNOWN_ERROR,
                format!("malformed element reference: {}", value),
            )
        })
}

fn parse_elements(value: &Value) -> DriverResult<Vec<ElementHandle>> {
    value
        .as_array()
        .ok_or_else(|| DriverError::new(codes::UNKNOWN_ERROR, "expected an element array"))?
        .iter()
        .map(parse_element)
        .collect()
}

fn expect_string(value: &Value) -> DriverResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            DriverError::new(codes::UNKNOWN_ERROR, format!("expected a string, got {}", value))
        })
}
