//! Suite configuration
//!
//! Loaded from a TOML file (defaults when the file is absent), then overridden
//! from the environment. Credentials are opaque strings handed to login steps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{RetrySpec, WaitSpec};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "EZYSCRIBE";

/// Suite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Application under test
    pub base_url: String,

    /// WebDriver endpoint (chromedriver, selenium, ...)
    pub webdriver_url: String,

    /// Where reports are written
    pub output_dir: PathBuf,

    /// Browser session settings
    pub browser: BrowserConfig,

    /// Wait and retry budgets
    pub timing: TimingConfig,

    /// Per-role credentials
    pub roles: RolesConfig,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://appv2.ezyscribe.com".to_string(),
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            output_dir: PathBuf::from("test-results"),
            browser: BrowserConfig::default(),
            timing: TimingConfig::default(),
            roles: RolesConfig::default(),
        }
    }
}

/// Browser session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,

    /// Start in an incognito profile
    pub incognito: bool,

    /// Auto-allow microphone access for the recording workflow
    pub allow_microphone: bool,

    /// Extra Chrome arguments
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            incognito: true,
            allow_microphone: true,
            extra_args: Vec::new(),
        }
    }
}

/// Wait and retry budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Explicit waits for elements and verifications
    pub element_wait: WaitSpec,

    /// Dropdown and popover menus
    pub menu_wait: WaitSpec,

    /// Table re-render after filter, search or sort
    pub table_wait: WaitSpec,

    /// WebDriver endpoint readiness
    pub startup_wait: WaitSpec,

    /// Retry budget for flaky interactions
    pub retry: RetrySpec,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            element_wait: WaitSpec::default(),
            menu_wait: WaitSpec::new(Duration::from_secs(3), Duration::from_millis(200))
                .unwrap_or_default(),
            table_wait: WaitSpec::new(Duration::from_secs(10), Duration::from_millis(500))
                .unwrap_or_default(),
            startup_wait: WaitSpec::new(Duration::from_secs(30), Duration::from_millis(100))
                .unwrap_or_default(),
            retry: RetrySpec::default(),
        }
    }
}

/// Dashboard user roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Doctor,
    Scribe,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Doctor, Role::Scribe];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Scribe => "scribe",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "doctor" | "provider" => Ok(Role::Doctor),
            "scribe" => Ok(Role::Scribe),
            other => Err(Error::InvalidConfig(format!("unknown role: {}", other))),
        }
    }
}

/// Login credentials for one role
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Credentials per role
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    pub doctor: Credentials,
    pub scribe: Credentials,
}

impl SuiteConfig {
    /// Load configuration from file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `EZYSCRIBE_*` overrides resolved through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}_{}", ENV_PREFIX, name)).filter(|v| !v.is_empty())
        };

        if let Some(url) = var("BASE_URL") {
            self.base_url = url;
        }
        if let Some(url) = var("WEBDRIVER_URL") {
            self.webdriver_url = url;
        }
        if let Some(dir) = var("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(headless) = var("HEADLESS") {
            self.browser.headless = !matches!(headless.as_str(), "0" | "false" | "no");
        }
        for role in Role::ALL {
            let upper = role.as_str().to_ascii_uppercase();
            let creds = self.credentials_mut(role);
            if let Some(email) = var(&format!("{}_EMAIL", upper)) {
                creds.email = email;
            }
            if let Some(password) = var(&format!("{}_PASSWORD", upper)) {
                creds.password = password;
            }
        }
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [("base_url", &self.base_url), ("webdriver_url", &self.webdriver_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }
        if self.browser.window_width == 0 || self.browser.window_height == 0 {
            return Err(Error::InvalidConfig(
                "browser window size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn credentials(&self, role: Role) -> &Credentials {
        match role {
            Role::Doctor => &self.roles.doctor,
            Role::Scribe => &self.roles.scribe,
        }
    }

    fn credentials_mut(&mut self, role: Role) -> &mut Credentials {
        match role {
            Role::Doctor => &mut self.roles.doctor,
            Role::Scribe => &mut self.roles.scribe,
        }
    }

    /// Credentials for `role`, failing when either field is empty
    pub fn require_credentials(&self, role: Role) -> Result<&Credentials> {
        let creds = self.credentials(role);
        if creds.is_complete() {
            Ok(creds)
        } else {
            Err(Error::InvalidConfig(format!(
                "missing credentials for role '{}' (set {}_{}_EMAIL / _PASSWORD)",
                role,
                ENV_PREFIX,
                role.as_str().to_ascii_uppercase()
            )))
        }
    }

    /// Absolute URL for an application path
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
