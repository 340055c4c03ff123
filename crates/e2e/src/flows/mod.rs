//! Dashboard scenarios
//!
//! One flow per page, parameterized by [`Role`] instead of duplicated per
//! user type. [`CATALOGUE`] lists every scenario with its tags and the roles
//! it applies to; [`build`] turns a catalogue entry into a runnable
//! [`Scenario`] bound to a gateway.

pub mod dashboard;
pub mod login;
pub mod recording;

use std::sync::Arc;

use ezyscribe_common::{
    ActionResult, Credentials, Role, SuiteConfig, TimingConfig, WaitSpec,
};

use crate::error::{E2eError, E2eResult};
use crate::gateway::{Locator, UiGateway};
use crate::runner::{Scenario, ScenarioStep};
use crate::verify::predicates;
use crate::wait::{Observation, WaitPolicy};

pub use dashboard::{DashboardFlow, DashboardLocators, FilterColumn};
pub use login::{LoginCase, LoginFlow, LoginLocators, LOGIN_CASES};
pub use recording::{RecordingFlow, RecordingLocators};

/// Application path of the login page
pub const LOGIN_PATH: &str = "/auth/login";

/// Application path of the task dashboard
pub const TASKS_PATH: &str = "/tasks";

/// Everything a flow needs to build its steps
#[derive(Clone)]
pub struct FlowContext {
    pub gateway: Arc<UiGateway>,
    pub role: Role,
    pub credentials: Credentials,
    pub timing: TimingConfig,
    pub dashboard: Arc<DashboardLocators>,
    pub login: Arc<LoginLocators>,
}

impl FlowContext {
    pub fn new(gateway: Arc<UiGateway>, config: &SuiteConfig, role: Role) -> Self {
        Self {
            gateway,
            role,
            credentials: config.credentials(role).clone(),
            timing: config.timing.clone(),
            dashboard: Arc::new(DashboardLocators::default()),
            login: Arc::new(LoginLocators::default()),
        }
    }

    /// Click with the configured retry budget
    pub(crate) fn click(&self, name: &str, locator: Locator) -> ScenarioStep<()> {
        let gateway = self.gateway.clone();
        ScenarioStep::new(name, move || {
            let gateway = gateway.clone();
            let locator = locator.clone();
            async move { gateway.click(&locator).await }
        })
        .with_retry(self.timing.retry.clone())
    }

    /// Script click with the configured retry budget
    pub(crate) fn js_click(&self, name: &str, locator: Locator) -> ScenarioStep<()> {
        let gateway = self.gateway.clone();
        ScenarioStep::new(name, move || {
            let gateway = gateway.clone();
            let locator = locator.clone();
            async move { gateway.js_click(&locator).await }
        })
        .with_retry(self.timing.retry.clone())
    }

    /// Wait until `locator` is displayed, then click it
    pub(crate) fn click_when_visible(
        &self,
        name: &str,
        locator: Locator,
        spec: WaitSpec,
    ) -> ScenarioStep<()> {
        let gateway = self.gateway.clone();
        ScenarioStep::new(name, move || {
            let gateway = gateway.clone();
            let locator = locator.clone();
            async move {
                wait_visible(&gateway, &locator, spec).await?;
                gateway.click(&locator).await
            }
        })
        .with_retry(self.timing.retry.clone())
    }

    /// Poll until `locator` is displayed
    pub(crate) fn expect_visible(
        &self,
        name: &str,
        locator: Locator,
        spec: WaitSpec,
    ) -> ScenarioStep<bool> {
        let gateway = self.gateway.clone();
        ScenarioStep::new(name, move || {
            let gateway = gateway.clone();
            let locator = locator.clone();
            async move { gateway.is_visible(&locator).await }
        })
        .verify(|visible| *visible, spec)
    }

    /// Poll until `locator` matches at least once
    pub(crate) fn expect_present(
        &self,
        name: &str,
        locator: Locator,
        spec: WaitSpec,
    ) -> ScenarioStep<bool> {
        let gateway = self.gateway.clone();
        ScenarioStep::new(name, move || {
            let gateway = gateway.clone();
            let locator = locator.clone();
            async move { gateway.is_present(&locator).await }
        })
        .verify(|present| *present, spec)
    }

    /// Poll until `locator` no longer matches
    pub(crate) fn expect_absent(
        &self,
        name: &str,
        locator: Locator,
        spec: WaitSpec,
    ) -> ScenarioStep<Vec<String>> {
        let gateway = self.gateway.clone();
        ScenarioStep::new(name, move || {
            let gateway = gateway.clone();
            let locator = locator.clone();
            async move { gateway.read_all(&locator).await }
        })
        .verify(|found: &Vec<String>| predicates::absent(found), spec)
    }

    /// Poll until the current URL contains `fragment`
    pub(crate) fn expect_url(
        &self,
        name: &str,
        fragment: &'static str,
        spec: WaitSpec,
    ) -> ScenarioStep<String> {
        let gateway = self.gateway.clone();
        ScenarioStep::new(name, move || {
            let gateway = gateway.clone();
            async move { gateway.current_url().await }
        })
        .verify(move |url: &String| url.contains(fragment), spec)
    }

    /// Open the dashboard, signing in first when the app redirects to login
    pub(crate) fn open_dashboard(&self) -> ScenarioStep<String> {
        let gateway = self.gateway.clone();
        let dashboard = self.dashboard.clone();
        let login = self.login.clone();
        let credentials = self.credentials.clone();
        let wait = self.timing.table_wait;

        ScenarioStep::new("open dashboard", move || {
            let gateway = gateway.clone();
            let dashboard = dashboard.clone();
            let login = login.clone();
            let credentials = credentials.clone();
            async move {
                gateway.navigate(TASKS_PATH).await?;
                if landing(&gateway, &dashboard, &login, wait).await? == Landing::Login {
                    sign_in(&gateway, &login, &credentials).await?;
                    signed_in(&gateway, &dashboard, wait).await?;
                }
                gateway.current_url().await
            }
        })
        .with_retry(self.timing.retry.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Landing {
    Dashboard,
    Login,
}

/// Wait for the app to settle on either the dashboard or the login page
async fn landing(
    gateway: &UiGateway,
    dashboard: &DashboardLocators,
    login: &LoginLocators,
    spec: WaitSpec,
) -> ActionResult<Landing> {
    WaitPolicy::new(spec)
        .require("dashboard or login page", || probe_landing(gateway, dashboard, login))
        .await
}

async fn probe_landing(
    gateway: &UiGateway,
    dashboard: &DashboardLocators,
    login: &LoginLocators,
) -> ActionResult<Observation<Landing>> {
    let url = gateway.current_url().await?;
    if url.contains(TASKS_PATH) && gateway.is_present(&dashboard.search_box).await? {
        Ok(Observation::Ready(Landing::Dashboard))
    } else if url.contains(LOGIN_PATH) && gateway.is_present(&login.email).await? {
        Ok(Observation::Ready(Landing::Login))
    } else {
        Ok(Observation::Pending(None))
    }
}

/// Wait for the redirect that follows a submitted login form. The login page
/// lingers for a moment after the click, so it counts as not yet landed.
async fn signed_in(
    gateway: &UiGateway,
    dashboard: &DashboardLocators,
    spec: WaitSpec,
) -> ActionResult<String> {
    WaitPolicy::new(spec)
        .require("dashboard after sign-in", || async {
            let url = gateway.current_url().await?;
            if url.contains(TASKS_PATH) && gateway.is_present(&dashboard.search_box).await? {
                Ok(Observation::Ready(url))
            } else {
                Ok(Observation::Pending(Some(url)))
            }
        })
        .await
}

/// Fill and submit the login form. Fields are cleared first so a retry does
/// not append to what a previous attempt typed.
pub(crate) async fn sign_in(
    gateway: &UiGateway,
    login: &LoginLocators,
    credentials: &Credentials,
) -> ActionResult<()> {
    fill(gateway, &login.email, &credentials.email).await?;
    fill(gateway, &login.password, &credentials.password).await?;
    gateway.click(&login.submit).await
}

pub(crate) async fn fill(gateway: &UiGateway, locator: &Locator, text: &str) -> ActionResult<()> {
    gateway.clear(locator).await?;
    gateway.type_text(locator, text).await
}

/// Poll until `locator` is displayed, failing with `Timeout` otherwise
pub(crate) async fn wait_visible(
    gateway: &UiGateway,
    locator: &Locator,
    spec: WaitSpec,
) -> ActionResult<()> {
    WaitPolicy::new(spec)
        .require(&format!("{} visible", locator), || async {
            gateway.is_visible(locator).await.map(|visible| {
                if visible {
                    Observation::Ready(())
                } else {
                    Observation::Pending(None)
                }
            })
        })
        .await
}

/// Catalogue entry
#[derive(Debug, Clone, Copy)]
pub struct ScenarioInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub tags: &'static [&'static str],
    pub roles: &'static [Role],
    /// Signs in with the role's credentials
    pub needs_credentials: bool,
}

impl ScenarioInfo {
    pub fn applies_to(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

const BOTH: &[Role] = &[Role::Doctor, Role::Scribe];
const DOCTOR: &[Role] = &[Role::Doctor];

/// Every scenario, in run order. Login page checks come first since they
/// need a signed-out session.
pub const CATALOGUE: &[ScenarioInfo] = &[
    ScenarioInfo {
        name: "login-invalid-email",
        description: "Malformed email shows a form error",
        tags: &["auth"],
        roles: BOTH,
        needs_credentials: false,
    },
    ScenarioInfo {
        name: "login-short-password",
        description: "Short password shows a form error",
        tags: &["auth"],
        roles: BOTH,
        needs_credentials: false,
    },
    ScenarioInfo {
        name: "login-wrong-password",
        description: "Wrong password shows a form error",
        tags: &["auth"],
        roles: BOTH,
        needs_credentials: false,
    },
    ScenarioInfo {
        name: "forgot-password",
        description: "Forgot password shows the reset alert",
        tags: &["auth"],
        roles: BOTH,
        needs_credentials: false,
    },
    ScenarioInfo {
        name: "epic-redirect",
        description: "Epic button redirects to Epic FHIR login",
        tags: &["auth"],
        roles: BOTH,
        needs_credentials: false,
    },
    ScenarioInfo {
        name: "login",
        description: "Sign in and land on the task dashboard",
        tags: &["auth", "smoke"],
        roles: BOTH,
        needs_credentials: true,
    },
    ScenarioInfo {
        name: "theme-switch",
        description: "Switch to dark theme and back",
        tags: &["theme"],
        roles: BOTH,
        needs_credentials: true,
    },
    ScenarioInfo {
        name: "language-toggle",
        description: "Open the language menu",
        tags: &["language"],
        roles: DOCTOR,
        needs_credentials: true,
    },
    ScenarioInfo {
        name: "task-search",
        description: "Search by task id and clear the search",
        tags: &["smoke"],
        roles: BOTH,
        needs_credentials: true,
    },
    ScenarioInfo {
        name: "status-filter",
        description: "Filter by status and check the first row",
        tags: &["filters"],
        roles: BOTH,
        needs_credentials: true,
    },
    ScenarioInfo {
        name: "priority-filter",
        description: "Filter by priority and check the first row",
        tags: &["filters"],
        roles: BOTH,
        needs_credentials: true,
    },
    ScenarioInfo {
        name: "reset-filters",
        description: "Reset filters and check rows are listed",
        tags: &["filters"],
        roles: BOTH,
        needs_credentials: true,
    },
    ScenarioInfo {
        name: "toggle-task-id-column",
        description: "Hide and show the Task ID column",
        tags: &["filters"],
        roles: BOTH,
        needs_credentials: true,
    },
    ScenarioInfo {
        name: "ascending-sort",
        description: "Sort tasks ascending by id",
        tags: &["sort"],
        roles: BOTH,
        needs_credentials: true,
    },
    ScenarioInfo {
        name: "recording",
        description: "Record, review and upload audio",
        tags: &["recording"],
        roles: DOCTOR,
        needs_credentials: true,
    },
    ScenarioInfo {
        name: "record-again",
        description: "Record again from review, then upload",
        tags: &["recording"],
        roles: DOCTOR,
        needs_credentials: true,
    },
];

/// Look up a catalogue entry
pub fn info(name: &str) -> Option<&'static ScenarioInfo> {
    CATALOGUE.iter().find(|info| info.name == name)
}

/// Catalogue entries for `role`
pub fn catalogue_for(role: Role) -> Vec<&'static ScenarioInfo> {
    CATALOGUE.iter().filter(|info| info.applies_to(role)).collect()
}

/// Build the named scenario for the context's role
pub fn build(name: &str, ctx: &FlowContext) -> E2eResult<Scenario> {
    let info = info(name)
        .filter(|info| info.applies_to(ctx.role))
        .ok_or_else(|| E2eError::ScenarioNotFound(format!("{} (role {})", name, ctx.role)))?;

    let dashboard = DashboardFlow::new(ctx.clone());
    let login = LoginFlow::new(ctx.clone());

    let scenario = match info.name {
        "login" => login.sign_in(),
        "forgot-password" => login.forgot_password(),
        "epic-redirect" => login.epic_redirect(),
        "theme-switch" => dashboard.theme_switch(),
        "language-toggle" => dashboard.language_toggle(),
        "task-search" => dashboard.task_search(),
        "status-filter" => dashboard.filter(FilterColumn::Status),
        "priority-filter" => dashboard.filter(FilterColumn::Priority),
        "reset-filters" => dashboard.reset_filters(),
        "toggle-task-id-column" => dashboard.toggle_task_id_column(),
        "ascending-sort" => dashboard.ascending_sort(),
        "recording" => RecordingFlow::new(ctx.clone()).record_and_upload(),
        "record-again" => RecordingFlow::new(ctx.clone()).record_again_and_upload(),
        other => {
            let case = LOGIN_CASES
                .iter()
                .find(|case| case.name == other)
                .ok_or_else(|| E2eError::ScenarioNotFound(other.to_string()))?;
            login.rejected(case)
        }
    };

    Ok(info
        .tags
        .iter()
        .fold(scenario.with_role(ctx.role), |scenario, tag| scenario.with_tag(*tag)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_names_are_unique() {
        let mut names: Vec<_> = CATALOGUE.iter().map(|i| i.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CATALOGUE.len());
    }

    #[test]
    fn test_doctor_only_scenarios() {
        let doctor_only = ["recording", "record-again", "language-toggle"];
        for name in doctor_only {
            assert!(catalogue_for(Role::Doctor).iter().any(|i| i.name == name));
            assert!(!catalogue_for(Role::Scribe).iter().any(|i| i.name == name));
        }
        assert_eq!(catalogue_for(Role::Doctor).len(), CATALOGUE.len());
        assert_eq!(catalogue_for(Role::Scribe).len(), CATALOGUE.len() - doctor_only.len());
    }

    #[test]
    fn test_login_cases_are_catalogued() {
        for case in LOGIN_CASES {
            let entry = info(case.name).unwrap();
            assert!(entry.has_tag("auth"));
        }
    }
}
