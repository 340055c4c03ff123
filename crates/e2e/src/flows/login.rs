//! Login page scenarios

use ezyscribe_common::Credentials;

use super::{fill, sign_in, FlowContext, LOGIN_PATH, TASKS_PATH};
use crate::gateway::Locator;
use crate::runner::{Scenario, ScenarioStep};
use crate::verify::predicates;

/// Form errors the login page may show for rejected credentials
pub const LOGIN_ERRORS: &[&str] = &[
    "Invalid email format",
    "Password must be at least 8 characters.",
    "Invalid email or password",
];

/// Alert shown after requesting a password reset
pub const RESET_ALERT: &str = "Check your email for the reset password link!";

/// Host the Epic button redirects to
pub const EPIC_HOST: &str = "fhir.epic.com";

/// Locators for the login page
#[derive(Debug, Clone)]
pub struct LoginLocators {
    pub email: Locator,
    pub password: Locator,
    pub submit: Locator,
    pub form_error: Locator,
    pub forgot_password: Locator,
    pub reset_alert: Locator,
    pub epic_login: Locator,
}

impl Default for LoginLocators {
    fn default() -> Self {
        Self {
            email: Locator::xpath("//input[@name='email']"),
            password: Locator::xpath("//input[@type='password']"),
            submit: Locator::xpath("//button[@type='submit']"),
            form_error: Locator::css("[data-slot='form-message']"),
            forgot_password: Locator::xpath(
                "//button[normalize-space(text())='Forgot your password?']",
            ),
            reset_alert: Locator::xpath(format!("//div[contains(text(),'{}')]", RESET_ALERT)),
            epic_login: Locator::xpath("//button[.//img[contains(@alt, 'Epic Logo')]]"),
        }
    }
}

/// Credentials the login form must reject
#[derive(Debug, Clone, Copy)]
pub struct LoginCase {
    pub name: &'static str,
    pub email: &'static str,
    pub password: &'static str,
}

pub const LOGIN_CASES: &[LoginCase] = &[
    LoginCase {
        name: "login-invalid-email",
        email: "not-an-email",
        password: "password123",
    },
    LoginCase {
        name: "login-short-password",
        email: "qa.user@example.com",
        password: "short",
    },
    LoginCase {
        name: "login-wrong-password",
        email: "qa.user@example.com",
        password: "definitely-wrong-123",
    },
];

/// Login page scenarios
pub struct LoginFlow {
    ctx: FlowContext,
}

impl LoginFlow {
    pub fn new(ctx: FlowContext) -> Self {
        Self { ctx }
    }

    fn locators(&self) -> &LoginLocators {
        &self.ctx.login
    }

    /// Start signed out on the login page
    fn open_login_page(&self, scenario: Scenario) -> Scenario {
        let gateway = self.ctx.gateway.clone();
        scenario
            .step(
                ScenarioStep::new("sign out", move || {
                    let gateway = gateway.clone();
                    async move {
                        gateway.navigate(LOGIN_PATH).await?;
                        gateway.reset_session().await
                    }
                })
                .with_retry(self.ctx.timing.retry.clone()),
            )
            .step({
                let gateway = self.ctx.gateway.clone();
                ScenarioStep::new("open login page", move || {
                    let gateway = gateway.clone();
                    async move { gateway.navigate(LOGIN_PATH).await }
                })
            })
            .step(self.ctx.expect_present(
                "wait for login form",
                self.locators().email.clone(),
                self.ctx.timing.element_wait,
            ))
    }

    fn submit(&self, name: &str, credentials: Credentials) -> ScenarioStep<()> {
        let gateway = self.ctx.gateway.clone();
        let login = self.ctx.login.clone();
        ScenarioStep::new(name, move || {
            let gateway = gateway.clone();
            let login = login.clone();
            let credentials = credentials.clone();
            async move { sign_in(&gateway, &login, &credentials).await }
        })
        .with_retry(self.ctx.timing.retry.clone())
    }

    /// Sign in with the role's credentials and land on the dashboard
    pub fn sign_in(&self) -> Scenario {
        let timing = &self.ctx.timing;
        self.open_login_page(Scenario::new("login"))
            .step(self.submit("submit credentials", self.ctx.credentials.clone()))
            .step(self.ctx.expect_url("confirm dashboard url", TASKS_PATH, timing.table_wait))
            .step(self.ctx.expect_present(
                "confirm task search box",
                self.ctx.dashboard.search_box.clone(),
                timing.table_wait,
            ))
    }

    /// Submit rejected credentials and expect a form error
    pub fn rejected(&self, case: &LoginCase) -> Scenario {
        let gateway = self.ctx.gateway.clone();
        let form_error = self.locators().form_error.clone();
        let error_shown = ScenarioStep::new("confirm form error", move || {
            let gateway = gateway.clone();
            let form_error = form_error.clone();
            async move { gateway.read_text(&form_error).await }
        })
        .verify(
            |message: &String| predicates::contains_any(message, LOGIN_ERRORS),
            self.ctx.timing.element_wait,
        );

        self.open_login_page(Scenario::new(case.name))
            .step(self.submit(
                "submit rejected credentials",
                Credentials::new(case.email, case.password),
            ))
            .step(error_shown)
    }

    /// Request a password reset and expect the confirmation alert
    pub fn forgot_password(&self) -> Scenario {
        let l = self.locators();
        let timing = &self.ctx.timing;

        let enter_email = {
            let gateway = self.ctx.gateway.clone();
            let email_field = l.email.clone();
            let email = if self.ctx.credentials.email.is_empty() {
                "qa.user@example.com".to_string()
            } else {
                self.ctx.credentials.email.clone()
            };
            ScenarioStep::new("enter email", move || {
                let gateway = gateway.clone();
                let email_field = email_field.clone();
                let email = email.clone();
                async move { fill(&gateway, &email_field, &email).await }
            })
            .with_retry(timing.retry.clone())
        };

        self.open_login_page(Scenario::new("forgot-password"))
            .step(enter_email)
            .step(self.ctx.click_when_visible(
                "request password reset",
                l.forgot_password.clone(),
                timing.element_wait,
            ))
            .step(self.ctx.expect_visible(
                "confirm reset alert",
                l.reset_alert.clone(),
                timing.element_wait,
            ))
    }

    /// Follow the Epic button to the Epic FHIR login
    pub fn epic_redirect(&self) -> Scenario {
        let timing = &self.ctx.timing;
        self.open_login_page(Scenario::new("epic-redirect"))
            .step(self.ctx.click_when_visible(
                "open epic login",
                self.locators().epic_login.clone(),
                timing.element_wait,
            ))
            .step(self.ctx.expect_url("confirm epic redirect", EPIC_HOST, timing.table_wait))
    }
}
