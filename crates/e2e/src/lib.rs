//! EzyScribe E2E Orchestration
//!
//! This crate drives the EzyScribe dashboard through a WebDriver session and
//! turns flaky browser interactions into deterministic pass/fail outcomes:
//! - Polls conditions under explicit wait budgets instead of fixed sleeps
//! - Retries transient driver failures (stale, not yet rendered, not interactable)
//! - Confirms asynchronous table re-renders by polling a read until a predicate holds
//! - Classifies every driver failure once, at the gateway boundary
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SuiteRunner                                                │
//! │    └── ScenarioRunner::run(Scenario) -> ScenarioReport      │
//! │          └── ScenarioStep                                   │
//! │                ├── action   ── RetryExecutor                │
//! │                └── verify   ── EventualConsistencyVerifier  │
//! │                                  └── WaitPolicy             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UiGateway (click, type, read, scroll; FailureKind mapping) │
//! │    └── BrowserDriver ── WebDriverClient (W3C over HTTP)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  flows: login, dashboard (doctor + scribe), recording       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod flows;
pub mod gateway;
pub mod retry;
pub mod runner;
pub mod suite;
pub mod verify;
pub mod wait;
pub mod webdriver;

pub use error::{E2eError, E2eResult};
pub use gateway::{BrowserDriver, DriverError, ElementHandle, Locator, UiGateway};
pub use retry::{RetryExecutor, RetryOutcome};
pub use runner::{Scenario, ScenarioRunner, ScenarioStep, Step};
pub use suite::{run_suite, ScenarioFilter, SuiteResult, SuiteRunner};
pub use verify::EventualConsistencyVerifier;
pub use wait::{Observation, WaitPolicy};
pub use webdriver::WebDriverClient;
