//! Error types for E2E runs

use ezyscribe_common::{ActionFailure, ScenarioReport};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("WebDriver not ready at {url} after {attempts} attempts")]
    DriverUnavailable { url: String, attempts: u32 },

    #[error("WebDriver session could not be created: {0}")]
    SessionStartup(String),

    #[error("WebDriver protocol error: {0}")]
    Protocol(String),

    #[error("Scenario '{scenario}' aborted: {failure}")]
    Aborted {
        scenario: String,
        failure: ActionFailure,
        report: Box<ScenarioReport>,
    },

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ezyscribe_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
