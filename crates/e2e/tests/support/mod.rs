//! In-memory browser used by the integration tests
//!
//! `FakeState` is a tiny DOM: locators map to element ids, elements carry
//! text and attributes, and reactions mutate the state when an element is
//! clicked or a page is loaded. Reactions can also be scheduled for a later
//! (paused-clock) instant to model asynchronous re-renders.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use ezyscribe_common::{Credentials, Role, SuiteConfig};
use ezyscribe_e2e::flows::{
    DashboardLocators, FlowContext, LoginLocators, RecordingLocators, LOGIN_PATH, TASKS_PATH,
};
use ezyscribe_e2e::gateway::{
    codes, BrowserDriver, DriverError, DriverResult, ElementHandle, Locator, ENTER_KEY,
};
use ezyscribe_e2e::UiGateway;

pub const BASE_URL: &str = "https://app.test";
pub const EMAIL: &str = "doc@example.com";
pub const PASSWORD: &str = "correct-horse";
pub const EPIC_URL: &str = "https://fhir.epic.com/interconnect-fhir-oauth/oauth2/authorize";

/// Row values before any filter is applied
pub const DEFAULT_STATUS: &str = "in progress";
pub const DEFAULT_PRIORITY: &str = "low";

pub type Reaction = Arc<dyn Fn(&mut FakeState) + Send + Sync>;

#[derive(Default)]
pub struct FakeState {
    pub url: String,
    pub signed_in: bool,
    pub session_lost: bool,
    pub clicks: Vec<String>,
    pub navigations: Vec<String>,
    pub cookies_cleared: u32,
    elements: HashMap<Locator, Vec<String>>,
    children: HashMap<(String, Locator), String>,
    texts: HashMap<String, String>,
    attrs: HashMap<(String, String), String>,
    hidden: HashSet<String>,
    click_failures: HashMap<String, VecDeque<DriverError>>,
    on_click: HashMap<String, Reaction>,
    on_load: Vec<(String, Reaction)>,
    scheduled: Vec<(Instant, Reaction)>,
}

impl FakeState {
    /// Make `locator` match exactly one element
    pub fn show(&mut self, locator: &Locator, id: &str) {
        self.elements.insert(locator.clone(), vec![id.to_string()]);
    }

    pub fn show_all(&mut self, locator: &Locator, ids: &[String]) {
        self.elements.insert(locator.clone(), ids.to_vec());
    }

    pub fn remove(&mut self, locator: &Locator) {
        self.elements.remove(locator);
    }

    pub fn set_child(&mut self, parent: &str, locator: &Locator, id: &str) {
        self.children
            .insert((parent.to_string(), locator.clone()), id.to_string());
    }

    pub fn set_text(&mut self, id: &str, text: &str) {
        self.texts.insert(id.to_string(), text.to_string());
    }

    pub fn set_attr(&mut self, id: &str, name: &str, value: &str) {
        self.attrs
            .insert((id.to_string(), name.to_string()), value.to_string());
    }

    pub fn attr(&self, id: &str, name: &str) -> Option<String> {
        self.attrs.get(&(id.to_string(), name.to_string())).cloned()
    }

    pub fn hide(&mut self, id: &str) {
        self.hidden.insert(id.to_string());
    }

    pub fn unhide(&mut self, id: &str) {
        self.hidden.remove(id);
    }

    /// Fail the next clicks on `id` with these driver errors
    pub fn fail_clicks(&mut self, id: &str, errors: Vec<DriverError>) {
        self.click_failures
            .entry(id.to_string())
            .or_default()
            .extend(errors);
    }

    pub fn on_click(&mut self, id: &str, reaction: Reaction) {
        self.on_click.insert(id.to_string(), reaction);
    }

    /// Run `reaction` whenever a URL containing `fragment` is loaded
    pub fn on_load(&mut self, fragment: &str, reaction: Reaction) {
        self.on_load.push((fragment.to_string(), reaction));
    }

    /// Run `reaction` once `delay` has passed
    pub fn schedule(&mut self, delay: Duration, reaction: Reaction) {
        self.scheduled.push((Instant::now() + delay, reaction));
    }

    pub fn is_shown(&self, locator: &Locator) -> bool {
        self.elements.contains_key(locator)
    }

    pub fn text(&self, id: &str) -> Option<String> {
        self.texts.get(id).cloned()
    }

    pub fn clicked(&self, id: &str) -> usize {
        self.clicks.iter().filter(|c| c.as_str() == id).count()
    }

    fn is_live(&self, id: &str) -> bool {
        self.elements.values().any(|ids| ids.iter().any(|i| i == id))
            || self.children.values().any(|c| c == id)
    }

    fn tick(&mut self) {
        let now = Instant::now();
        let (due, pending): (Vec<_>, Vec<_>) =
            self.scheduled.drain(..).partition(|(at, _)| *at <= now);
        self.scheduled = pending;
        for (_, reaction) in due {
            reaction(self);
        }
    }

    fn load(&mut self, url: &str) {
        self.url = url.to_string();
        self.navigations.push(url.to_string());
        let reactions: Vec<Reaction> = self
            .on_load
            .iter()
            .filter(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, reaction)| reaction.clone())
            .collect();
        for reaction in reactions {
            reaction(self);
        }
    }

    fn click(&mut self, id: &str) -> DriverResult<()> {
        if !self.is_live(id) {
            return Err(stale(id));
        }
        if let Some(error) = self.click_failures.get_mut(id).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        self.clicks.push(id.to_string());
        if let Some(reaction) = self.on_click.get(id).cloned() {
            reaction(self);
        }
        Ok(())
    }
}

fn stale(id: &str) -> DriverError {
    DriverError::new(codes::STALE_ELEMENT, format!("{} is not attached to the page document", id))
}

fn no_such(locator: &Locator) -> DriverError {
    DriverError::new(codes::NO_SUCH_ELEMENT, format!("Unable to locate element: {}", locator))
}

/// Browser driver over a shared [`FakeState`]
#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBrowser {
    pub fn state(&self) -> Arc<Mutex<FakeState>> {
        self.state.clone()
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> DriverResult<T>) -> DriverResult<T> {
        let mut state = self.state.lock();
        if state.session_lost {
            return Err(DriverError::new(codes::INVALID_SESSION, "session deleted"));
        }
        state.tick();
        f(&mut *state)
    }
}

fn script_target(args: &[Value]) -> Option<String> {
    args.first()
        .and_then(|arg| arg.as_object())
        .and_then(|obj| obj.values().next())
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.with(|s| {
            s.load(url);
            Ok(())
        })
    }

    async fn refresh(&self) -> DriverResult<()> {
        self.with(|s| {
            let url = s.url.clone();
            s.load(&url);
            Ok(())
        })
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.with(|s| Ok(s.url.clone()))
    }

    async fn find_element(&self, locator: &Locator) -> DriverResult<ElementHandle> {
        self.with(|s| {
            s.elements
                .get(locator)
                .and_then(|ids| ids.first())
                .map(|id| ElementHandle::new(id.clone()))
                .ok_or_else(|| no_such(locator))
        })
    }

    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementHandle>> {
        self.with(|s| {
            Ok(s.elements
                .get(locator)
                .map(|ids| ids.iter().cloned().map(ElementHandle::new).collect())
                .unwrap_or_default())
        })
    }

    async fn find_child(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> DriverResult<ElementHandle> {
        self.with(|s| {
            if !s.is_live(parent.id()) {
                return Err(stale(parent.id()));
            }
            s.children
                .get(&(parent.id().to_string(), locator.clone()))
                .map(|id| ElementHandle::new(id.clone()))
                .ok_or_else(|| no_such(locator))
        })
    }

    async fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        self.with(|s| s.click(element.id()))
    }

    async fn clear(&self, element: &ElementHandle) -> DriverResult<()> {
        self.with(|s| {
            s.set_attr(element.id(), "value", "");
            Ok(())
        })
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        self.with(|s| {
            if !s.is_live(element.id()) {
                return Err(stale(element.id()));
            }
            if text == ENTER_KEY {
                return Ok(());
            }
            let value = s.attr(element.id(), "value").unwrap_or_default() + text;
            s.set_attr(element.id(), "value", &value);
            Ok(())
        })
    }

    async fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        self.with(|s| {
            if !s.is_live(element.id()) {
                return Err(stale(element.id()));
            }
            Ok(s.texts.get(element.id()).cloned().unwrap_or_default())
        })
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        self.with(|s| Ok(s.attr(element.id(), name)))
    }

    async fn is_displayed(&self, element: &ElementHandle) -> DriverResult<bool> {
        self.with(|s| Ok(!s.hidden.contains(element.id())))
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> DriverResult<Value> {
        self.with(|s| {
            let target = script_target(&args);
            match target {
                Some(id) if script.contains(".click()") => s.click(&id).map(|_| Value::Null),
                Some(id) if script.contains(".value = ''") => {
                    s.set_attr(&id, "value", "");
                    Ok(Value::Null)
                }
                _ => Ok(Value::Null),
            }
        })
    }

    async fn delete_all_cookies(&self) -> DriverResult<()> {
        self.with(|s| {
            s.cookies_cleared += 1;
            s.signed_in = false;
            Ok(())
        })
    }

    async fn quit(&self) -> DriverResult<()> {
        Ok(())
    }
}

fn row_id(n: usize) -> String {
    format!("row-{}", n)
}

fn link_id(n: usize) -> String {
    format!("task-link-{}", n)
}

/// Render the task table with these ids, in order
pub fn render_rows(state: &mut FakeState, ids: &[u64]) {
    let locators = DashboardLocators::default();
    let old_rows = state.elements.get(&locators.rows).cloned().unwrap_or_default();
    for (i, _) in old_rows.iter().enumerate() {
        state.remove(&locators.task_id_cell(i + 1));
    }

    let rows: Vec<String> = (1..=ids.len()).map(row_id).collect();
    state.show_all(&locators.rows, &rows);
    for (i, id) in ids.iter().enumerate() {
        let n = i + 1;
        state.set_child(&row_id(n), &locators.row_task_link, &link_id(n));
        state.set_text(&link_id(n), &format!("#{}", id));
        state.show(&locators.task_id_cell(n), &link_id(n));
    }
}

/// Read back the rendered task ids
pub fn rendered_ids(state: &FakeState) -> Vec<String> {
    let locators = DashboardLocators::default();
    let count = state.elements.get(&locators.rows).map(Vec::len).unwrap_or(0);
    (1..=count)
        .filter_map(|n| state.texts.get(&link_id(n)).cloned())
        .collect()
}

fn show_login(state: &mut FakeState) {
    let login = LoginLocators::default();
    state.url = format!("{}{}", BASE_URL, LOGIN_PATH);
    state.show(&login.email, "email");
    state.show(&login.password, "password");
    state.show(&login.submit, "submit");
    state.show(&login.epic_login, "epic");
    state.show(&login.forgot_password, "forgot");
    state.remove(&DashboardLocators::default().search_box);
}

fn show_dashboard(state: &mut FakeState, ids: &[u64]) {
    let login = LoginLocators::default();
    let l = DashboardLocators::default();
    for locator in [&login.email, &login.password, &login.submit, &login.form_error] {
        state.remove(locator);
    }
    state.show(&l.search_box, "search");
    state.show(&l.theme_toggle, "theme-toggle");
    state.show(&l.html, "html");
    state.show(&l.sort_button, "sort-button");
    state.show(&l.view_button, "view-button");
    state.show(&l.task_id_header, "task-id-header");
    state.show(&l.status_filter, "status-filter");
    state.show(&l.priority_filter, "priority-filter");
    state.show(&l.language_toggle, "language-toggle");
    state.show(&RecordingLocators::default().record, "record");
    render_rows(state, ids);
    state.show(&l.status_cell, "status-cell");
    state.set_text("status-cell", DEFAULT_STATUS);
    state.show(&l.priority_cell, "priority-cell");
    state.set_text("priority-cell", DEFAULT_PRIORITY);
}

/// Login submit: accepts the fake's credentials and redirects to the
/// dashboard, immediately or once `redirect_after` has passed
fn submit_reaction(ids: Vec<u64>, redirect_after: Option<Duration>) -> Reaction {
    let form_error = LoginLocators::default().form_error;
    Arc::new(move |s: &mut FakeState| {
        let email = s.attr("email", "value").unwrap_or_default();
        let password = s.attr("password", "value").unwrap_or_default();
        if email == EMAIL && password == PASSWORD {
            let ids = ids.clone();
            let redirect: Reaction = Arc::new(move |s: &mut FakeState| {
                s.signed_in = true;
                s.url = format!("{}{}", BASE_URL, TASKS_PATH);
                show_dashboard(s, &ids);
            });
            match redirect_after {
                Some(delay) => s.schedule(delay, redirect),
                None => redirect(s),
            }
        } else {
            s.show(&form_error, "form-error");
            let message = if !email.contains('@') {
                "Invalid email format"
            } else if password.len() < 8 {
                "Password must be at least 8 characters."
            } else {
                "Invalid email or password"
            };
            s.set_text("form-error", message);
        }
    })
}

/// Keep the login page up for `delay` after a successful submit
pub fn delay_redirect(browser: &FakeBrowser, ids: Vec<u64>, delay: Duration) {
    browser
        .state
        .lock()
        .on_click("submit", submit_reaction(ids, Some(delay)));
}

/// A dashboard app: login redirect, theme menu, sort menu, search, column
/// filters, the view menu, recording controls and the login page links
pub fn dashboard_app(initial_ids: Vec<u64>) -> FakeBrowser {
    let browser = FakeBrowser::default();
    let l = DashboardLocators::default();
    {
        let mut state = browser.state.lock();

        let ids = initial_ids.clone();
        state.on_load(
            TASKS_PATH,
            Arc::new(move |s: &mut FakeState| {
                if !s.signed_in {
                    show_login(s);
                    return;
                }
                let search = s.attr("search", "value").unwrap_or_default();
                let shown: Vec<u64> = ids
                    .iter()
                    .copied()
                    .filter(|id| {
                        search.is_empty() || id.to_string() == search.trim_start_matches('#')
                    })
                    .collect();
                show_dashboard(s, &shown);
            }),
        );
        state.on_load(LOGIN_PATH, Arc::new(show_login));

        state.on_click("submit", submit_reaction(initial_ids.clone(), None));

        let (dark, light) = (l.theme_dark.clone(), l.theme_light.clone());
        state.on_click(
            "theme-toggle",
            Arc::new(move |s: &mut FakeState| {
                s.show(&dark, "theme-dark");
                s.show(&light, "theme-light");
            }),
        );
        let (dark, light) = (l.theme_dark.clone(), l.theme_light.clone());
        state.on_click(
            "theme-dark",
            Arc::new(move |s: &mut FakeState| {
                s.remove(&dark);
                s.remove(&light);
                s.schedule(
                    Duration::from_millis(300),
                    Arc::new(|s: &mut FakeState| s.set_attr("html", "class", "antialiased dark")),
                );
            }),
        );
        let (dark, light) = (l.theme_dark.clone(), l.theme_light.clone());
        state.on_click(
            "theme-light",
            Arc::new(move |s: &mut FakeState| {
                s.remove(&dark);
                s.remove(&light);
                s.set_attr("html", "class", "antialiased");
            }),
        );

        let (menu, asc) = (l.sort_menu.clone(), l.sort_ascending.clone());
        state.on_click(
            "sort-button",
            Arc::new(move |s: &mut FakeState| {
                s.show(&menu, "sort-menu");
                s.show(&asc, "sort-asc");
            }),
        );
        let (menu, asc) = (l.sort_menu.clone(), l.sort_ascending.clone());
        state.on_click(
            "sort-asc",
            Arc::new(move |s: &mut FakeState| {
                s.remove(&menu);
                s.remove(&asc);
                s.schedule(
                    Duration::from_millis(700),
                    Arc::new(|s: &mut FakeState| {
                        let mut ids: Vec<u64> = rendered_ids(s)
                            .iter()
                            .filter_map(|label| label.trim_start_matches('#').parse().ok())
                            .collect();
                        ids.sort_unstable();
                        render_rows(s, &ids);
                    }),
                );
            }),
        );

        add_filter_reactions(&mut state);
        add_view_reactions(&mut state);
        add_recording_reactions(&mut state);
        add_login_page_reactions(&mut state);

        let menu = l.language_menu.clone();
        state.on_click(
            "language-toggle",
            Arc::new(move |s: &mut FakeState| s.show(&menu, "language-menu")),
        );
    }
    browser
}

/// Label of the option each filter popover offers second
pub fn filter_label(trigger: &str) -> &'static str {
    match trigger {
        "status-filter" => "Pending",
        _ => "High",
    }
}

/// Status and priority popovers. Picking an option re-renders the first row
/// 500 ms later and shows the column's clear button.
fn add_filter_reactions(state: &mut FakeState) {
    let l = DashboardLocators::default();
    let columns = [
        ("status-filter", "status-cell", DEFAULT_STATUS, l.clear_status_filter.clone()),
        ("priority-filter", "priority-cell", DEFAULT_PRIORITY, l.clear_priority_filter.clone()),
    ];
    for (trigger, cell, default, clear) in columns {
        let l = l.clone();
        let label = filter_label(trigger);
        state.on_click(
            trigger,
            Arc::new(move |s: &mut FakeState| {
                s.show(&l.options_group, "options");
                s.show(&l.filter_option, "option-2");
                s.set_child("option-2", &l.option_label, "option-2-label");
                s.set_text("option-2-label", label);

                let (group, option, shown_clear) =
                    (l.options_group.clone(), l.filter_option.clone(), clear.clone());
                s.on_click(
                    "option-2",
                    Arc::new(move |s: &mut FakeState| {
                        s.remove(&group);
                        s.remove(&option);
                        let clear = shown_clear.clone();
                        s.schedule(
                            Duration::from_millis(500),
                            Arc::new(move |s: &mut FakeState| {
                                s.set_text(cell, label);
                                s.show(&clear, "clear-filter");
                            }),
                        );
                    }),
                );

                let clear = clear.clone();
                s.on_click(
                    "clear-filter",
                    Arc::new(move |s: &mut FakeState| {
                        s.remove(&clear);
                        s.set_text(cell, default);
                    }),
                );
            }),
        );
    }
}

/// View menu whose first option toggles the Task ID column
fn add_view_reactions(state: &mut FakeState) {
    let l = DashboardLocators::default();
    let option = l.first_view_option.clone();
    state.on_click(
        "view-button",
        Arc::new(move |s: &mut FakeState| s.show(&option, "view-option-1")),
    );
    let (option, header) = (l.first_view_option.clone(), l.task_id_header.clone());
    state.on_click(
        "view-option-1",
        Arc::new(move |s: &mut FakeState| {
            s.remove(&option);
            if s.is_shown(&header) {
                s.remove(&header);
            } else {
                s.show(&header, "task-id-header");
            }
        }),
    );
}

/// Record, pause, review, record again and upload. The timer ticks past
/// zero one second after recording starts and the upload notice lands
/// 800 ms after the upload click.
fn add_recording_reactions(state: &mut FakeState) {
    let r = RecordingLocators::default();

    let l = r.clone();
    state.on_click(
        "record",
        Arc::new(move |s: &mut FakeState| {
            s.show(&l.timer, "timer");
            s.set_text("timer", "00:00");
            s.show(&l.pause, "pause");
            s.remove(&l.review);
            s.schedule(
                Duration::from_secs(1),
                Arc::new(|s: &mut FakeState| s.set_text("timer", "00:01")),
            );
        }),
    );

    let l = r.clone();
    state.on_click(
        "pause",
        Arc::new(move |s: &mut FakeState| {
            s.remove(&l.pause);
            s.show(&l.review, "review");
        }),
    );

    let l = r.clone();
    state.on_click(
        "review",
        Arc::new(move |s: &mut FakeState| {
            s.show(&l.review_dialog, "review-dialog");
            s.show(&l.upload, "upload");
            s.show(&l.record_again, "record-again");
        }),
    );

    let l = r.clone();
    state.on_click(
        "record-again",
        Arc::new(move |s: &mut FakeState| {
            for locator in [&l.review_dialog, &l.upload, &l.record_again, &l.review] {
                s.remove(locator);
            }
            s.show(&l.pause, "pause");
        }),
    );

    let l = r;
    state.on_click(
        "upload",
        Arc::new(move |s: &mut FakeState| {
            for locator in [&l.review_dialog, &l.upload, &l.record_again, &l.review] {
                s.remove(locator);
            }
            let notice = l.upload_notice.clone();
            s.schedule(
                Duration::from_millis(800),
                Arc::new(move |s: &mut FakeState| s.show(&notice, "upload-notice")),
            );
        }),
    );
}

/// Forgot-password alert and the Epic redirect
fn add_login_page_reactions(state: &mut FakeState) {
    let alert = LoginLocators::default().reset_alert;
    state.on_click(
        "forgot",
        Arc::new(move |s: &mut FakeState| s.show(&alert, "reset-alert")),
    );
    state.on_click(
        "epic",
        Arc::new(|s: &mut FakeState| {
            s.url = EPIC_URL.to_string();
            s.navigations.push(EPIC_URL.to_string());
        }),
    );
}

/// Suite config whose doctor credentials the fake app accepts
pub fn config() -> SuiteConfig {
    let mut config = SuiteConfig {
        base_url: BASE_URL.to_string(),
        ..Default::default()
    };
    config.roles.doctor = Credentials::new(EMAIL, PASSWORD);
    config
}

/// Flow context over `browser` for the doctor role
pub fn context(browser: &FakeBrowser) -> FlowContext {
    let gateway = Arc::new(UiGateway::new(Box::new(browser.clone()), BASE_URL));
    FlowContext::new(gateway, &config(), Role::Doctor)
}
