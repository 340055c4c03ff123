//! Task dashboard scenarios, shared by doctors and scribes

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::Arc;

use ezyscribe_common::ActionFailure;

use super::{fill, FlowContext};
use crate::gateway::Locator;
use crate::runner::{Scenario, ScenarioStep};
use crate::verify::predicates;

static DIGITS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\d+").ok());

/// Numeric part of a task id label such as `#1042`
pub fn task_number(label: &str) -> Option<u64> {
    let digits: String = DIGITS
        .as_ref()?
        .find_iter(label)
        .map(|m| m.as_str())
        .collect();
    digits.parse().ok()
}

/// Whether an `<html>` class list selects the dark theme
pub fn is_dark_theme(class: &str) -> bool {
    class.split_whitespace().any(|c| c == "dark")
}

/// Locators for the task dashboard
#[derive(Debug, Clone)]
pub struct DashboardLocators {
    pub search_box: Locator,
    pub theme_toggle: Locator,
    pub theme_dark: Locator,
    pub theme_light: Locator,
    pub language_toggle: Locator,
    pub language_menu: Locator,
    pub html: Locator,
    pub rows: Locator,
    /// Task link inside a row
    pub row_task_link: Locator,
    pub options_group: Locator,
    /// Option picked in the status and priority popovers
    pub filter_option: Locator,
    /// Label inside a popover option
    pub option_label: Locator,
    pub status_filter: Locator,
    pub priority_filter: Locator,
    pub clear_status_filter: Locator,
    pub clear_priority_filter: Locator,
    pub status_cell: Locator,
    pub priority_cell: Locator,
    pub view_button: Locator,
    pub first_view_option: Locator,
    pub task_id_header: Locator,
    pub reset_filters: Locator,
    pub sort_button: Locator,
    pub sort_menu: Locator,
    pub sort_ascending: Locator,
}

impl Default for DashboardLocators {
    fn default() -> Self {
        Self {
            search_box: Locator::xpath("//input[@placeholder='Search task numbers...']"),
            theme_toggle: Locator::xpath(concat!(
                "//button[@data-slot='dropdown-menu-trigger'",
                " and descendant::span[text()='Toggle theme']]",
            )),
            theme_dark: Locator::xpath("//div[@role='menuitem' and normalize-space()='Dark']"),
            theme_light: Locator::xpath("//div[@role='menuitem' and normalize-space()='Light']"),
            language_toggle: Locator::xpath("//button[.//span[text()='Language']]"),
            language_menu: Locator::xpath("//div[@role='menu' and .//*[contains(., 'English')]]"),
            html: Locator::tag("html"),
            rows: Locator::xpath("//table//tbody/tr"),
            row_task_link: Locator::xpath(".//a"),
            options_group: Locator::xpath("//div[@role='group']"),
            filter_option: Locator::xpath("(//div[@role='option' and @cmdk-item=''])[2]"),
            option_label: Locator::css("span.truncate"),
            status_filter: Locator::xpath(
                "//button[@data-slot='popover-trigger' and contains(text(), 'Status')]",
            ),
            priority_filter: Locator::xpath(
                "//button[@data-slot='popover-trigger' and contains(text(), 'Priority')]",
            ),
            clear_status_filter: Locator::xpath(
                "//div[@role='button' and @aria-label='Clear Status filter']",
            ),
            clear_priority_filter: Locator::xpath(
                "//div[@role='button' and @aria-label='Clear Priority filter']",
            ),
            status_cell: Locator::xpath(
                "(//table//tbody/tr)[1]/td[4]//span[contains(@class,'capitalize')]",
            ),
            priority_cell: Locator::xpath(
                "(//table//tbody/tr)[1]/td[5]//span[contains(@class,'capitalize')]",
            ),
            view_button: Locator::xpath("//button[@aria-label='Toggle columns']"),
            first_view_option: Locator::xpath("(//div[@role='option' and @cmdk-item=''])[1]"),
            task_id_header: Locator::xpath("//th[.='Task ID']"),
            reset_filters: Locator::xpath(
                "//button[@aria-label='Reset filters' and normalize-space(text())='Reset']",
            ),
            sort_button: Locator::xpath(
                "//button[contains(., 'Task #') and @aria-haspopup='menu']",
            ),
            sort_menu: Locator::xpath("//div[@role='menu']"),
            sort_ascending: Locator::xpath(
                "//div[@role='menuitemcheckbox' and contains(., 'Asc')]",
            ),
        }
    }
}

impl DashboardLocators {
    /// Task link in the `n`th row, 1-based
    pub fn task_id_cell(&self, n: usize) -> Locator {
        Locator::xpath(format!("(//td[@data-slot='table-cell']//a)[{}]", n))
    }
}

/// Filterable table columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterColumn {
    Status,
    Priority,
}

impl FilterColumn {
    pub fn label(&self) -> &'static str {
        match self {
            FilterColumn::Status => "status",
            FilterColumn::Priority => "priority",
        }
    }

    pub fn scenario_name(&self) -> &'static str {
        match self {
            FilterColumn::Status => "status-filter",
            FilterColumn::Priority => "priority-filter",
        }
    }

    fn trigger<'a>(&self, locators: &'a DashboardLocators) -> &'a Locator {
        match self {
            FilterColumn::Status => &locators.status_filter,
            FilterColumn::Priority => &locators.priority_filter,
        }
    }

    fn clear_button<'a>(&self, locators: &'a DashboardLocators) -> &'a Locator {
        match self {
            FilterColumn::Status => &locators.clear_status_filter,
            FilterColumn::Priority => &locators.clear_priority_filter,
        }
    }

    fn first_row_cell<'a>(&self, locators: &'a DashboardLocators) -> &'a Locator {
        match self {
            FilterColumn::Status => &locators.status_cell,
            FilterColumn::Priority => &locators.priority_cell,
        }
    }
}

/// Value captured by one step and read by a later one
type Shared<T> = Arc<Mutex<Option<T>>>;

fn remembered(shared: &Shared<String>, what: &str) -> Result<String, ActionFailure> {
    shared
        .lock()
        .clone()
        .ok_or_else(|| ActionFailure::mismatch(format!("no {} captured by an earlier step", what)))
}

/// Dashboard scenarios
pub struct DashboardFlow {
    ctx: FlowContext,
}

impl DashboardFlow {
    pub fn new(ctx: FlowContext) -> Self {
        Self { ctx }
    }

    fn locators(&self) -> &DashboardLocators {
        &self.ctx.dashboard
    }

    /// Read `<html class>` until it does (or does not) select the dark theme
    fn expect_theme(&self, name: &str, dark: bool) -> ScenarioStep<String> {
        let gateway = self.ctx.gateway.clone();
        let html = self.locators().html.clone();
        ScenarioStep::new(name, move || {
            let gateway = gateway.clone();
            let html = html.clone();
            async move {
                gateway
                    .read_attribute(&html, "class")
                    .await
                    .map(Option::unwrap_or_default)
            }
        })
        .verify(
            move |class: &String| is_dark_theme(class) == dark,
            self.ctx.timing.element_wait,
        )
    }

    /// Poll until the table lists at least `min` rows
    fn expect_rows(&self, name: &str, min: usize) -> ScenarioStep<usize> {
        let gateway = self.ctx.gateway.clone();
        let rows = self.locators().rows.clone();
        ScenarioStep::new(name, move || {
            let gateway = gateway.clone();
            let rows = rows.clone();
            async move { gateway.count(&rows).await }
        })
        .verify(move |count| *count >= min, self.ctx.timing.table_wait)
    }

    /// Clear the search box until its value reads back empty
    fn clear_search(&self) -> ScenarioStep<String> {
        let gateway = self.ctx.gateway.clone();
        let search_box = self.locators().search_box.clone();
        ScenarioStep::new("clear search box", move || {
            let gateway = gateway.clone();
            let search_box = search_box.clone();
            async move {
                gateway.clear(&search_box).await?;
                gateway
                    .read_attribute(&search_box, "value")
                    .await
                    .map(Option::unwrap_or_default)
            }
        })
        .with_retry(self.ctx.timing.retry.clone())
        .verify(|value: &String| value.is_empty(), self.ctx.timing.element_wait)
    }

    /// Click Reset when the table has filters applied; a no-op otherwise
    fn reset_if_present(&self) -> ScenarioStep<bool> {
        let gateway = self.ctx.gateway.clone();
        let reset = self.locators().reset_filters.clone();
        ScenarioStep::new("reset filters if applied", move || {
            let gateway = gateway.clone();
            let reset = reset.clone();
            async move {
                if gateway.is_present(&reset).await? {
                    gateway.js_click(&reset).await?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        })
        .with_retry(self.ctx.timing.retry.clone())
    }

    /// Show the first column when it is hidden; a no-op when it is visible
    fn ensure_task_id_column(&self) -> ScenarioStep<bool> {
        let gateway = self.ctx.gateway.clone();
        let locators = self.ctx.dashboard.clone();
        let menu_wait = self.ctx.timing.menu_wait;
        ScenarioStep::new("show task id column if hidden", move || {
            let gateway = gateway.clone();
            let locators = locators.clone();
            async move {
                if gateway.is_present(&locators.task_id_header).await? {
                    return Ok(false);
                }
                gateway.click(&locators.view_button).await?;
                super::wait_visible(&gateway, &locators.first_view_option, menu_wait).await?;
                gateway.click(&locators.first_view_option).await?;
                Ok(true)
            }
        })
        .with_retry(self.ctx.timing.retry.clone())
    }

    pub fn theme_switch(&self) -> Scenario {
        let l = self.locators();
        let menu_wait = self.ctx.timing.menu_wait;
        Scenario::new("theme-switch")
            .step(self.ctx.open_dashboard())
            .step(self.ctx.click("open theme menu", l.theme_toggle.clone()))
            .step(self.ctx.click_when_visible(
                "choose dark theme",
                l.theme_dark.clone(),
                menu_wait,
            ))
            .step(self.expect_theme("confirm dark theme", true))
            .step(self.ctx.click("reopen theme menu", l.theme_toggle.clone()))
            .step(self.ctx.click_when_visible(
                "choose light theme",
                l.theme_light.clone(),
                menu_wait,
            ))
            .step(self.expect_theme("confirm light theme", false))
    }

    /// Open the language dropdown and wait for its menu
    pub fn language_toggle(&self) -> Scenario {
        let l = self.locators();
        let timing = &self.ctx.timing;
        Scenario::new("language-toggle")
            .step(self.ctx.open_dashboard())
            .step(self.ctx.click_when_visible(
                "open language menu",
                l.language_toggle.clone(),
                timing.element_wait,
            ))
            .step(self.ctx.expect_visible(
                "confirm language menu",
                l.language_menu.clone(),
                timing.menu_wait,
            ))
    }

    pub fn task_search(&self) -> Scenario {
        let l = self.locators();
        let gateway = self.ctx.gateway.clone();
        let task_id: Shared<String> = Arc::new(Mutex::new(None));

        let read_second = {
            let gateway = gateway.clone();
            let cell = l.task_id_cell(2);
            let task_id = task_id.clone();
            ScenarioStep::new("read second task id", move || {
                let gateway = gateway.clone();
                let cell = cell.clone();
                let task_id = task_id.clone();
                async move {
                    let text = gateway.read_text(&cell).await?;
                    *task_id.lock() = Some(text.clone());
                    Ok(text)
                }
            })
            .verify(|id: &String| !id.is_empty(), self.ctx.timing.table_wait)
        };

        let search = {
            let gateway = gateway.clone();
            let search_box = l.search_box.clone();
            let task_id = task_id.clone();
            ScenarioStep::new("search for task id", move || {
                let gateway = gateway.clone();
                let search_box = search_box.clone();
                let task_id = task_id.clone();
                async move {
                    let id = remembered(&task_id, "task id")?;
                    fill(&gateway, &search_box, &id).await?;
                    gateway.refresh().await
                }
            })
            .with_retry(self.ctx.timing.retry.clone())
        };

        let first_matches = {
            let gateway = gateway.clone();
            let cell = l.task_id_cell(1);
            let expected = task_id.clone();
            ScenarioStep::new("confirm first row is the searched task", move || {
                let gateway = gateway.clone();
                let cell = cell.clone();
                async move { gateway.read_text(&cell).await }
            })
            .verify(
                move |first: &String| {
                    expected
                        .lock()
                        .as_deref()
                        .map(|id| predicates::first_equals(std::slice::from_ref(first), id))
                        .unwrap_or(false)
                },
                self.ctx.timing.table_wait,
            )
        };

        Scenario::new("task-search")
            .step(self.ctx.open_dashboard())
            .step(read_second)
            .step(search)
            .step(first_matches)
            .step(self.clear_search())
            .step(self.expect_rows("confirm rows are listed again", 1))
    }

    pub fn filter(&self, column: FilterColumn) -> Scenario {
        let l = self.locators();
        let timing = &self.ctx.timing;
        let label: Shared<String> = Arc::new(Mutex::new(None));

        let read_label = {
            let gateway = self.ctx.gateway.clone();
            let option = l.filter_option.clone();
            let option_label = l.option_label.clone();
            let label = label.clone();
            ScenarioStep::new(format!("read {} option", column.label()), move || {
                let gateway = gateway.clone();
                let option = option.clone();
                let option_label = option_label.clone();
                let label = label.clone();
                async move {
                    let text = gateway.read_child_text(&option, &option_label).await?;
                    *label.lock() = Some(text.clone());
                    Ok(text)
                }
            })
            .verify(|text: &String| !text.is_empty(), timing.menu_wait)
        };

        let cell_matches = {
            let gateway = self.ctx.gateway.clone();
            let cell = column.first_row_cell(l).clone();
            let expected = label.clone();
            ScenarioStep::new(format!("confirm first row {}", column.label()), move || {
                let gateway = gateway.clone();
                let cell = cell.clone();
                async move { gateway.read_text(&cell).await }
            })
            .verify(
                move |text: &String| {
                    expected
                        .lock()
                        .as_deref()
                        .map(|label| predicates::contains_text(text, label))
                        .unwrap_or(false)
                },
                timing.table_wait,
            )
        };

        Scenario::new(column.scenario_name())
            .step(self.ctx.open_dashboard())
            .step(self.clear_search())
            .step(self.ctx.click(
                &format!("open {} filter", column.label()),
                column.trigger(l).clone(),
            ))
            .step(self.ctx.expect_present(
                "wait for options",
                l.options_group.clone(),
                timing.menu_wait,
            ))
            .step(read_label)
            .step(self.ctx.js_click(
                &format!("select {} option", column.label()),
                l.filter_option.clone(),
            ))
            .step(cell_matches)
            .step(self.ctx.js_click(
                &format!("clear {} filter", column.label()),
                column.clear_button(l).clone(),
            ))
            .step(self.expect_rows("confirm rows after clearing filter", 1))
    }

    pub fn reset_filters(&self) -> Scenario {
        Scenario::new("reset-filters")
            .step(self.ctx.open_dashboard())
            .step(self.reset_if_present())
            .step(self.expect_rows("confirm rows are listed", 1))
    }

    pub fn toggle_task_id_column(&self) -> Scenario {
        let l = self.locators();
        let timing = &self.ctx.timing;
        Scenario::new("toggle-task-id-column")
            .step(self.ctx.open_dashboard())
            .step(self.ensure_task_id_column())
            .step(self.ctx.expect_present(
                "confirm task id column shown",
                l.task_id_header.clone(),
                timing.table_wait,
            ))
            .step(self.ctx.click("open view menu", l.view_button.clone()))
            .step(self.ctx.click_when_visible(
                "hide task id column",
                l.first_view_option.clone(),
                timing.menu_wait,
            ))
            .step(self.ctx.expect_absent(
                "confirm task id column hidden",
                l.task_id_header.clone(),
                timing.table_wait,
            ))
            .step(self.ensure_task_id_column())
            .step(self.ctx.expect_present(
                "confirm task id column restored",
                l.task_id_header.clone(),
                timing.table_wait,
            ))
    }

    pub fn ascending_sort(&self) -> Scenario {
        let l = self.locators();
        let timing = &self.ctx.timing;

        let ids_ascending = {
            let gateway = self.ctx.gateway.clone();
            let rows = l.rows.clone();
            let link = l.row_task_link.clone();
            ScenarioStep::new("confirm task ids ascending", move || {
                let gateway = gateway.clone();
                let rows = rows.clone();
                let link = link.clone();
                async move {
                    let labels = gateway.read_child_texts(&rows, &link).await?;
                    Ok(labels
                        .iter()
                        .filter_map(|label| task_number(label))
                        .collect::<Vec<u64>>())
                }
            })
            .verify(|ids: &Vec<u64>| predicates::sorted_ascending(ids, 2), timing.table_wait)
        };

        Scenario::new("ascending-sort")
            .step(self.ctx.open_dashboard())
            .step(self.reset_if_present())
            .step(self.ensure_task_id_column())
            .step(self.ctx.expect_present(
                "confirm task id column shown",
                l.task_id_header.clone(),
                timing.table_wait,
            ))
            .step(self.ctx.click("open sort menu", l.sort_button.clone()))
            .step(self.ctx.expect_visible(
                "wait for sort menu",
                l.sort_menu.clone(),
                timing.menu_wait,
            ))
            .step({
                let gateway = self.ctx.gateway.clone();
                let asc = l.sort_ascending.clone();
                ScenarioStep::new("choose ascending", move || {
                    let gateway = gateway.clone();
                    let asc = asc.clone();
                    async move { gateway.click_first_visible(&asc).await }
                })
                .with_retry(timing.retry.clone())
            })
            .step(ids_ascending)
    }
}
