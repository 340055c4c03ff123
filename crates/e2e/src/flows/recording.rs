//! Doctor audio recording workflow

use super::FlowContext;
use crate::gateway::Locator;
use crate::runner::{Scenario, ScenarioStep};

/// Notification shown once an upload has started a workflow
pub const UPLOAD_NOTICE: &str = "Audio uploaded and workflow started!";

#[derive(Debug, Clone)]
pub struct RecordingLocators {
    pub record: Locator,
    pub pause: Locator,
    pub timer: Locator,
    pub review: Locator,
    pub review_dialog: Locator,
    pub upload: Locator,
    /// Closes the review dialog and resumes recording
    pub record_again: Locator,
    pub upload_notice: Locator,
}

impl Default for RecordingLocators {
    fn default() -> Self {
        Self {
            record: Locator::xpath("//button[contains(., 'Record')]"),
            pause: Locator::xpath(concat!(
                "//button[.//*[name()='svg' and @aria-hidden='true']",
                "[.//*[name()='rect'][@rx='1']]]",
            )),
            timer: Locator::xpath(
                "//p[contains(@class, 'gap-5') and contains(@class, 'items-center')]",
            ),
            review: Locator::xpath("//button[contains(., 'Review')]"),
            review_dialog: Locator::xpath(
                "//div[@role='dialog' and contains(., 'Review Recordings')]",
            ),
            upload: Locator::xpath(
                "//div[@role='dialog']//button[contains(., 'Upload Recordings')]",
            ),
            record_again: Locator::xpath(
                "//div[@role='dialog']//button[contains(., 'Record Again')]",
            ),
            upload_notice: Locator::xpath(format!("//div[contains(text(),'{}')]", UPLOAD_NOTICE)),
        }
    }
}

/// Whether a recording timer such as `00:03` has moved past zero
pub fn timer_running(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit() && c != '0')
}

pub struct RecordingFlow {
    ctx: FlowContext,
    locators: RecordingLocators,
}

impl RecordingFlow {
    pub fn new(ctx: FlowContext) -> Self {
        Self {
            ctx,
            locators: RecordingLocators::default(),
        }
    }

    fn timer_advancing(&self) -> ScenarioStep<String> {
        let gateway = self.ctx.gateway.clone();
        let timer = self.locators.timer.clone();
        ScenarioStep::new("wait for timer to advance", move || {
            let gateway = gateway.clone();
            let timer = timer.clone();
            async move { gateway.read_text(&timer).await }
        })
        .verify(|text: &String| timer_running(text), self.ctx.timing.table_wait)
    }

    /// Start recording and wait until the timer moves
    fn start(&self, scenario: Scenario) -> Scenario {
        let l = &self.locators;
        let wait = self.ctx.timing.element_wait;
        scenario
            .step(self.ctx.click("start recording", l.record.clone()))
            .step(self.ctx.expect_visible("confirm timer visible", l.timer.clone(), wait))
            .step(self.timer_advancing())
    }

    /// Pause the running recording and open the review dialog
    fn pause_and_review(&self, scenario: Scenario) -> Scenario {
        let l = &self.locators;
        let wait = self.ctx.timing.element_wait;
        scenario
            .step(self.ctx.click("pause recording", l.pause.clone()))
            .step(self.ctx.expect_visible("confirm review available", l.review.clone(), wait))
            .step(self.ctx.click("open review", l.review.clone()))
            .step(self.ctx.expect_visible("confirm review dialog", l.review_dialog.clone(), wait))
    }

    /// Upload from the open review dialog and wait for the notification
    fn upload(&self, scenario: Scenario) -> Scenario {
        let l = &self.locators;
        let wait = self.ctx.timing.table_wait;
        scenario
            .step(self.ctx.click("upload recordings", l.upload.clone()))
            .step(self.ctx.expect_absent(
                "confirm review dialog closed",
                l.review_dialog.clone(),
                wait,
            ))
            .step(self.ctx.expect_visible(
                "confirm upload notification",
                l.upload_notice.clone(),
                wait,
            ))
    }

    /// Record a clip, pause, review and upload it
    pub fn record_and_upload(&self) -> Scenario {
        let scenario = Scenario::new("recording").step(self.ctx.open_dashboard());
        self.upload(self.pause_and_review(self.start(scenario)))
    }

    /// Record, review, choose Record Again, then pause, review and upload
    pub fn record_again_and_upload(&self) -> Scenario {
        let l = &self.locators;
        let timing = &self.ctx.timing;
        let scenario = Scenario::new("record-again").step(self.ctx.open_dashboard());
        let scenario = self
            .pause_and_review(self.start(scenario))
            .step(self.ctx.click("record again", l.record_again.clone()))
            .step(self.ctx.expect_absent(
                "confirm review dialog dismissed",
                l.review_dialog.clone(),
                timing.element_wait,
            ))
            .step(self.ctx.expect_visible(
                "confirm recording resumed",
                l.pause.clone(),
                timing.element_wait,
            ));
        self.upload(self.pause_and_review(scenario))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_running() {
        assert!(!timer_running("00:00"));
        assert!(timer_running("00:03"));
        assert!(timer_running("0:10"));
        assert!(!timer_running(""));
    }
}
