/// Which collection the single-page client is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    #[default]
    Chat,
    Tasks,
}

/// Tab-scoped view state: the active mode, the compose drafts, and a
/// display-only mirror of the send gate. Holds nothing persistent and
/// issues no requests; the stores stay authoritative.
#[derive(Debug, Default)]
pub struct UiModeController {
    mode: UiMode,
    message_draft: String,
    task_title_draft: String,
    task_description_draft: String,
    sending: bool,
}

impl UiModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    /// Explicit user selection is the only transition. Switching never
    /// cancels or alters work the other mode's store has in flight.
    pub fn switch_to(&mut self, mode: UiMode) {
        self.mode = mode;
    }

    pub fn message_draft(&self) -> &str {
        &self.message_draft
    }

    pub fn set_message_draft(&mut self, text: impl Into<String>) {
        self.message_draft = text.into();
    }

    /// Hands the draft to the submit path and clears it.
    pub fn take_message_draft(&mut self) -> String {
        std::mem::take(&mut self.message_draft)
    }

    pub fn task_title_draft(&self) -> &str {
        &self.task_title_draft
    }

    pub fn task_description_draft(&self) -> &str {
        &self.task_description_draft
    }

    pub fn set_task_draft(&mut self, title: impl Into<String>, description: impl Into<String>) {
        self.task_title_draft = title.into();
        self.task_description_draft = description.into();
    }

    pub fn take_task_draft(&mut self) -> (String, String) {
        (
            std::mem::take(&mut self.task_title_draft),
            std::mem::take(&mut self.task_description_draft),
        )
    }

    /// Display-only; the store's per-conversation gate is what actually
    /// blocks overlapping sends.
    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn set_sending(&mut self, sending: bool) {
        self.sending = sending;
    }
}
