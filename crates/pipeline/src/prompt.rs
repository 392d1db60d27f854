//! User interaction seam.
//!
//! The pipeline never talks to a terminal or a dialog directly. Every
//! question goes through [`Prompter`]; the application decides how it is
//! shown (console, GUI, or canned answers for headless runs).

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::BoxFuture;

/// Yes/no questions the pipeline may ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Question {
    /// Accept the suggested destination folder.
    ConfirmFolder,
    /// Folder listing failed; try again?
    RetryListing,
    /// Upload failed; start it over?
    RetryUpload,
    /// Upload finished; delete the local copy?
    DeleteLocal,
    /// Files were already waiting at startup; upload them (no = move aside)?
    ProcessBacklog,
    /// Credentials or watch directory missing; try again?
    RetrySetup,
}

/// Free-text fields the pipeline may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    NewName,
    FolderName,
    BacklogDirectory,
}

/// Answer to a question that may time out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Accepted,
    Rejected,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A one-way message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, title, message)
    }

    fn new(level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Interactive collaborator.
pub trait Prompter: Send + Sync {
    fn ask_yes_no<'a>(&'a self, question: Question, text: &'a str) -> BoxFuture<'a, bool>;

    /// Asks a yes/no question that resolves to [`Confirmation::TimedOut`]
    /// after `timeout` without an answer.
    fn ask_yes_no_with_timeout<'a>(
        &'a self,
        question: Question,
        text: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Confirmation>;

    /// Asks for a string pre-filled with `default`. `None` means the user
    /// cancelled.
    fn ask_string<'a>(
        &'a self,
        field: Field,
        text: &'a str,
        default: &'a str,
    ) -> BoxFuture<'a, Option<String>>;

    fn notify(&self, notice: Notice);
}

/// Canned answers for [`AutoPrompter`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutoAnswers {
    pub process_backlog: bool,
    pub delete_local: bool,
    pub retry_listing: bool,
    pub retry_upload: bool,
    pub retry_setup: bool,
    /// Folder used when no suggestion matches. `None` declines the file.
    pub fallback_folder: Option<String>,
}

impl Default for AutoAnswers {
    fn default() -> Self {
        Self {
            process_backlog: true,
            delete_local: false,
            retry_listing: false,
            retry_upload: false,
            retry_setup: false,
            fallback_folder: None,
        }
    }
}

/// Non-interactive prompter for headless runs.
///
/// Folder suggestions always time out (and are therefore accepted), file
/// names keep their defaults, and notices go to the log.
#[derive(Debug, Clone, Default)]
pub struct AutoPrompter {
    answers: AutoAnswers,
}

impl AutoPrompter {
    pub fn new(answers: AutoAnswers) -> Self {
        Self { answers }
    }

    pub fn answers(&self) -> &AutoAnswers {
        &self.answers
    }

    fn answer(&self, question: Question) -> bool {
        match question {
            Question::ConfirmFolder => true,
            Question::RetryListing => self.answers.retry_listing,
            Question::RetryUpload => self.answers.retry_upload,
            Question::DeleteLocal => self.answers.delete_local,
            Question::ProcessBacklog => self.answers.process_backlog,
            Question::RetrySetup => self.answers.retry_setup,
        }
    }
}

impl Prompter for AutoPrompter {
    fn ask_yes_no<'a>(&'a self, question: Question, text: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let answer = self.answer(question);
            info!(?question, answer, "{text}");
            answer
        })
    }

    fn ask_yes_no_with_timeout<'a>(
        &'a self,
        question: Question,
        text: &'a str,
        _timeout: Duration,
    ) -> BoxFuture<'a, Confirmation> {
        Box::pin(async move {
            info!(?question, "{text} (auto: timed out)");
            Confirmation::TimedOut
        })
    }

    fn ask_string<'a>(
        &'a self,
        field: Field,
        text: &'a str,
        default: &'a str,
    ) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            let answer = match field {
                Field::NewName | Field::BacklogDirectory => Some(default.to_string()),
                Field::FolderName => self.answers.fallback_folder.clone(),
            };
            info!(?field, answer = ?answer, "{text}");
            answer
        })
    }

    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => info!(title = %notice.title, "{}", notice.message),
            NoticeLevel::Warning => warn!(title = %notice.title, "{}", notice.message),
            NoticeLevel::Error => error!(title = %notice.title, "{}", notice.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auto_prompter_uses_configured_answers() {
        let prompter = AutoPrompter::new(AutoAnswers {
            delete_local: true,
            process_backlog: false,
            fallback_folder: Some("Inbox".into()),
            ..AutoAnswers::default()
        });

        assert!(prompter.ask_yes_no(Question::DeleteLocal, "delete?").await);
        assert!(!prompter.ask_yes_no(Question::ProcessBacklog, "process?").await);
        assert!(!prompter.ask_yes_no(Question::RetryUpload, "retry?").await);
        assert_eq!(
            prompter
                .ask_yes_no_with_timeout(Question::ConfirmFolder, "ok?", Duration::from_secs(5))
                .await,
            Confirmation::TimedOut
        );
        assert_eq!(
            prompter.ask_string(Field::NewName, "name?", "clip.mp4").await.as_deref(),
            Some("clip.mp4")
        );
        assert_eq!(
            prompter.ask_string(Field::FolderName, "folder?", "Unit 1").await.as_deref(),
            Some("Inbox")
        );
    }

    #[test]
    fn auto_answers_deserialize_partially() {
        let answers: AutoAnswers = serde_json::from_str(r#"{"delete_local": true}"#).unwrap();
        assert!(answers.delete_local);
        assert!(answers.process_backlog);
        assert_eq!(answers.fallback_folder, None);
    }
}
