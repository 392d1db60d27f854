//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::BoxFuture;
use crate::error::StoreError;
use crate::prompt::{Confirmation, Field, Notice, Prompter, Question};
use crate::store::{ChunkProgress, ObjectStore, ResumableUpload};
use crate::types::{RemoteFolder, RemoteObject};

type Step = Result<ChunkProgress, StoreError>;

pub fn progress(bytes_sent: u64, bytes_total: u64) -> Step {
    Ok(ChunkProgress::Progress {
        bytes_sent,
        bytes_total,
    })
}

pub fn done(id: &str, name: &str) -> Step {
    Ok(ChunkProgress::Done(RemoteObject {
        id: id.into(),
        name: name.into(),
        web_link: Some(format!("https://store.test/{id}")),
        sha256: None,
    }))
}

pub fn remote_error(message: &str, transient: bool) -> Step {
    Err(StoreError::Remote {
        message: message.into(),
        transient,
    })
}

/// Store with a fixed folder list and one scripted step list per session.
///
/// Sessions without a script finish on their first chunk.
pub struct MockStore {
    folders: Vec<RemoteFolder>,
    listing_failures: AtomicUsize,
    session_failures: AtomicUsize,
    list_calls: AtomicUsize,
    scripts: Mutex<VecDeque<Vec<Step>>>,
    sessions: Mutex<Vec<(String, String, PathBuf)>>,
}

impl MockStore {
    pub fn new(folders: Vec<RemoteFolder>) -> Self {
        Self {
            folders,
            listing_failures: AtomicUsize::new(0),
            session_failures: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            scripts: Mutex::new(VecDeque::new()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_listings(&self, count: usize) {
        self.listing_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_sessions(&self, count: usize) {
        self.session_failures.store(count, Ordering::SeqCst);
    }

    pub fn push_session(&self, steps: Vec<Step>) {
        self.scripts.lock().unwrap().push_back(steps);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// `(name, parent_id, local_path)` of every opened session.
    pub fn sessions(&self) -> Vec<(String, String, PathBuf)> {
        self.sessions.lock().unwrap().clone()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ObjectStore for MockStore {
    fn label(&self) -> &str {
        "mock"
    }

    fn list_folders(&self) -> BoxFuture<'_, Result<Vec<RemoteFolder>, StoreError>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if Self::take_failure(&self.listing_failures) {
                return Err(StoreError::Remote {
                    message: "listing unavailable".into(),
                    transient: true,
                });
            }
            Ok(self.folders.clone())
        })
    }

    fn create_resumable_upload<'a>(
        &'a self,
        name: &'a str,
        parent_id: &'a str,
        local_path: &'a Path,
    ) -> BoxFuture<'a, Result<Box<dyn ResumableUpload>, StoreError>> {
        Box::pin(async move {
            if Self::take_failure(&self.session_failures) {
                return Err(StoreError::Remote {
                    message: "session refused".into(),
                    transient: false,
                });
            }
            let n = {
                let mut sessions = self.sessions.lock().unwrap();
                sessions.push((name.to_string(), parent_id.to_string(), local_path.to_path_buf()));
                sessions.len()
            };
            let steps = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| vec![done(&format!("obj-{n}"), name)]);
            let upload: Box<dyn ResumableUpload> = Box::new(MockUpload {
                steps: steps.into(),
            });
            Ok(upload)
        })
    }
}

struct MockUpload {
    steps: VecDeque<Step>,
}

impl ResumableUpload for MockUpload {
    fn send_next_chunk(&mut self) -> BoxFuture<'_, Result<ChunkProgress, StoreError>> {
        Box::pin(async move {
            self.steps.pop_front().unwrap_or_else(|| {
                Err(StoreError::Remote {
                    message: "script exhausted".into(),
                    transient: false,
                })
            })
        })
    }
}

/// Prompter answering from queues and recording what it was asked.
///
/// Empty queues answer "no", time out, and accept string defaults.
#[derive(Default)]
pub struct ScriptedPrompter {
    yes_no: Mutex<VecDeque<bool>>,
    confirmations: Mutex<VecDeque<Confirmation>>,
    strings: Mutex<VecDeque<Option<String>>>,
    questions: Mutex<Vec<Question>>,
    timeouts: Mutex<Vec<Duration>>,
    fields: Mutex<Vec<Field>>,
    string_defaults: Mutex<Vec<String>>,
    notices: Mutex<Vec<Notice>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_yes_no(&self, answer: bool) {
        self.yes_no.lock().unwrap().push_back(answer);
    }

    pub fn push_confirmation(&self, answer: Confirmation) {
        self.confirmations.lock().unwrap().push_back(answer);
    }

    pub fn push_string(&self, answer: Option<String>) {
        self.strings.lock().unwrap().push_back(answer);
    }

    pub fn questions(&self) -> Vec<Question> {
        self.questions.lock().unwrap().clone()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }

    pub fn fields(&self) -> Vec<Field> {
        self.fields.lock().unwrap().clone()
    }

    pub fn string_defaults(&self) -> Vec<String> {
        self.string_defaults.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn ask_yes_no<'a>(&'a self, question: Question, _text: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            self.questions.lock().unwrap().push(question);
            self.yes_no.lock().unwrap().pop_front().unwrap_or(false)
        })
    }

    fn ask_yes_no_with_timeout<'a>(
        &'a self,
        question: Question,
        _text: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Confirmation> {
        Box::pin(async move {
            self.questions.lock().unwrap().push(question);
            self.timeouts.lock().unwrap().push(timeout);
            self.confirmations
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Confirmation::TimedOut)
        })
    }

    fn ask_string<'a>(
        &'a self,
        field: Field,
        _text: &'a str,
        default: &'a str,
    ) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            self.fields.lock().unwrap().push(field);
            self.string_defaults.lock().unwrap().push(default.to_string());
            self.strings
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Some(default.to_string()))
        })
    }

    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}
