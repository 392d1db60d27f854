//! Terminal prompter: questions on stdout, answers from stdin.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use vidrelay_pipeline::{BoxFuture, Confirmation, Field, Notice, NoticeLevel, Prompter, Question};

/// Input that cancels a text prompt.
const CANCEL_INPUT: &str = "-";

/// Prompter reading answers line by line.
///
/// Closed input answers "no" and cancels text prompts. Input that was
/// already waiting when a timed question gave up is discarded before the
/// next question reads its answer.
pub struct ConsolePrompter<R = BufReader<Stdin>> {
    lines: Mutex<Lines<R>>,
    stale: AtomicBool,
}

impl ConsolePrompter {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> ConsolePrompter<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
            stale: AtomicBool::new(false),
        }
    }

    async fn read_line(&self) -> Option<String> {
        let mut lines = self.lines.lock().await;
        if self.stale.swap(false, Ordering::SeqCst) {
            discard_pending(&mut lines).await;
        }
        match lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read answer");
                None
            }
        }
    }
}

/// Drops every line that can be read without waiting.
///
/// A zero timeout still polls the read once, so buffered lines come back
/// ready and the loop stops at the first read that would block.
async fn discard_pending<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>) {
    while let Ok(Ok(Some(line))) = tokio::time::timeout(Duration::ZERO, lines.next_line()).await {
        tracing::debug!(input = %line, "discarding late answer");
    }
}

fn show(prompt: &str) {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "{prompt}");
    let _ = out.flush();
}

fn parse_yes(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn field_label(field: Field) -> &'static str {
    match field {
        Field::NewName => "name",
        Field::FolderName => "folder",
        Field::BacklogDirectory => "directory",
    }
}

impl<R: AsyncBufRead + Unpin + Send + 'static> Prompter for ConsolePrompter<R> {
    fn ask_yes_no<'a>(&'a self, _question: Question, text: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            show(&format!("{text} [y/N]: "));
            self.read_line().await.is_some_and(|line| parse_yes(&line))
        })
    }

    fn ask_yes_no_with_timeout<'a>(
        &'a self,
        _question: Question,
        text: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Confirmation> {
        Box::pin(async move {
            show(&format!("{text} [Y/n, accepted in {}s]: ", timeout.as_secs()));
            match tokio::time::timeout(timeout, self.read_line()).await {
                Err(_) => {
                    self.stale.store(true, Ordering::SeqCst);
                    println!();
                    Confirmation::TimedOut
                }
                Ok(None) => Confirmation::TimedOut,
                Ok(Some(line)) => {
                    let line = line.trim().to_ascii_lowercase();
                    if line.is_empty() || parse_yes(&line) {
                        Confirmation::Accepted
                    } else {
                        Confirmation::Rejected
                    }
                }
            }
        })
    }

    fn ask_string<'a>(
        &'a self,
        field: Field,
        text: &'a str,
        default: &'a str,
    ) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            show(&format!(
                "{text}\n  {} [{default}] ('{CANCEL_INPUT}' cancels): ",
                field_label(field)
            ));
            let line = self.read_line().await?;
            let line = line.trim();
            if line == CANCEL_INPUT {
                None
            } else if line.is_empty() {
                Some(default.to_string())
            } else {
                Some(line.to_string())
            }
        })
    }

    fn notify(&self, notice: Notice) {
        let tag = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        println!("[{tag}] {}: {}", notice.title, notice.message);
        tracing::debug!(title = %notice.title, level = tag, "notice shown");
    }
}
