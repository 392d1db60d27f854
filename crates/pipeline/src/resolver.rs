//! Destination resolution: which remote folder a file goes to.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::prompt::{Confirmation, Field, Prompter, Question};
use crate::store::ObjectStore;
use crate::types::{DestinationChoice, RemoteFolder};

/// Lowercases and collapses runs of `_`, `-` and whitespace to one space.
pub(crate) fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for c in name.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Returns the first folder whose normalized name contains the normalized
/// `hint`. An empty hint matches nothing.
pub fn find_match<'a>(folders: &'a [RemoteFolder], hint: &str) -> Option<&'a RemoteFolder> {
    let needle = normalize_name(hint);
    if needle.is_empty() {
        return None;
    }
    folders
        .iter()
        .find(|folder| normalize_name(&folder.name).contains(&needle))
}

/// Picks a destination folder, suggesting a match and falling back to asking.
pub struct DestinationResolver<'a> {
    prompter: &'a dyn Prompter,
    confirm_timeout: Duration,
}

impl<'a> DestinationResolver<'a> {
    pub fn new(prompter: &'a dyn Prompter, confirm_timeout: Duration) -> Self {
        Self {
            prompter,
            confirm_timeout,
        }
    }

    pub async fn resolve(&self, folders: &[RemoteFolder], hint: &str) -> DestinationChoice {
        let Some(first) = folders.first() else {
            warn!("no destination folders available");
            return DestinationChoice::Declined;
        };

        if let Some(candidate) = find_match(folders, hint) {
            let text = format!("Upload to folder '{}'?", candidate.name);
            let answer = self
                .prompter
                .ask_yes_no_with_timeout(Question::ConfirmFolder, &text, self.confirm_timeout)
                .await;
            debug!(folder = %candidate.name, ?answer, "folder suggestion answered");
            if matches!(answer, Confirmation::Accepted | Confirmation::TimedOut) {
                info!(folder = %candidate.name, hint, "destination resolved");
                return DestinationChoice::Folder(candidate.clone());
            }
        } else {
            debug!(hint, "no folder matches hint");
        }

        let Some(answer) = self
            .prompter
            .ask_string(Field::FolderName, "Enter the destination folder name", &first.name)
            .await
        else {
            info!("folder selection cancelled");
            return DestinationChoice::Declined;
        };

        let answer = answer.trim();
        match folders.iter().find(|folder| folder.name == answer) {
            Some(folder) => {
                info!(folder = %folder.name, "destination chosen by name");
                DestinationChoice::Folder(folder.clone())
            }
            None => {
                warn!(answer, "no folder with that name");
                DestinationChoice::Declined
            }
        }
    }
}

/// Lists folders, offering a retry after each failure. Giving up yields an
/// empty list.
pub async fn list_folders_with_retry(store: &dyn ObjectStore, prompter: &dyn Prompter) -> Vec<RemoteFolder> {
    loop {
        match store.list_folders().await {
            Ok(folders) => {
                debug!(store = store.label(), count = folders.len(), "listed folders");
                return folders;
            }
            Err(e) => {
                warn!(store = store.label(), error = %e, "folder listing failed");
                if !ask_retry_listing(prompter, &e).await {
                    return Vec::new();
                }
            }
        }
    }
}

async fn ask_retry_listing(prompter: &dyn Prompter, error: &StoreError) -> bool {
    let text = format!("Could not list destination folders ({error}). Retry?");
    prompter.ask_yes_no(Question::RetryListing, &text).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockStore, ScriptedPrompter};

    fn folders() -> Vec<RemoteFolder> {
        vec![
            RemoteFolder::new("1", "APStat Unit7"),
            RemoteFolder::new("2", "APStat Unit7 Extras"),
            RemoteFolder::new("3", "Calculus"),
        ]
    }

    #[test]
    fn normalization_collapses_separators() {
        assert_eq!(normalize_name("apstat_unit7"), "apstat unit7");
        assert_eq!(normalize_name("  APStat -- Unit7 "), "apstat unit7");
        assert_eq!(normalize_name("___"), "");
    }

    #[test]
    fn first_match_wins() {
        let folders = folders();
        for _ in 0..3 {
            assert_eq!(find_match(&folders, "apstat_unit7").unwrap().id, "1");
        }
        assert_eq!(find_match(&folders, "CALC").unwrap().id, "3");
        assert!(find_match(&folders, "biology").is_none());
        assert!(find_match(&folders, "").is_none());
    }

    #[tokio::test]
    async fn timeout_accepts_suggestion() {
        let prompter = ScriptedPrompter::new();
        prompter.push_confirmation(Confirmation::TimedOut);
        let resolver = DestinationResolver::new(&prompter, Duration::from_secs(5));

        let folders = vec![RemoteFolder::new("1", "APStat Unit7")];
        let choice = resolver.resolve(&folders, "apstat_unit7").await;

        assert_eq!(choice, DestinationChoice::Folder(folders[0].clone()));
        assert_eq!(prompter.timeouts(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn rejection_falls_back_to_name() {
        let prompter = ScriptedPrompter::new();
        prompter.push_confirmation(Confirmation::Rejected);
        prompter.push_string(Some("Calculus".into()));
        let resolver = DestinationResolver::new(&prompter, Duration::from_secs(5));

        let choice = resolver.resolve(&folders(), "apstat_unit7").await;
        assert_eq!(choice, DestinationChoice::Folder(RemoteFolder::new("3", "Calculus")));
        assert_eq!(prompter.string_defaults(), vec!["APStat Unit7".to_string()]);
    }

    #[tokio::test]
    async fn unmatched_name_declines() {
        let prompter = ScriptedPrompter::new();
        prompter.push_string(Some("calculus".into()));
        let resolver = DestinationResolver::new(&prompter, Duration::from_secs(5));

        // No suggestion for this hint; the typed name must match exactly.
        let choice = resolver.resolve(&folders(), "biology").await;
        assert_eq!(choice, DestinationChoice::Declined);
        assert!(prompter.timeouts().is_empty());
    }

    #[tokio::test]
    async fn cancelled_name_declines() {
        let prompter = ScriptedPrompter::new();
        prompter.push_string(None);
        let resolver = DestinationResolver::new(&prompter, Duration::from_secs(5));
        assert_eq!(
            resolver.resolve(&folders(), "biology").await,
            DestinationChoice::Declined
        );
    }

    #[tokio::test]
    async fn empty_listing_declines_without_prompt() {
        let prompter = ScriptedPrompter::new();
        let resolver = DestinationResolver::new(&prompter, Duration::from_secs(5));
        assert_eq!(resolver.resolve(&[], "anything").await, DestinationChoice::Declined);
        assert!(prompter.questions().is_empty());
        assert!(prompter.string_defaults().is_empty());
    }

    #[tokio::test]
    async fn listing_retries_until_cancelled() {
        let store = MockStore::new(folders());
        store.fail_listings(2);
        let prompter = ScriptedPrompter::new();
        prompter.push_yes_no(true);
        prompter.push_yes_no(false);

        let listed = list_folders_with_retry(&store, &prompter).await;
        assert!(listed.is_empty());
        assert_eq!(store.list_calls(), 2);
        assert_eq!(
            prompter.questions(),
            vec![Question::RetryListing, Question::RetryListing]
        );
    }

    #[tokio::test]
    async fn listing_retry_succeeds() {
        let store = MockStore::new(folders());
        store.fail_listings(1);
        let prompter = ScriptedPrompter::new();
        prompter.push_yes_no(true);

        let listed = list_folders_with_retry(&store, &prompter).await;
        assert_eq!(listed.len(), 3);
        assert_eq!(store.list_calls(), 2);
    }
}
