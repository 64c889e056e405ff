//! Best-effort chat display-name backfill.
//!
//! Chats arrive from the bridge with an id but often no name. A sync cycle
//! pages over the currently-nameless chats, asks the external directory for
//! their names, and patches only rows whose name is still missing. Each
//! distinct chat id is looked up at most once per cycle, and a directory
//! outage degrades to "names stay missing" rather than failing the run.

use std::collections::HashSet;

use {async_trait::async_trait, tracing::warn};

use crate::store::ContentStore;

/// One directory answer: a resolved name, or a recorded miss.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub id: String,
    pub name: Option<String>,
    pub success: bool,
}

/// External directory/metadata lookup for chat names.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn lookup(&self, ids: &[String]) -> anyhow::Result<Vec<DirectoryEntry>>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NameSyncReport {
    pub looked_up: usize,
    pub patched: usize,
    pub unresolved: usize,
}

/// Run one name-sync cycle.
pub async fn sync_chat_names(
    store: &dyn ContentStore,
    directory: &dyn Directory,
    page_size: i64,
) -> anyhow::Result<NameSyncReport> {
    let mut report = NameSyncReport::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut after: Option<String> = None;

    loop {
        let page = store.unnamed_chats(page_size, after.as_deref()).await?;
        let Some(last) = page.last().cloned() else {
            break;
        };

        let ids: Vec<String> = page
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect();

        if !ids.is_empty() {
            let entries = match directory.lookup(&ids).await {
                Ok(entries) => entries,
                Err(err) => {
                    // Directory unreachable: leave the remaining chats
                    // nameless and report what was done so far.
                    warn!(error = %err, "chat directory lookup failed, aborting name sync");
                    return Ok(report);
                },
            };
            report.looked_up += ids.len();

            for entry in entries {
                match entry.name {
                    Some(name) if entry.success => {
                        if store.set_chat_name_if_missing(&entry.id, &name).await? {
                            report.patched += 1;
                        }
                    },
                    _ => report.unresolved += 1,
                }
            }
        }

        let full_page = page.len() as i64 == page_size;
        after = Some(last);
        if !full_page {
            break;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::sqlite::SqliteContentStore;

    /// Directory that resolves ids ending in "-known" and records every
    /// id it was asked about.
    struct FakeDirectory {
        asked: Arc<std::sync::Mutex<Vec<String>>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeDirectory {
        fn new() -> Self {
            Self {
                asked: Arc::new(std::sync::Mutex::new(Vec::new())),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Directory for FakeDirectory {
        async fn lookup(&self, ids: &[String]) -> anyhow::Result<Vec<DirectoryEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.asked.lock().unwrap().extend(ids.iter().cloned());
            Ok(ids
                .iter()
                .map(|id| {
                    if id.ends_with("-known") {
                        DirectoryEntry {
                            id: id.clone(),
                            name: Some(format!("Name of {id}")),
                            success: true,
                        }
                    } else {
                        DirectoryEntry {
                            id: id.clone(),
                            name: None,
                            success: false,
                        }
                    }
                })
                .collect())
        }
    }

    struct FailingDirectory;

    #[async_trait]
    impl Directory for FailingDirectory {
        async fn lookup(&self, _ids: &[String]) -> anyhow::Result<Vec<DirectoryEntry>> {
            anyhow::bail!("directory unreachable")
        }
    }

    #[tokio::test]
    async fn resolves_and_patches_only_missing_names() {
        let store = SqliteContentStore::open_in_memory().await.unwrap();
        store.upsert_chat("a-known", None).await.unwrap();
        store.upsert_chat("b-unknown", None).await.unwrap();
        store.upsert_chat("c-named", Some("Already")).await.unwrap();

        let directory = FakeDirectory::new();
        let report = sync_chat_names(&store, &directory, 10).await.unwrap();

        assert_eq!(report.patched, 1);
        assert_eq!(report.unresolved, 1);
        // The already-named chat was never looked up.
        assert!(
            !directory
                .asked
                .lock()
                .unwrap()
                .contains(&"c-named".to_string())
        );
    }

    #[tokio::test]
    async fn each_unresolved_id_looked_up_once_per_cycle() {
        let store = SqliteContentStore::open_in_memory().await.unwrap();
        for i in 0..5 {
            store
                .upsert_chat(&format!("chat-{i}-unknown"), None)
                .await
                .unwrap();
        }

        let directory = FakeDirectory::new();
        sync_chat_names(&store, &directory, 2).await.unwrap();

        let asked = directory.asked.lock().unwrap().clone();
        let distinct: HashSet<&String> = asked.iter().collect();
        assert_eq!(asked.len(), distinct.len(), "no id looked up twice");
        assert_eq!(distinct.len(), 5);
    }

    #[tokio::test]
    async fn directory_outage_degrades_gracefully() {
        let store = SqliteContentStore::open_in_memory().await.unwrap();
        store.upsert_chat("x-known", None).await.unwrap();

        let report = sync_chat_names(&store, &FailingDirectory, 10).await.unwrap();
        assert_eq!(report, NameSyncReport::default());
        // Chat is still nameless, ready for the next cycle.
        assert_eq!(store.unnamed_chats(10, None).await.unwrap().len(), 1);
    }
}
