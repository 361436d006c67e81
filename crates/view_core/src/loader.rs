use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::domain::Record;
use tracing::debug;

use crate::PageLoader;

/// Serves an already-loaded dataset in fixed-size pages; the in-memory
/// equivalent of a paginated backend.
pub struct StaticPageLoader {
    pages: Mutex<VecDeque<Vec<Record>>>,
}

impl StaticPageLoader {
    pub fn new(records: Vec<Record>, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let pages = records.chunks(per_page).map(<[Record]>::to_vec).collect();
        Self {
            pages: Mutex::new(pages),
        }
    }

    fn lock_pages(&self) -> MutexGuard<'_, VecDeque<Vec<Record>>> {
        self.pages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PageLoader for StaticPageLoader {
    fn has_more(&self) -> bool {
        !self.lock_pages().is_empty()
    }

    async fn next_page(&self) -> Result<Vec<Record>> {
        Ok(self.lock_pages().pop_front().unwrap_or_default())
    }
}

/// Fetches JSON record pages from an HTTP endpoint:
/// `GET {base_url}?page=N&per_page=M` returning a JSON array. A page
/// shorter than `per_page` marks the source exhausted.
pub struct HttpPageLoader {
    http: Client,
    base_url: String,
    per_page: usize,
    next_page: AtomicUsize,
    exhausted: AtomicBool,
}

impl HttpPageLoader {
    pub fn new(base_url: impl Into<String>, per_page: usize) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            per_page: per_page.max(1),
            next_page: AtomicUsize::new(1),
            exhausted: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PageLoader for HttpPageLoader {
    fn has_more(&self) -> bool {
        !self.exhausted.load(Ordering::SeqCst)
    }

    async fn next_page(&self) -> Result<Vec<Record>> {
        let page = self.next_page.load(Ordering::SeqCst);
        let records: Vec<Record> = self
            .http
            .get(&self.base_url)
            .query(&[
                ("page", page.to_string()),
                ("per_page", self.per_page.to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("failed to fetch page {page} from {}", self.base_url))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("invalid page payload from {}", self.base_url))?;

        // The page slot is consumed only once the fetch lands, so a
        // failed request leaves the cursor on the same page and the
        // next call retries it instead of skipping records.
        self.next_page.store(page + 1, Ordering::SeqCst);
        if records.len() < self.per_page {
            self.exhausted.store(true, Ordering::SeqCst);
        }
        debug!(page, fetched = records.len(), "fetched dataset page");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(count: usize) -> Vec<Record> {
        (1..=count as i64).map(Record::new).collect()
    }

    #[tokio::test]
    async fn static_loader_pages_through_the_dataset() {
        let loader = StaticPageLoader::new(records(5), 2);

        assert!(loader.has_more());
        assert_eq!(loader.next_page().await.expect("page 1").len(), 2);
        assert_eq!(loader.next_page().await.expect("page 2").len(), 2);
        assert!(loader.has_more());
        assert_eq!(loader.next_page().await.expect("page 3").len(), 1);
        assert!(!loader.has_more());
    }

    #[tokio::test]
    async fn static_loader_is_empty_for_an_empty_dataset() {
        let loader = StaticPageLoader::new(Vec::new(), 10);
        assert!(!loader.has_more());
        assert!(loader.next_page().await.expect("page").is_empty());
    }

    #[tokio::test]
    async fn static_loader_treats_zero_page_size_as_one() {
        let loader = StaticPageLoader::new(records(2), 0);
        assert_eq!(loader.next_page().await.expect("page").len(), 1);
        assert!(loader.has_more());
    }
}
