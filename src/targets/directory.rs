//! Enterprise organization discovery.
//!
//! Pages are pulled lazily through the GraphQL `hasNextPage`/`endCursor`
//! contract. Every [`DirectoryLister::list`] starts again from a null cursor;
//! nothing carries over between calls.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::{self, Stream, TryStreamExt};
use tracing::{debug, warn};

use super::normalize_org;
use crate::api::{ApiError, OrgPage, RoleProvider};

/// GitHub's maximum page size for organization connections
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Pagination state threaded through the page stream
struct PageCursor {
    cursor: Option<String>,
    fetched: usize,
    done: bool,
}

/// Lists the organizations of an enterprise
pub struct DirectoryLister {
    provider: Arc<dyn RoleProvider>,
    page_size: usize,
    max_count: Option<usize>,
}

impl DirectoryLister {
    pub fn new(provider: Arc<dyn RoleProvider>) -> Self {
        Self {
            provider,
            page_size: DEFAULT_PAGE_SIZE,
            max_count: None,
        }
    }

    /// Set the requested page size, clamped to `1..=DEFAULT_PAGE_SIZE`
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
        self
    }

    /// Stop once this many organizations have been fetched
    pub fn with_max_count(mut self, max_count: Option<usize>) -> Self {
        self.max_count = max_count;
        self
    }

    /// Stream the raw pages for `enterprise`.
    ///
    /// Ends after a page without a successor, or once `max_count` names have
    /// been fetched. When bounded, each request asks for
    /// `min(page_size, max_count - fetched)`. The first failing page ends the
    /// stream with its error.
    pub fn pages(&self, enterprise: &str) -> impl Stream<Item = Result<OrgPage, ApiError>> {
        let provider = Arc::clone(&self.provider);
        let enterprise = enterprise.to_string();
        let page_size = self.page_size;
        let max_count = self.max_count;

        let start = PageCursor {
            cursor: None,
            fetched: 0,
            done: false,
        };

        stream::try_unfold(start, move |state| {
            let provider = Arc::clone(&provider);
            let enterprise = enterprise.clone();
            async move {
                if state.done {
                    return Ok(None);
                }
                let request = match max_count {
                    Some(max) => page_size.min(max.saturating_sub(state.fetched)),
                    None => page_size,
                };
                if request == 0 {
                    return Ok(None);
                }

                let page = provider
                    .list_enterprise_organizations(&enterprise, state.cursor.as_deref(), request)
                    .await?;

                let fetched = state.fetched + page.names.len();
                let mut done = !page.has_next_page || max_count.is_some_and(|max| fetched >= max);
                if !done && page.end_cursor.is_none() {
                    warn!(%enterprise, "Page reported more results without a cursor, stopping");
                    done = true;
                }
                debug!(%enterprise, fetched, done, "Fetched organization page");

                let next = PageCursor {
                    cursor: page.end_cursor.clone(),
                    fetched,
                    done,
                };
                Ok::<_, ApiError>(Some((page, next)))
            }
        })
    }

    /// Collect the normalized, deduplicated organizations of `enterprise` in
    /// listing order.
    ///
    /// `on_progress` receives the number of organizations collected so far
    /// after every successful page. Any page failure aborts the whole listing.
    pub async fn list(
        &self,
        enterprise: &str,
        mut on_progress: impl FnMut(usize),
    ) -> Result<Vec<String>, ApiError> {
        let mut seen = HashSet::new();
        let mut orgs = Vec::new();

        let mut pages = std::pin::pin!(self.pages(enterprise));

        while let Some(page) = pages.try_next().await? {
            for name in page.names {
                let org = normalize_org(&name);
                if !org.is_empty() && seen.insert(org.clone()) {
                    orgs.push(org);
                }
            }
            if let Some(max) = self.max_count {
                orgs.truncate(max);
            }
            on_progress(orgs.len());
        }

        Ok(orgs)
    }
}
