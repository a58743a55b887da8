//! Multi-page result collection

use osprey_core::EffectiveOptions;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Position of the next page at the upstream source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// 1-based page number
    Page(u32),
    /// Opaque continuation token
    Token(String),
}

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when the source has no further pages
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    pub fn with_next(items: Vec<T>, next: Cursor) -> Self {
        Self {
            items,
            next: Some(next),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationPolicy {
    /// Maximum page requests per query
    pub limit: u32,
    /// Wait between page requests
    pub interval: Duration,
}

impl From<&EffectiveOptions> for PaginationPolicy {
    fn from(options: &EffectiveOptions) -> Self {
        Self {
            limit: options.pagination_limit,
            interval: Duration::from_secs(options.pagination_interval),
        }
    }
}

/// Request successive pages until the source runs out or `limit` is reached
///
/// The first call receives `None`. Any page error aborts collection.
pub async fn collect_pages<T, E, F, Fut>(policy: &PaginationPolicy, mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let limit = policy.limit.max(1);
    let mut items = Vec::new();
    let mut cursor = None;

    for page_no in 0..limit {
        if page_no > 0 && !policy.interval.is_zero() {
            tokio::time::sleep(policy.interval).await;
        }

        let page = fetch(cursor.take()).await?;
        debug!("Page {} returned {} items", page_no + 1, page.items.len());
        items.extend(page.items);

        match page.next {
            Some(next) => cursor = Some(next),
            None => return Ok(items),
        }
    }

    debug!("Pagination limit of {} pages reached", limit);
    Ok(items)
}
