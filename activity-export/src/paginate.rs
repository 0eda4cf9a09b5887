use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, error};

use crate::client::{ApiClient, Payload};
use crate::window::query_separator;

pub fn page_url(base_url: &str, page: u32, per_page: u32) -> String {
    format!(
        "{base_url}{}page={page}&per_page={per_page}",
        query_separator(base_url)
    )
}

/// Lazily walk a list endpoint page by page, starting at page 1.
///
/// The stream ends on the first empty page or the first response that isn't
/// a list; an object body is dropped rather than yielded. A failed request
/// also ends the stream, so a transient failure truncates the result. That
/// is logged at error level with the page it happened on.
pub fn fetch_all(client: &ApiClient, base_url: String) -> impl Stream<Item = Value> + '_ {
    stream::unfold(1u32, move |page| {
        let url = page_url(&base_url, page, client.per_page());
        async move {
            match client.try_get(&url).await {
                Ok(Payload::List(items)) if !items.is_empty() => {
                    metrics::counter!("activity_export_pages_fetched_total").increment(1);
                    Some((items, page + 1))
                }
                Ok(Payload::List(_)) | Ok(Payload::Empty) => None,
                Ok(Payload::Object(_)) => {
                    debug!("Non-list response on page {page} of {url}, stopping");
                    None
                }
                Err(e) => {
                    metrics::counter!("activity_export_request_failures_total").increment(1);
                    error!("Pagination stopped early at page {page}: {e}");
                    None
                }
            }
        }
    })
    .flat_map(stream::iter)
}

/// Drain every page of a list endpoint into memory.
pub async fn collect_all(client: &ApiClient, base_url: String) -> Vec<Value> {
    fetch_all(client, base_url).collect().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_separator() {
        assert_eq!(
            page_url("https://h/api/v4/users", 1, 100),
            "https://h/api/v4/users?page=1&per_page=100"
        );
        assert_eq!(
            page_url("https://h/api/v4/projects/1/events?action=pushed", 3, 20),
            "https://h/api/v4/projects/1/events?action=pushed&page=3&per_page=20"
        );
    }
}
