// PostgREST counter store client
//
// Read-only access to the vote counter table. Two request shapes are
// supported: a point read by id (used when a client first subscribes)
// and a batched `in.(...)` read (used on every detector tick).

use std::fmt;

use secrecy::SecretString;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Default table holding one row per poll option.
pub const DEFAULT_TABLE: &str = "poll_options";

/// One `(id, vote_count)` row from a batched read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CounterRow {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub vote_count: i64,
}

#[derive(Debug, Deserialize)]
struct PointRow {
    #[serde(default, deserialize_with = "null_as_zero")]
    vote_count: i64,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// HTTP client for the counter table behind a PostgREST endpoint.
///
/// Cheap to clone; the inner `reqwest::Client` is reference counted.
#[derive(Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    table_url: Url,
}

// The inner client carries the credential headers; only show the endpoint.
impl fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreClient")
            .field("table_url", &self.table_url.as_str())
            .finish_non_exhaustive()
    }
}

impl StoreClient {
    /// Create a client for `table` under the project at `base_url`.
    pub fn new(
        base_url: &Url,
        table: &str,
        key: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client(key)?;
        Self::with_client(http, base_url, table)
    }

    /// Create a client around a pre-built `reqwest::Client`.
    ///
    /// The client is expected to already carry the credential headers.
    pub fn with_client(http: reqwest::Client, base_url: &Url, table: &str) -> Result<Self, Error> {
        let base = base_url.as_str().trim_end_matches('/');
        let table_url = Url::parse(&format!("{base}/rest/v1/{table}"))?;
        Ok(Self { http, table_url })
    }

    /// The resolved table endpoint.
    pub fn table_url(&self) -> &Url {
        &self.table_url
    }

    /// Point read of one counter. `None` when no row has this id.
    pub async fn get_counter(&self, id: &str) -> Result<Option<i64>, Error> {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("select", "vote_count")
            .append_pair("id", &format!("eq.{id}"));

        let rows: Vec<PointRow> = self.get(url).await?;
        Ok(rows.first().map(|r| r.vote_count))
    }

    /// Batched read of many counters in one round trip.
    ///
    /// Ids with no matching row are simply absent from the result.
    pub async fn get_counters(&self, ids: &[String]) -> Result<Vec<CounterRow>, Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("select", "id,vote_count")
            .append_pair("id", &in_filter(ids));

        let rows: Vec<CounterRow> = self.get(url).await?;
        trace!(requested = ids.len(), returned = rows.len(), "batched counter read");
        Ok(rows)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Unauthorized {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Store {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }
}

/// Build a PostgREST `in.(...)` filter, quoting every id.
fn in_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn in_filter_quotes_ids() {
        let ids = vec!["a1".to_string(), "b\"2".to_string()];
        assert_eq!(in_filter(&ids), r#"in.("a1","b\"2")"#);
    }

    #[test]
    fn null_vote_count_reads_as_zero() {
        let rows: Vec<CounterRow> =
            serde_json::from_str(r#"[{"id":"x","vote_count":null},{"id":"y"}]"#)
                .unwrap_or_default();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.vote_count == 0));
    }

    #[test]
    fn debug_hides_credentials() {
        let base = Url::parse("https://example.supabase.co").unwrap();
        let key = SecretString::from("service-key-123");
        let client = StoreClient::new(&base, DEFAULT_TABLE, &key, &TransportConfig::default()).unwrap();

        let shown = format!("{client:?}");
        assert!(shown.contains("/rest/v1/poll_options"));
        assert!(!shown.contains("service-key-123"));
    }
}
