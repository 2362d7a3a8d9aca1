//! Typed access to the backend's REST table endpoints.
//!
//! The backend exposes each table at `rest/v1/{table}` with filters, column
//! projections and embedded joins encoded in the query string. This module
//! builds those queries, sends them with the shared credentials and maps
//! failures into the application error taxonomy.

use chrono::{DateTime, SecondsFormat, Utc};
use murmur_common::{AppError, AppResult};
use reqwest::Response;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::Backend;
use crate::records::PageCursor;

/// Postgres error code for a unique-constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Handle to one table endpoint.
pub struct TableClient {
    backend: Backend,
    table: String,
}

/// Sort direction for `order` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl Backend {
    /// Handle to a table endpoint.
    #[must_use]
    pub fn table(&self, name: &str) -> TableClient {
        TableClient {
            backend: self.clone(),
            table: name.to_string(),
        }
    }
}

impl TableClient {
    fn path(&self) -> String {
        format!("rest/v1/{}", self.table)
    }

    /// Start a filtered select with the given column projection.
    ///
    /// The projection may embed joins, e.g. `*, profile:profiles(*)`.
    #[must_use]
    pub fn select(&self, columns: &str) -> SelectBuilder {
        SelectBuilder {
            backend: self.backend.clone(),
            path: self.path(),
            pairs: vec![("select".to_string(), columns.to_string())],
        }
    }

    /// Insert a row and return the stored representation.
    pub async fn insert<T, R>(&self, row: &T) -> AppResult<R>
    where
        T: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.backend.endpoint(&self.path())?;
        let request = self
            .backend
            .authed(self.backend.inner.http.post(url))
            .await
            .header("Prefer", "return=representation")
            .json(row);

        let response = request.send().await?;
        let mut rows: Vec<R> = deserialize_ok(response).await?;
        rows.pop()
            .ok_or_else(|| AppError::Internal("Insert returned no representation".to_string()))
    }

    /// Insert a row without reading back the representation.
    pub async fn insert_only<T>(&self, row: &T) -> AppResult<()>
    where
        T: Serialize + Sync,
    {
        let url = self.backend.endpoint(&self.path())?;
        let request = self
            .backend
            .authed(self.backend.inner.http.post(url))
            .await
            .header("Prefer", "return=minimal")
            .json(row);

        let response = request.send().await?;
        expect_ok(response).await
    }

    /// Start a keyed update carrying the given patch body.
    pub fn update<T: Serialize>(&self, patch: &T) -> AppResult<MutationBuilder> {
        Ok(MutationBuilder {
            backend: self.backend.clone(),
            path: self.path(),
            pairs: Vec::new(),
            kind: MutationKind::Update(serde_json::to_value(patch)?),
        })
    }

    /// Start a keyed delete.
    #[must_use]
    pub fn delete(&self) -> MutationBuilder {
        MutationBuilder {
            backend: self.backend.clone(),
            path: self.path(),
            pairs: Vec::new(),
            kind: MutationKind::Delete,
        }
    }
}

/// Builder for filtered reads.
pub struct SelectBuilder {
    backend: Backend,
    path: String,
    pairs: Vec<(String, String)>,
}

impl SelectBuilder {
    /// Equality filter.
    #[must_use]
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.pairs.push((column.to_string(), format!("eq.{value}")));
        self
    }

    /// Case-insensitive substring match.
    #[must_use]
    pub fn ilike(mut self, column: &str, needle: &str) -> Self {
        let needle = sanitize_pattern(needle);
        self.pairs
            .push((column.to_string(), format!("ilike.*{needle}*")));
        self
    }

    /// Membership filter. Callers must short-circuit empty id sets before
    /// reaching this; an empty list would read as "match nothing" but still
    /// cost a round trip.
    #[must_use]
    pub fn in_(mut self, column: &str, values: &[String]) -> Self {
        let list = values
            .iter()
            .map(|v| sanitize_pattern(v))
            .collect::<Vec<_>>()
            .join(",");
        self.pairs
            .push((column.to_string(), format!("in.({list})")));
        self
    }

    /// Disjunction of raw filter conditions, e.g.
    /// `["images.neq.{}", "video.not.is.null"]`.
    #[must_use]
    pub fn or_any(mut self, conditions: &[String]) -> Self {
        self.pairs
            .push(("or".to_string(), format!("({})", conditions.join(","))));
        self
    }

    /// Keyset filter for rows strictly older than the cursor, with an id
    /// tiebreak for rows created in the same instant.
    #[must_use]
    pub fn older_than(self, cursor: &PageCursor) -> Self {
        let ts = format_timestamp(cursor.created_at);
        let id = sanitize_pattern(&cursor.id);
        self.or_any(&[
            format!("created_at.lt.{ts}"),
            format!("and(created_at.eq.{ts},id.lt.{id})"),
        ])
    }

    /// Sort clause; repeatable, applied in call order.
    #[must_use]
    pub fn order(mut self, column: &str, direction: Order) -> Self {
        let suffix = match direction {
            Order::Asc => "asc",
            Order::Desc => "desc",
        };
        let clause = format!("{column}.{suffix}");
        match self.pairs.iter_mut().find(|(k, _)| k == "order") {
            Some((_, existing)) => {
                existing.push(',');
                existing.push_str(&clause);
            }
            None => self.pairs.push(("order".to_string(), clause)),
        }
        self
    }

    /// Row limit.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.pairs.push(("limit".to_string(), limit.to_string()));
        self
    }

    /// The encoded query string (stable, in insertion order).
    #[must_use]
    pub fn query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    async fn send(self) -> AppResult<Response> {
        let url = self.backend.endpoint(&format!(
            "{}?{}",
            self.path,
            self.query_string()
        ))?;
        let request = self.backend.authed(self.backend.inner.http.get(url)).await;
        Ok(request.send().await?)
    }

    /// Execute and deserialize all rows.
    pub async fn fetch<T: DeserializeOwned>(self) -> AppResult<Vec<T>> {
        let response = self.send().await?;
        deserialize_ok(response).await
    }

    /// Execute with `limit 1` and return the row, if any.
    pub async fn maybe_single<T: DeserializeOwned>(self) -> AppResult<Option<T>> {
        let mut rows: Vec<T> = self.limit(1).fetch().await?;
        Ok(rows.pop())
    }

    /// Exact row count without transferring rows.
    pub async fn count(self) -> AppResult<u64> {
        let url = self.backend.endpoint(&format!(
            "{}?{}",
            self.path,
            self.query_string()
        ))?;
        let request = self
            .backend
            .authed(self.backend.inner.http.get(url))
            .await
            .header("Prefer", "count=exact")
            .header("Range", "0-0")
            .header("Range-Unit", "items");

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(failure_from_response(response).await);
        }

        let header = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        header
            .as_deref()
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                AppError::Internal("Backend response missing an exact count".to_string())
            })
    }
}

enum MutationKind {
    Update(serde_json::Value),
    Delete,
}

/// Builder for keyed updates and deletes.
pub struct MutationBuilder {
    backend: Backend,
    path: String,
    pairs: Vec<(String, String)>,
    kind: MutationKind,
}

impl MutationBuilder {
    /// Equality filter; mutations always target rows by key or unique tuple.
    #[must_use]
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.pairs.push((column.to_string(), format!("eq.{value}")));
        self
    }

    /// Execute, returning the number of affected rows.
    pub async fn execute(self) -> AppResult<u64> {
        if self.pairs.is_empty() {
            // A filterless mutation would touch the whole table.
            return Err(AppError::Internal(
                "Refusing an unfiltered table mutation".to_string(),
            ));
        }

        let query = self
            .pairs
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let url = self.backend.endpoint(&format!("{}?{query}", self.path))?;

        let request = match &self.kind {
            MutationKind::Update(patch) => self
                .backend
                .authed(self.backend.inner.http.patch(url))
                .await
                .json(patch),
            MutationKind::Delete => self.backend.authed(self.backend.inner.http.delete(url)).await,
        };

        let response = request
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = deserialize_ok(response).await?;
        Ok(rows.len() as u64)
    }
}

/// RFC 3339 with fixed microsecond precision, matching the backend's
/// timestamp rendering closely enough for keyset comparisons.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Strip characters that carry meaning in the filter grammar so user input
/// cannot break out of a condition.
pub(crate) fn sanitize_pattern(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '"' | '\'' | '*' | '\\'))
        .collect()
}

/// Total from a `Content-Range` header such as `0-0/42` or `*/0`.
fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.parse().ok()
}

/// Deserialize a success body, or map the failure.
pub(crate) async fn deserialize_ok<T: DeserializeOwned>(response: Response) -> AppResult<T> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(failure_from_response(response).await)
    }
}

/// Require a success status, discarding the body.
pub(crate) async fn expect_ok(response: Response) -> AppResult<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(failure_from_response(response).await)
    }
}

/// Map a failed response into the error taxonomy.
pub(crate) async fn failure_from_response(response: Response) -> AppError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    parse_failure(status, &body)
}

/// Map a status and error body to an [`AppError`].
///
/// The REST endpoints answer with `{code, message, …}`, the auth endpoints
/// with `{error_description}` or `{msg}`; a unique-constraint violation is a
/// conflict regardless of the status it arrives with.
pub(crate) fn parse_failure(status: u16, body: &str) -> AppError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();

    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(|v| v.as_str())
        .map(ToString::to_string);

    let message = parsed
        .as_ref()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|m| m.as_str()))
        })
        .map_or_else(|| body.to_string(), ToString::to_string);

    if code.as_deref() == Some(UNIQUE_VIOLATION) {
        return AppError::Conflict(message);
    }

    AppError::from_status(status, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use murmur_common::config::BackendConfig;

    fn test_backend() -> Backend {
        Backend::connect(&BackendConfig {
            url: "https://backend.test".into(),
            anon_key: "anon".into(),
            request_timeout_secs: 5,
            connect_timeout_secs: 5,
        })
        .unwrap_or_else(|e| panic!("connect: {e}"))
    }

    #[test]
    fn test_select_query_encoding() {
        let query = test_backend()
            .table("posts")
            .select("*, profile:profiles(*)")
            .eq("user_id", "u1")
            .order("created_at", Order::Desc)
            .order("id", Order::Desc)
            .limit(20)
            .query_string();

        assert_eq!(
            query,
            "select=%2A%2C%20profile%3Aprofiles%28%2A%29&user_id=eq.u1\
             &order=created_at.desc%2Cid.desc&limit=20"
        );
    }

    #[test]
    fn test_ilike_strips_grammar_characters() {
        let query = test_backend()
            .table("profiles")
            .select("*")
            .ilike("username", "ja)ne,*")
            .query_string();

        assert!(query.contains("ilike.%2Ajane%2A"));
    }

    #[test]
    fn test_in_filter_renders_list() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let query = test_backend()
            .table("posts")
            .select("*")
            .in_("id", &ids)
            .query_string();

        assert!(query.contains("id=in.%28a%2Cb%29"));
    }

    #[test]
    fn test_older_than_renders_keyset_disjunction() {
        let cursor = PageCursor {
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
                .single()
                .unwrap_or_else(|| panic!("valid timestamp")),
            id: "p9".into(),
        };
        let query = test_backend()
            .table("posts")
            .select("*")
            .older_than(&cursor)
            .query_string();

        let decoded = urlencoding::decode(&query)
            .unwrap_or_else(|e| panic!("decode: {e}"))
            .into_owned();
        assert!(decoded.contains("or=(created_at.lt.2025-06-01T12:00:00.000000Z"));
        assert!(decoded.contains("and(created_at.eq.2025-06-01T12:00:00.000000Z,id.lt.p9))"));
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("0-0/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("nonsense"), None);
    }

    #[test]
    fn test_parse_failure_unique_violation_is_conflict() {
        let error = parse_failure(
            500,
            r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#,
        );
        assert!(error.is_conflict());
    }

    #[test]
    fn test_parse_failure_auth_body() {
        match parse_failure(400, r#"{"error_description":"Invalid login credentials"}"#) {
            AppError::RemoteRejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid login credentials");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_parse_failure_plain_body_passthrough() {
        match parse_failure(503, "upstream unavailable") {
            AppError::RemoteRejected { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
