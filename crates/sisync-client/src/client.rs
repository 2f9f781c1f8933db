//! OAuth2 SIS client: token lifecycle plus cached, paginated API access.
//!
//! The client composes an injected [`HttpTransport`], an injected
//! [`TokenStore`], and two [`ResponseCache`] instances (short and long TTL).
//! It owns the token lifecycle end to end and is the sole writer of token
//! store entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{fingerprint, ResponseCache, LONG_TTL, SHORT_TTL};
use crate::config::SisConfig;
use crate::error::{SisError, SisResult};
use crate::token::{AccessToken, TokenStore};
use crate::transport::HttpTransport;
use crate::types::{
    reduce_enrollment_records, CourseEnrollment, EnrolmentStatus, SisCourse, Subject, Term,
};

/// Page size for paginated listing calls.
pub const PAGE_LIMIT: usize = 100;

/// Safety margin subtracted from `expires_in`, guarding against clock skew
/// between us and the token endpoint.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 10;

/// Recognises the remote's "offset exhausted" signal and extracts the total
/// list size it claims.
static OFFSET_EXHAUSTED: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"Offset \[\d+\] is larger than list size: (\d+)")
        .expect("OFFSET_EXHAUSTED is a valid regex pattern")
});

/// Which cache a call goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheMode {
    /// Short-TTL cache for volatile listings.
    Short,
    /// Long-TTL cache for terms, subjects, and courses.
    Long,
    /// No caching; enrolment state must always be fresh.
    Bypass,
}

/// OAuth2-authenticated client for the SIS REST API.
pub struct SisClient {
    config: SisConfig,
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenStore>,
    cache: ResponseCache,
    long_cache: ResponseCache,
    /// Authorization code handed over by an external redirect, if any.
    auth_code: Option<String>,
}

impl SisClient {
    /// Create a client with the default cache TTLs.
    pub fn new(
        config: SisConfig,
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            config,
            transport,
            tokens,
            cache: ResponseCache::new(SHORT_TTL),
            long_cache: ResponseCache::new(LONG_TTL),
            auth_code: None,
        }
    }

    /// Supply an authorization code obtained from an external redirect; the
    /// next [`SisClient::is_logged_in`] will attempt to upgrade it.
    #[must_use]
    pub fn with_authorization_code(mut self, code: impl Into<String>) -> Self {
        self.auth_code = Some(code.into());
        self
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &SisConfig {
        &self.config
    }

    /// The currently persisted access token, if any.
    pub fn stored_token(&self) -> SisResult<Option<AccessToken>> {
        self.tokens.load()
    }

    /// The currently persisted refresh token, if any.
    pub fn stored_refresh_token(&self) -> SisResult<Option<String>> {
        self.tokens.load_refresh()
    }

    // ── Token lifecycle ───────────────────────────────────────────────

    /// Resolve login state, obtaining or refreshing a token as needed.
    ///
    /// Order of attempts: refresh an expired token, keep a live token, trade
    /// an authorization code, and finally a direct password grant.  Safe and
    /// idempotent to call before every API operation.
    pub async fn is_logged_in(&self) -> bool {
        match self.tokens.load() {
            Ok(Some(token)) => {
                if token.is_expired() {
                    if let Ok(Some(refresh)) = self.tokens.load_refresh() {
                        match self.refresh_token(&refresh).await {
                            Ok(true) => return true,
                            Ok(false) => {}
                            Err(e) => warn!(error = %e, "token refresh failed"),
                        }
                    }
                    // The token already expired and could not be refreshed.
                    if let Err(e) = self.log_out() {
                        warn!(error = %e, "failed to clear expired token");
                    }
                } else {
                    return true;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to load persisted token"),
        }

        if let Some(code) = self.auth_code.clone() {
            match self.upgrade_token(&code).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "authorization code upgrade failed"),
            }
        }

        if !self.config.resource_username.is_empty() && !self.config.resource_password.is_empty() {
            let username = self.config.resource_username.clone();
            let password = self.config.resource_password.clone();
            match self.log_in(&username, &password).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "password grant login failed"),
            }
        }

        false
    }

    /// Obtain a token with the password grant.
    ///
    /// Returns `Ok(false)` when the endpoint answered without an access
    /// token; a non-200 transport result is an error.  On success the short
    /// cache is invalidated, since previously cached responses are no
    /// longer attributable to the new token.
    pub async fn log_in(&self, username: &str, password: &str) -> SisResult<bool> {
        let obtained = self
            .token_request(&[
                ("grant_type", "password"),
                ("username", username),
                ("password", password),
            ])
            .await?;
        if obtained {
            debug!("logged in, invalidating short-lived response cache");
            self.cache.invalidate_all().await;
        }
        Ok(obtained)
    }

    /// Obtain a fresh token with the refresh-token grant.  Invalidates both
    /// caches on success.
    pub async fn refresh_token(&self, refresh_token: &str) -> SisResult<bool> {
        let obtained = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;
        if obtained {
            debug!("token refreshed, invalidating response caches");
            self.cache.invalidate_all().await;
            self.long_cache.invalidate_all().await;
        }
        Ok(obtained)
    }

    /// Trade an authorization code from an external redirect for a token.
    pub async fn upgrade_token(&self, code: &str) -> SisResult<bool> {
        let obtained = self
            .token_request(&[("grant_type", "authorization_code"), ("code", code)])
            .await?;
        if obtained {
            self.cache.invalidate_all().await;
        }
        Ok(obtained)
    }

    /// Clear both stored tokens.  No network call is made.
    pub fn log_out(&self) -> SisResult<()> {
        self.tokens.save(None)?;
        self.tokens.save_refresh(None)
    }

    /// Forced credential round trip for the settings check: drop any stored
    /// tokens, log in from scratch, and verify both tokens were issued.
    pub async fn verify_credentials(&self) -> SisResult<bool> {
        self.log_out()?;
        if !self.is_logged_in().await {
            return Ok(false);
        }
        Ok(self.stored_token()?.is_some() && self.stored_refresh_token()?.is_some())
    }

    async fn token_request(&self, grant_params: &[(&str, &str)]) -> SisResult<bool> {
        let mut query: Vec<(String, String)> = vec![
            ("client_id".to_string(), self.config.client_id.clone()),
            (
                "client_secret".to_string(),
                self.config.client_secret.clone(),
            ),
        ];
        for (key, value) in grant_params {
            query.push(((*key).to_string(), (*value).to_string()));
        }

        let response = self
            .transport
            .get(&self.config.token_url(), &query, &self.identity_headers())
            .await?;

        if response.status != 200 {
            return Err(SisError::Auth(format!(
                "token endpoint returned HTTP {}",
                response.status
            )));
        }

        let Ok(body) = serde_json::from_str::<Value>(&response.body) else {
            warn!("token endpoint returned an unparseable body");
            return Ok(false);
        };
        let Some(access_token) = body.get("access_token").and_then(Value::as_str) else {
            return Ok(false);
        };

        let expires_in = body.get("expires_in").and_then(Value::as_i64).unwrap_or(0);
        let token = AccessToken {
            token: access_token.to_string(),
            expires_at: Utc::now()
                + ChronoDuration::seconds(expires_in - TOKEN_EXPIRY_MARGIN_SECS),
        };
        self.tokens.save(Some(&token))?;

        if let Some(refresh) = body.get("refresh_token").and_then(Value::as_str) {
            self.tokens.save_refresh(Some(refresh))?;
        }

        Ok(true)
    }

    // ── Request plumbing ──────────────────────────────────────────────

    /// Identifying headers the SIS expects on every call.  Re-asserted per
    /// request because the underlying transport may be shared across calls
    /// that mutate headers.
    fn identity_headers(&self) -> Vec<(String, String)> {
        vec![
            ("client_id".to_string(), self.config.client_id.clone()),
            (
                "client_secret".to_string(),
                self.config.client_secret.clone(),
            ),
        ]
    }

    fn cache_for(&self, mode: CacheMode) -> Option<&ResponseCache> {
        match mode {
            CacheMode::Short => Some(&self.cache),
            CacheMode::Long => Some(&self.long_cache),
            CacheMode::Bypass => None,
        }
    }

    /// Fetch one response body, going through the selected cache.
    async fn fetch(
        &self,
        url: &str,
        query: &[(String, String)],
        mode: CacheMode,
    ) -> SisResult<String> {
        let key = fingerprint(url, query);
        if let Some(cache) = self.cache_for(mode) {
            if let Some(hit) = cache.get(&key).await {
                debug!(url, "cache hit");
                return Ok(hit);
            }
        }

        let mut headers = self.identity_headers();
        if let Ok(Some(token)) = self.tokens.load() {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token.token)));
        }

        let response = self.transport.get(url, query, &headers).await?;
        if response.body.is_empty() {
            return Err(SisError::transport(format!("empty response from {url}")));
        }

        if let Some(cache) = self.cache_for(mode) {
            // The cache itself refuses error-shaped bodies.
            cache.set(&key, &response.body).await;
        }
        Ok(response.body)
    }

    /// Fetch a single resource and return its `data` payload, if present.
    async fn get_data(&self, url: &str, mode: CacheMode) -> SisResult<Option<Value>> {
        let body = self.fetch(url, &[], mode).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| SisError::Protocol(format!("unparseable response from {url}: {e}")))?;
        match value.get("data") {
            Some(Value::Null) | None => Ok(None),
            Some(data) => Ok(Some(data.clone())),
        }
    }

    /// Pagination driver: request pages of [`PAGE_LIMIT`] records until the
    /// remote runs out, merging every page's `data` array.
    ///
    /// Pagination is all-or-nothing.  An empty raw response or an
    /// unrecognised error body aborts the whole call; the recognised
    /// "offset exhausted" signal ends it, and the total it claims must then
    /// match the accumulated count exactly.
    pub async fn get_all_data(&self, uri: &str) -> SisResult<Vec<Value>> {
        self.get_all_data_with(uri, &[], CacheMode::Short).await
    }

    async fn get_all_data_with(
        &self,
        url: &str,
        base_query: &[(String, String)],
        mode: CacheMode,
    ) -> SisResult<Vec<Value>> {
        let mut accumulated: Vec<Value> = Vec::new();
        let mut offset = 0usize;
        let mut claimed_total: Option<usize> = None;

        loop {
            let mut query = base_query.to_vec();
            query.push(("limit".to_string(), PAGE_LIMIT.to_string()));
            query.push(("offset".to_string(), offset.to_string()));

            let body = self.fetch(url, &query, mode).await?;
            let value: Value = serde_json::from_str(&body)
                .map_err(|e| SisError::Protocol(format!("unparseable response from {url}: {e}")))?;

            if let Some(message) = value.get("error").and_then(Value::as_str) {
                if let Some(total) = parse_offset_exhausted(message) {
                    claimed_total = Some(total);
                    break;
                }
                return Err(SisError::Protocol(format!(
                    "{url} returned error: {message}"
                )));
            }

            let Some(data) = value.get("data") else {
                return Err(SisError::Protocol(format!(
                    "{url} returned neither data nor error"
                )));
            };
            let Some(items) = data.as_array() else {
                return Err(SisError::Protocol(format!(
                    "{url} returned a non-array data payload"
                )));
            };

            if items.is_empty() {
                break;
            }
            accumulated.extend(items.iter().cloned());
            offset += PAGE_LIMIT;
        }

        if let Some(expected) = claimed_total {
            if expected != accumulated.len() {
                return Err(SisError::Consistency {
                    expected,
                    actual: accumulated.len(),
                });
            }
        }

        Ok(accumulated)
    }

    // ── Resource calls ────────────────────────────────────────────────

    /// Active terms in reverse chronological order, with terms not yet open
    /// for file-based enrolment filtered out.  Long-TTL cached.
    pub async fn get_active_terms(&self) -> SisResult<Vec<Term>> {
        let url = format!("{}/terms", self.config.api_url());
        let rows = self
            .get_all_data_with(
                &url,
                &[("sort".to_string(), "-termStartDate".to_string())],
                CacheMode::Long,
            )
            .await?;
        let terms = deserialize_rows::<Term>(rows, "term")?;
        Ok(terms
            .into_iter()
            .filter(Term::is_open_for_enrolment)
            .collect())
    }

    /// Subjects available in a term, sorted by name.  Long-TTL cached.
    pub async fn get_subjects_in_term(&self, term_id: &str) -> SisResult<Vec<Subject>> {
        let url = format!("{}/terms/{}/subjects", self.config.api_url(), term_id.trim());
        let rows = self
            .get_all_data_with(
                &url,
                &[("sort".to_string(), "name".to_string())],
                CacheMode::Long,
            )
            .await?;
        deserialize_rows(rows, "subject")
    }

    /// Courses available in a term, sorted by course number.  Long-TTL
    /// cached.
    pub async fn get_courses_in_term(&self, term_id: &str) -> SisResult<Vec<SisCourse>> {
        let url = format!("{}/terms/{}/courses", self.config.api_url(), term_id.trim());
        let rows = self
            .get_all_data_with(
                &url,
                &[("sort".to_string(), "courseNumber".to_string())],
                CacheMode::Long,
            )
            .await?;
        deserialize_rows(rows, "course")
    }

    /// A single course by id.  Long-TTL cached.
    pub async fn get_course(&self, course_id: &str) -> SisResult<Option<SisCourse>> {
        let url = format!("{}/courses/{}", self.config.api_url(), course_id.trim());
        match self.get_data(&url, CacheMode::Long).await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| SisError::Protocol(format!("malformed course record: {e}"))),
        }
    }

    /// Current enrolment for a SIS course, reduced to one status per
    /// external person id.  Never cached: enrolment must always be fresh.
    ///
    /// `Ok(None)` means the call succeeded but no enrolment survived
    /// reduction, which the reconciler treats differently from a fetch
    /// failure.
    pub async fn get_course_enrollment(
        &self,
        course_id: &str,
    ) -> SisResult<Option<HashMap<String, EnrolmentStatus>>> {
        let url = format!("{}/courseEnrollments", self.config.api_url());
        let rows = self
            .get_all_data_with(
                &url,
                &[("courseId".to_string(), course_id.trim().to_string())],
                CacheMode::Bypass,
            )
            .await?;

        let mut records: Vec<CourseEnrollment> = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value(row) {
                Ok(record) => records.push(record),
                Err(e) => warn!(course_id, error = %e, "discarding malformed enrolment record"),
            }
        }
        let reduced = reduce_enrollment_records(records);
        if reduced.is_empty() {
            Ok(None)
        } else {
            Ok(Some(reduced))
        }
    }
}

/// Extract the claimed total from an "offset exhausted" error message.
fn parse_offset_exhausted(message: &str) -> Option<usize> {
    OFFSET_EXHAUSTED
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|total| total.as_str().parse().ok())
}

fn deserialize_rows<T: serde::de::DeserializeOwned>(
    rows: Vec<Value>,
    kind: &str,
) -> SisResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| SisError::Protocol(format!("malformed {kind} record: {e}")))
        })
        .collect()
}
