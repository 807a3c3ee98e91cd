//! Expiring, unauthenticated CSV export links.
//!
//! A link is a persisted `(hash, expires_at, params)` row. Lookups classify a
//! hash as valid, expired or unknown; nothing ever deletes or revokes a row.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::utils::format_timestamp;

/// Query parameters never captured into a link.
const TRANSIENT_PARAMS: [&str; 3] = ["format", "hash", "page"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvView {
    pub hash: String,
    /// Unix seconds.
    pub expires_at: i64,
    /// Includes `group` and `alias`.
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvViewState {
    Valid(CsvView),
    Expired { hash: String, expires_at: i64 },
    Unknown,
}

/// Report request reconstructed from a valid link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCsvView {
    pub group: String,
    pub alias: String,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IssuedLink {
    pub hash: String,
    pub url: String,
    /// RFC 3339, UTC.
    pub expires_at: String,
}

pub fn is_valid_hash(hash: &str) -> bool {
    !hash.is_empty() && hash.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

pub fn link_path(hash: &str) -> String {
    format!("/api/v1.0/report/csv-view/{hash}")
}

fn compute_hash(params: &BTreeMap<String, String>, nonce: &Uuid) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in params {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stores a new link for `group/alias` capturing `filters`.
pub async fn issue(
    pool: &SqlitePool,
    group: &str,
    alias: &str,
    filters: &HashMap<String, String>,
    now: DateTime<Utc>,
    ttl_secs: i64,
) -> AppResult<CsvView> {
    let mut params: BTreeMap<String, String> = filters
        .iter()
        .filter(|(key, _)| !TRANSIENT_PARAMS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    params.insert("group".to_string(), group.to_string());
    params.insert("alias".to_string(), alias.to_string());

    let hash = compute_hash(&params, &Uuid::new_v4());
    let expires_at = now.timestamp() + ttl_secs;
    let encoded = serde_json::to_string(&params).map_err(|e| AppError::internal(format!("encode link params: {e}")))?;

    sqlx::query("INSERT INTO report_csv_views (hash, expires_at, params, created_at) VALUES (?, ?, ?, ?)")
        .bind(&hash)
        .bind(expires_at)
        .bind(&encoded)
        .bind(format_timestamp(now))
        .execute(pool)
        .await?;

    tracing::info!(report = %format!("{group}/{alias}"), expires_at, "csv link issued");

    Ok(CsvView { hash, expires_at, params })
}

/// Classifies `hash` at instant `now`. A link is valid up to and including
/// its expiry second.
pub async fn lookup(pool: &SqlitePool, hash: &str, now: DateTime<Utc>) -> AppResult<CsvViewState> {
    let row = sqlx::query("SELECT hash, expires_at, params FROM report_csv_views WHERE hash = ?")
        .bind(hash)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(CsvViewState::Unknown);
    };

    let hash: String = row.try_get("hash")?;
    let expires_at: i64 = row.try_get("expires_at")?;
    if now.timestamp() > expires_at {
        return Ok(CsvViewState::Expired { hash, expires_at });
    }

    let raw: String = row.try_get("params")?;
    let params: BTreeMap<String, String> =
        serde_json::from_str(&raw).map_err(|e| AppError::internal(format!("corrupt csv view params: {e}")))?;

    Ok(CsvViewState::Valid(CsvView { hash, expires_at, params }))
}

impl CsvViewState {
    /// Turns a lookup into the report request to render.
    ///
    /// The stored parameters (minus `group`/`alias`) override `request`, and
    /// `hash` is always set to the resolved hash.
    pub fn resolve(self, mut request: HashMap<String, String>) -> AppResult<ResolvedCsvView> {
        let view = match self {
            CsvViewState::Unknown => return Err(AppError::CsvReportNotFound),
            CsvViewState::Expired { hash, expires_at } => {
                tracing::info!(%hash, expires_at, "csv link expired");
                return Err(AppError::CsvReportHashExpired);
            }
            CsvViewState::Valid(view) => view,
        };

        let mut params = view.params;
        let group = params.remove("group");
        let alias = params.remove("alias");
        let (Some(group), Some(alias)) = (group, alias) else {
            tracing::warn!(hash = %view.hash, "csv view without group/alias");
            return Err(AppError::CsvReportNotFound);
        };

        request.extend(params);
        request.insert("hash".to_string(), view.hash);

        Ok(ResolvedCsvView {
            group,
            alias,
            params: request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> CsvView {
        let mut params = BTreeMap::new();
        params.insert("group".to_string(), "finance".to_string());
        params.insert("alias".to_string(), "credits-summary".to_string());
        params.insert("currency".to_string(), "EUR".to_string());
        CsvView {
            hash: "abc123".to_string(),
            expires_at: 1_700_000_000,
            params,
        }
    }

    #[test]
    fn hash_shape() {
        assert!(is_valid_hash("0f3a9c"));
        assert!(!is_valid_hash("0F3A"));
        assert!(!is_valid_hash("abc-1"));
        assert!(!is_valid_hash(""));

        let hash = compute_hash(&view().params, &Uuid::new_v4());
        assert_eq!(hash.len(), 64);
        assert!(is_valid_hash(&hash));
    }

    #[test]
    fn same_params_give_distinct_hashes() {
        let params = view().params;
        assert_ne!(compute_hash(&params, &Uuid::new_v4()), compute_hash(&params, &Uuid::new_v4()));
    }

    #[test]
    fn valid_view_resolves_with_stored_params_and_forced_hash() {
        let mut request = HashMap::new();
        request.insert("currency".to_string(), "USD".to_string());
        request.insert("hash".to_string(), "other".to_string());

        let resolved = CsvViewState::Valid(view()).resolve(request).unwrap();
        assert_eq!(resolved.group, "finance");
        assert_eq!(resolved.alias, "credits-summary");
        assert_eq!(resolved.params.get("currency").map(String::as_str), Some("EUR"));
        assert_eq!(resolved.params.get("hash").map(String::as_str), Some("abc123"));
        assert!(!resolved.params.contains_key("group"));
    }

    #[test]
    fn failure_states_map_to_distinct_errors() {
        let unknown = CsvViewState::Unknown.resolve(HashMap::new()).unwrap_err();
        let expired = CsvViewState::Expired {
            hash: "abc".into(),
            expires_at: 1,
        }
        .resolve(HashMap::new())
        .unwrap_err();

        assert_eq!(unknown.code(), 625);
        assert_eq!(expired.code(), 626);
    }
}
