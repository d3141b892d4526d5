//! REST clients for Supabase Storage and the PostgREST price table.

// External imports
use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

// Internal imports
use super::{ObjectStore, PriceTable, StorageResult};
use crate::constants::SELECT_PAGE_SIZE;
use crate::daily::records::DailyRecord;
use crate::error::StorageError;
use crate::util::config::StorageCredentials;

const REQUEST_TIMEOUT_SECS: u64 = 60;
const LIST_PAGE_SIZE: usize = 1000;

/// Map a failed response to a typed storage error
///
/// Storage reports an existing object either as HTTP 409 or as HTTP 400 with
/// `statusCode: "409"` / `error: "Duplicate"` in the body.
pub fn classify_failure(path: &str, url: &str, status: u16, body: &str) -> StorageError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| -> Option<String> {
        parsed.as_ref().and_then(|v| v.get(name)).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    };
    let body_status = field("statusCode");
    let error = field("error").unwrap_or_default();

    let conflict = status == 409
        || (status == 400
            && (body_status.as_deref() == Some("409") || error.eq_ignore_ascii_case("duplicate")));
    if conflict {
        return StorageError::Conflict {
            path: path.to_string(),
        };
    }

    let not_found = status == 404
        || (status == 400
            && (body_status.as_deref() == Some("404") || error.eq_ignore_ascii_case("not_found")));
    if not_found {
        return StorageError::NotFound {
            path: path.to_string(),
        };
    }

    let message = field("message").unwrap_or_else(|| body.chars().take(200).collect());
    StorageError::Status {
        url: url.to_string(),
        status,
        message,
    }
}

/// Authenticated HTTP access to one Supabase project
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(credentials: &StorageCredentials) -> StorageResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: credentials.url.trim_end_matches('/').to_string(),
            service_key: credentials.service_key.clone(),
        })
    }

    pub fn storage(&self, bucket: &str) -> SupabaseStorage {
        SupabaseStorage {
            client: self.clone(),
            bucket: bucket.to_string(),
        }
    }

    pub fn table(&self, table: &str) -> SupabaseTable {
        SupabaseTable {
            client: self.clone(),
            table: table.to_string(),
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/{}", self.base_url, suffix.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("apikey", &self.service_key)
    }

    /// Send and turn any non-success status into a classified error
    fn send(&self, request: RequestBuilder, path: &str, url: &str) -> StorageResult<Response> {
        let response = self.authorized(request).send()?;
        let status = response.status();
        debug!("{} -> {}", url, status);
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(classify_failure(path, url, status.as_u16(), &body))
    }
}

/// Supabase Storage bucket
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    client: SupabaseClient,
    bucket: String,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: String,
}

/// Names from a listing body, which must be a JSON array of `{name, ..}`
pub fn parse_names(url: &str, body: &str) -> StorageResult<Vec<String>> {
    let invalid = |message: String| StorageError::InvalidResponse {
        url: url.to_string(),
        message,
    };
    let value: Value = serde_json::from_str(body).map_err(|e| invalid(e.to_string()))?;
    if !value.is_array() {
        return Err(invalid(format!(
            "expected an array, got {}",
            body.chars().take(200).collect::<String>()
        )));
    }
    let entries: Vec<NamedEntry> = serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
    Ok(entries.into_iter().map(|entry| entry.name).collect())
}

impl SupabaseStorage {
    fn object_url(&self, path: &str) -> String {
        self.client
            .url(&format!("storage/v1/object/{}/{}", self.bucket, path))
    }
}

impl ObjectStore for SupabaseStorage {
    fn upload(&self, path: &str, bytes: &[u8], content_type: &str, upsert: bool) -> StorageResult<()> {
        let url = self.object_url(path);
        let request = self
            .client
            .http
            .post(&url)
            .header("Content-Type", content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes.to_vec());
        self.client.send(request, path, &url)?;
        Ok(())
    }

    fn update(&self, path: &str, bytes: &[u8], content_type: &str) -> StorageResult<()> {
        let url = self.object_url(path);
        let request = self
            .client
            .http
            .put(&url)
            .header("Content-Type", content_type)
            .body(bytes.to_vec());
        self.client.send(request, path, &url)?;
        Ok(())
    }

    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let url = self.client.url(&format!("storage/v1/object/list/{}", self.bucket));
        let mut names = Vec::new();
        let mut offset = 0;
        loop {
            let body = json!({
                "prefix": prefix,
                "limit": LIST_PAGE_SIZE,
                "offset": offset,
                "sortBy": {"column": "name", "order": "asc"}
            });
            let request = self.client.http.post(&url).json(&body);
            let body = self.client.send(request, prefix, &url)?.text()?;
            let page = parse_names(&url, &body)?;
            let count = page.len();
            names.extend(page);
            if count < LIST_PAGE_SIZE {
                break;
            }
            offset += count;
        }
        Ok(names)
    }

    fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let url = self.client.url("storage/v1/bucket");
        let request = self.client.http.get(&url);
        let body = self.client.send(request, "", &url)?.text()?;
        parse_names(&url, &body)
    }
}

/// PostgREST access to the daily price table
#[derive(Debug, Clone)]
pub struct SupabaseTable {
    client: SupabaseClient,
    table: String,
}

impl PriceTable for SupabaseTable {
    fn upsert(&self, records: &[DailyRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let url = self.client.url(&format!("rest/v1/{}", self.table));
        let request = self
            .client
            .http
            .post(&url)
            .query(&[("on_conflict", "ticker,date")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(records);
        self.client.send(request, &self.table, &url)?;
        Ok(())
    }

    fn select(&self, ticker: &str) -> StorageResult<Vec<DailyRecord>> {
        let url = self.client.url(&format!("rest/v1/{}", self.table));
        let filter = format!("eq.{}", ticker);
        let mut rows: Vec<DailyRecord> = Vec::new();
        let mut offset = 0;
        loop {
            let limit = SELECT_PAGE_SIZE.to_string();
            let start = offset.to_string();
            let request = self.client.http.get(&url).query(&[
                ("select", "*"),
                ("ticker", filter.as_str()),
                ("order", "date.asc"),
                ("limit", limit.as_str()),
                ("offset", start.as_str()),
            ]);
            let page: Vec<DailyRecord> = self.client.send(request, &self.table, &url)?.json()?;
            let count = page.len();
            rows.extend(page);
            if count < SELECT_PAGE_SIZE {
                break;
            }
            offset += count;
        }
        debug!("{}: selected {} rows", ticker, rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://x.supabase.co/storage/v1/object/models/SAP.DE/model.json";

    #[test]
    fn test_conflict_from_status_409() {
        let err = classify_failure("SAP.DE/model.json", URL, 409, "");
        assert!(err.is_conflict());
    }

    #[test]
    fn test_conflict_from_400_body() {
        let body = r#"{"statusCode":"409","error":"Duplicate","message":"The resource already exists"}"#;
        assert!(classify_failure("p", URL, 400, body).is_conflict());
        let body = r#"{"error":"Duplicate","message":"exists"}"#;
        assert!(classify_failure("p", URL, 400, body).is_conflict());
    }

    #[test]
    fn test_not_found_and_other_failures() {
        let body = r#"{"statusCode":"404","error":"not_found","message":"Object not found"}"#;
        assert!(matches!(
            classify_failure("p", URL, 400, body),
            StorageError::NotFound { .. }
        ));

        let body = r#"{"statusCode":"403","error":"Unauthorized","message":"invalid signature"}"#;
        match classify_failure("p", URL, 403, body) {
            StorageError::Status { status, message, .. } => {
                assert_eq!(status, 403);
                assert_eq!(message, "invalid signature");
            }
            other => panic!("unexpected error {:?}", other),
        }

        match classify_failure("p", URL, 500, "upstream timeout") {
            StorageError::Status { message, .. } => assert_eq!(message, "upstream timeout"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_listing_body_must_be_an_array_of_names() {
        let names = parse_names(URL, r#"[{"name":"model.json","id":"1"},{"name":"scaler.json"}]"#).unwrap();
        assert_eq!(names, vec!["model.json".to_string(), "scaler.json".to_string()]);

        for body in [r#"{"message":"bucket not found"}"#, "<html>", r#"[{"id":"1"}]"#] {
            assert!(matches!(
                parse_names(URL, body),
                Err(StorageError::InvalidResponse { .. })
            ));
        }
    }

    #[test]
    fn test_client_urls() {
        let creds = StorageCredentials::from_lookup(|name| match name {
            "SUPABASE_URL" => Some("https://x.supabase.co/".into()),
            "SUPABASE_SERVICE_ROLE_KEY" => Some("k".into()),
            _ => None,
        })
        .unwrap();
        let client = SupabaseClient::new(&creds).unwrap();
        let storage = client.storage("models");
        assert_eq!(storage.object_url("SAP.DE/model.json"), URL);
        assert_eq!(client.url("/rest/v1/daily_prices"), "https://x.supabase.co/rest/v1/daily_prices");
    }
}
