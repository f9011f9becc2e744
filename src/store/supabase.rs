// src/store/supabase.rs
//! Supabase (PostgREST) realization of the record store.
//!
//! Writes are a single `PATCH bills?id=eq.<id>`, i.e. one row update inside
//! one statement, which Postgres applies atomically.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::change_detector::{derive_status, is_eligible};
use crate::config::profiles::column_for;
use crate::config::SupabaseConfig;
use crate::error::BacklogError;
use crate::persist::RecordUpdate;
use crate::record::{
    EnrichmentOutput, RecordId, SelectionReason, StoredRecord, WorkItem, FAILURE_PREFIX,
};
use crate::store::{RecordStore, StoreQuery};

const TABLE: &str = "bills";
const PAGE_SIZE: usize = 1000;
const ID_CHUNK: usize = 200;

pub struct SupabaseStore {
    http: Client,
    base_url: String,
    service_key: String,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: u64,
    #[serde(default)]
    change_hash: Option<String>,
}

impl SupabaseStore {
    pub fn new(cfg: &SupabaseConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("bill-backlog/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .context("building supabase http client")?;
        Ok(Self {
            http,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            service_key: cfg.service_key.clone(),
        })
    }

    fn authed(&self, rb: RequestBuilder) -> RequestBuilder {
        rb.header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    async fn select_via_rpc(&self, function: &str) -> Result<Vec<WorkItem>, BacklogError> {
        let resp = self
            .authed(self.http.post(self.rest_url(&format!("rpc/{function}"))))
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(BacklogError::data_access)?;
        let rows: Vec<IdRow> = read_json(resp).await?;
        Ok(rows
            .into_iter()
            .map(|r| WorkItem {
                id: RecordId(r.id),
                stored_fingerprint: r.change_hash,
                reason: SelectionReason::Unknown,
            })
            .collect())
    }

    async fn select_via_filter(&self, profiles: &[String]) -> Result<Vec<WorkItem>, BacklogError> {
        let columns: Vec<String> = profiles.iter().map(|p| column_for(p)).collect();
        let select = format!("id,change_hash,{}", columns.join(","));
        let or = eligibility_filter(&columns);

        let mut out = Vec::new();
        let mut offset = 0usize;
        loop {
            let resp = self
                .authed(self.http.get(self.rest_url(TABLE)))
                .query(&[
                    ("select", select.as_str()),
                    ("or", or.as_str()),
                    ("order", "id.asc"),
                ])
                .query(&[("limit", PAGE_SIZE), ("offset", offset)])
                .send()
                .await
                .map_err(BacklogError::data_access)?;
            let rows: Vec<Map<String, Value>> = read_json(resp).await?;
            let n = rows.len();
            for row in rows {
                if let Some(item) = row_to_work_item(&row, profiles) {
                    out.push(item);
                }
            }
            debug!(target: "store", offset, rows = n, "filter page");
            if n < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(out)
    }
}

/// PostgREST `or=(...)` predicate matching null, placeholder or sentinel
/// values in any profile column.
fn eligibility_filter(columns: &[String]) -> String {
    let sentinel = FAILURE_PREFIX.trim_end_matches(':');
    let parts: Vec<String> = columns
        .iter()
        .flat_map(|c| {
            [
                format!("{c}.is.null"),
                format!("{c}.ilike.Placeholder*"),
                format!("{c}.like.{sentinel}*"),
            ]
        })
        .collect();
    format!("({})", parts.join(","))
}

/// The server predicate is loose (`ilike` on placeholders); the status is
/// re-derived here with the change detector.
fn row_to_work_item(row: &Map<String, Value>, profiles: &[String]) -> Option<WorkItem> {
    let id = row.get("id")?.as_u64()?;
    let fingerprint = row
        .get("change_hash")
        .and_then(Value::as_str)
        .map(str::to_string);
    let mut record = StoredRecord::pending(id);
    record.fingerprint = fingerprint.clone();
    for p in profiles {
        let raw = row.get(&column_for(p)).and_then(Value::as_str);
        record
            .outputs
            .insert(p.clone(), EnrichmentOutput::from_column(raw));
    }
    let status = derive_status(&record, profiles, None);
    is_eligible(status).then(|| WorkItem {
        id: RecordId(id),
        stored_fingerprint: fingerprint,
        reason: status.into(),
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, BacklogError> {
    let status = resp.status();
    let body = resp.text().await.map_err(BacklogError::data_access)?;
    if !status.is_success() {
        return Err(BacklogError::DataAccess(format!(
            "store returned HTTP {status}: {}",
            body.trim()
        )));
    }
    serde_json::from_str(&body)
        .map_err(|e| BacklogError::DataAccess(format!("unexpected store payload: {e}")))
}

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn select_eligible(&self, query: &StoreQuery) -> Result<Vec<WorkItem>, BacklogError> {
        match query {
            StoreQuery::Rpc { function } => self.select_via_rpc(function).await,
            StoreQuery::Filter { profiles } => self.select_via_filter(profiles).await,
        }
    }

    async fn stored_fingerprints(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, Option<String>>, BacklogError> {
        let mut out = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK) {
            let list: Vec<String> = chunk.iter().map(|id| id.to_string()).collect();
            let filter = format!("in.({})", list.join(","));
            let resp = self
                .authed(self.http.get(self.rest_url(TABLE)))
                .query(&[("select", "id,change_hash"), ("id", filter.as_str())])
                .send()
                .await
                .map_err(BacklogError::data_access)?;
            let rows: Vec<IdRow> = read_json(resp).await?;
            out.extend(rows.into_iter().map(|r| (RecordId(r.id), r.change_hash)));
        }
        Ok(out)
    }

    async fn update_record(&self, id: RecordId, update: &RecordUpdate) -> Result<(), BacklogError> {
        let resp = self
            .authed(self.http.patch(self.rest_url(TABLE)))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&update.to_row())
            .send()
            .await
            .map_err(BacklogError::data_access)?;
        let rows: Vec<IdRow> = read_json(resp).await?;
        if rows.is_empty() {
            return Err(BacklogError::DataAccess(format!("no record with id {id}")));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}
