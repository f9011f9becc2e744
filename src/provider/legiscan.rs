// src/provider/legiscan.rs
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use metrics::{counter, histogram};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::LegiscanConfig;
use crate::provider::{BillMetadata, BillProvider, DocumentRef, MasterListEntry};
use crate::record::RecordId;

const DEFAULT_BASE_URL: &str = "https://api.legiscan.com/";

/// LegiScan pull API client (`getBill`, `getBillText`, `getMasterListRaw`).
pub struct LegiscanProvider {
    http: Client,
    base_url: String,
    api_key: String,
    access_key: String,
    session_id: Option<u64>,
}

impl LegiscanProvider {
    pub fn new(cfg: &LegiscanConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; bill-backlog/0.1)")
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .context("building legiscan http client")?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: cfg.api_key.clone(),
            access_key: cfg.access_key.clone(),
            session_id: cfg.session_id,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn call(&self, op: &'static str, id: u64) -> Result<Value> {
        let t0 = std::time::Instant::now();
        let id = id.to_string();
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[
                ("op", op),
                ("id", id.as_str()),
                ("key", self.api_key.as_str()),
                ("access_key", self.access_key.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("legiscan {op} request"))?;
        let resp = resp
            .error_for_status()
            .with_context(|| format!("legiscan {op} non-2xx"))?;
        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("legiscan {op} body"))?;
        histogram!("provider_request_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("provider_requests_total").increment(1);
        check_status(op, body)
    }
}

/// LegiScan answers 200 with `{"status":"ERROR","alert":{...}}` on failure.
fn check_status(op: &str, body: Value) -> Result<Value> {
    match body.get("status").and_then(Value::as_str) {
        Some("OK") => Ok(body),
        Some(_) => {
            let msg = body
                .pointer("/alert/message")
                .and_then(Value::as_str)
                .unwrap_or("no alert message");
            Err(anyhow!("legiscan {op} returned ERROR: {msg}"))
        }
        None => Err(anyhow!("legiscan {op} payload has no status")),
    }
}

#[derive(Debug, Deserialize)]
struct BillEnvelope {
    bill: BillPayload,
}

#[derive(Debug, Deserialize)]
struct BillPayload {
    bill_id: u64,
    #[serde(default)]
    bill_number: Option<String>,
    #[serde(default)]
    change_hash: Option<String>,
    #[serde(default)]
    texts: Vec<TextPayload>,
}

#[derive(Debug, Deserialize)]
struct TextPayload {
    #[serde(default)]
    doc_id: Option<u64>,
}

fn parse_bill(body: Value) -> Result<BillMetadata> {
    let env: BillEnvelope = serde_json::from_value(body).context("parsing getBill payload")?;
    let b = env.bill;
    Ok(BillMetadata {
        id: RecordId(b.bill_id),
        label: b.bill_number.filter(|s| !s.trim().is_empty()),
        fingerprint: b.change_hash.filter(|s| !s.trim().is_empty()),
        documents: b
            .texts
            .into_iter()
            .map(|t| DocumentRef {
                doc_id: t.doc_id.unwrap_or(0),
            })
            .collect(),
    })
}

fn parse_text(body: &Value) -> Result<Vec<u8>> {
    let doc = body
        .pointer("/text/doc")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("getBillText payload has no text.doc"))?;
    let cleaned: String = doc.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .context("decoding base64 document")
}

/// `masterlist` is an object keyed "0", "1", ... plus a "session" entry.
fn parse_master_list(body: &Value) -> Result<Vec<MasterListEntry>> {
    let Some(list) = body.get("masterlist").and_then(Value::as_object) else {
        bail!("master list not found in response");
    };
    let mut out: Vec<(u64, MasterListEntry)> = list
        .iter()
        .filter_map(|(key, v)| {
            let order = key.parse::<u64>().ok()?;
            let id = v.get("bill_id")?.as_u64()?;
            let fingerprint = v.get("change_hash")?.as_str()?.to_string();
            Some((
                order,
                MasterListEntry {
                    id: RecordId(id),
                    fingerprint,
                },
            ))
        })
        .collect();
    out.sort_by_key(|(order, _)| *order);
    Ok(out.into_iter().map(|(_, e)| e).collect())
}

#[async_trait]
impl BillProvider for LegiscanProvider {
    async fn bill_metadata(&self, id: RecordId) -> Result<BillMetadata> {
        let body = self.call("getBill", id.0).await?;
        parse_bill(body)
    }

    async fn document_body(&self, doc_id: u64) -> Result<Vec<u8>> {
        let body = self.call("getBillText", doc_id).await?;
        parse_text(&body)
    }

    async fn master_list(&self) -> Result<Vec<MasterListEntry>> {
        let Some(session) = self.session_id else {
            bail!("no LegiScan session configured for master list");
        };
        let body = self.call("getMasterListRaw", session).await?;
        parse_master_list(&body)
    }

    fn name(&self) -> &'static str {
        "legiscan"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bill_payload_maps_label_hash_and_documents() {
        let body = json!({
            "status": "OK",
            "bill": {
                "bill_id": 1650001,
                "bill_number": "HB 12",
                "change_hash": "0f3c",
                "texts": [{ "doc_id": 10 }, { "doc_id": 11 }]
            }
        });
        let meta = parse_bill(check_status("getBill", body).unwrap()).unwrap();
        assert_eq!(meta.id, RecordId(1650001));
        assert_eq!(meta.label.as_deref(), Some("HB 12"));
        assert_eq!(meta.fingerprint.as_deref(), Some("0f3c"));
        assert_eq!(meta.latest_document(), Some(&DocumentRef { doc_id: 11 }));
    }

    #[test]
    fn missing_or_zero_doc_id_means_no_document() {
        let none = parse_bill(json!({ "bill": { "bill_id": 1, "texts": [] } })).unwrap();
        assert!(none.latest_document().is_none());
        let zero =
            parse_bill(json!({ "bill": { "bill_id": 1, "texts": [{ "doc_id": null }] } }))
                .unwrap();
        assert!(zero.latest_document().is_none());
    }

    #[test]
    fn error_status_carries_the_alert() {
        let err = check_status(
            "getBill",
            json!({ "status": "ERROR", "alert": { "message": "Unknown bill id" } }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown bill id"));
    }

    #[test]
    fn text_is_base64_decoded() {
        // "AN ACT" base64, wrapped the way the API sometimes returns it
        let body = json!({ "status": "OK", "text": { "doc": "QU4g\nQUNU" } });
        assert_eq!(parse_text(&body).unwrap(), b"AN ACT".to_vec());
        assert!(parse_text(&json!({ "text": {} })).is_err());
    }

    #[test]
    fn master_list_skips_session_entry_and_keeps_order() {
        let body = json!({
            "status": "OK",
            "masterlist": {
                "session": { "session_id": 2172 },
                "1": { "bill_id": 20, "change_hash": "b" },
                "0": { "bill_id": 10, "change_hash": "a" }
            }
        });
        let list = parse_master_list(&body).unwrap();
        assert_eq!(
            list,
            vec![
                MasterListEntry { id: RecordId(10), fingerprint: "a".into() },
                MasterListEntry { id: RecordId(20), fingerprint: "b".into() },
            ]
        );
    }
}
