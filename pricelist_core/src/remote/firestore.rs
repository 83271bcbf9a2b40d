//! Firestore REST backend.
//!
//! Talks to the Firestore v1 REST API with `reqwest`. Documents carry typed
//! values (`{"stringValue": ..}`, `{"doubleValue": ..}`, ...); this module
//! converts between those and [`Material`].
//!
//! The REST API has no push channel, so the watch is a polling task: it lists
//! the collection every `poll_interval`, emits a snapshot when the listing
//! changed, and stops after emitting one failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{order_snapshot, RemoteStore, SyncEvent, SyncReceiver};
use crate::errors::{PriceError, PriceResult};
use crate::material::{FieldUpdate, Material, MaterialDraft, MaterialId, MaterialPatch};
use crate::numeric::{decimal_from_f64, parse_decimal, to_f64};

/// Firestore REST endpoint
pub const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

const PAGE_SIZE: &str = "300";

/// Connection settings for a Firestore collection.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Web API key, sent as the `key` query parameter
    pub api_key: Option<String>,
    pub collection: String,
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Overridable for emulators
    pub base_url: String,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>, collection: impl Into<String>) -> Self {
        FirestoreConfig {
            project_id: project_id.into(),
            api_key: None,
            collection: collection.into(),
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(10),
            base_url: FIRESTORE_BASE_URL.to_string(),
        }
    }

    pub fn collection_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            self.collection
        )
    }

    pub fn document_url(&self, id: &MaterialId) -> String {
        format!("{}/{}", self.collection_url(), id)
    }
}

struct Shared {
    client: reqwest::Client,
    config: FirestoreConfig,
}

/// Remote store backed by a Firestore collection.
pub struct FirestoreRemote {
    shared: Arc<Shared>,
}

impl FirestoreRemote {
    pub fn new(config: FirestoreConfig) -> PriceResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("pricelist/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                PriceError::remote("connect", format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(FirestoreRemote {
            shared: Arc::new(Shared { client, config }),
        })
    }
}

impl Shared {
    fn keyed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.query(&[("key", key.as_str())]),
            None => request,
        }
    }

    async fn list(&self) -> PriceResult<Vec<Material>> {
        let mut materials = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .keyed(self.client.get(self.config.collection_url()))
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = send(request, "list").await?;
            let page: ListDocumentsResponse = response
                .json()
                .await
                .map_err(|e| {
                    PriceError::remote("list", format!("Failed to parse response: {}", e))
                })?;

            materials.extend(page.documents.iter().map(decode_document));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        order_snapshot(&mut materials);
        Ok(materials)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Send a request and turn non-2xx responses into remote errors.
async fn send(request: reqwest::RequestBuilder, operation: &str) -> PriceResult<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| PriceError::remote(operation, format!("Network error: {}", e)))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(PriceError::remote(
        operation,
        format!("Firestore returned {}: {}", status, error_message(&body)),
    ))
}

/// Pull `error.message` out of a Firestore error body, or fall back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Last path segment of a document resource name.
fn document_id(name: &str) -> MaterialId {
    MaterialId::new(name.rsplit('/').next().unwrap_or(name))
}

fn decode_document(document: &Document) -> Material {
    let fields = &document.fields;
    Material {
        id: Some(document_id(&document.name)),
        name: decode_string(fields.get("name")),
        unit: decode_string(fields.get("unit")),
        real_price: decode_decimal(fields.get("realPrice")),
        markup: decode_decimal(fields.get("markup")),
        profit_margin: decode_decimal(fields.get("profitMargin")),
        created_at: decode_timestamp(fields.get("createdAt")),
        updated_at: decode_timestamp(fields.get("updatedAt")),
        imported_at: decode_timestamp(fields.get("importedAt")),
    }
}

fn decode_string(value: Option<&Value>) -> String {
    value
        .and_then(|v| v.get("stringValue"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn decode_decimal(value: Option<&Value>) -> Decimal {
    let Some(value) = value else {
        return Decimal::ZERO;
    };
    let parsed = if let Some(double) = value.get("doubleValue") {
        match double {
            Value::Number(n) => n.as_f64().and_then(decimal_from_f64),
            // NaN and Infinity arrive as strings
            Value::String(s) => parse_decimal(s),
            _ => None,
        }
    } else if let Some(integer) = value.get("integerValue") {
        match integer {
            Value::String(s) => parse_decimal(s),
            Value::Number(n) => parse_decimal(&n.to_string()),
            _ => None,
        }
    } else {
        value.get("stringValue").and_then(Value::as_str).and_then(parse_decimal)
    };
    parsed.unwrap_or_default()
}

fn decode_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let text = value?.get("timestampValue")?.as_str()?;
    DateTime::parse_from_rfc3339(text).ok().map(|ts| ts.with_timezone(&Utc))
}

fn encode_string(value: &str) -> Value {
    json!({ "stringValue": value })
}

fn encode_decimal(value: Decimal) -> Value {
    json!({ "doubleValue": to_f64(value) })
}

fn encode_timestamp(value: DateTime<Utc>) -> Value {
    json!({ "timestampValue": value.to_rfc3339() })
}

fn encode_update(update: &FieldUpdate) -> Value {
    match update {
        FieldUpdate::Name(s) | FieldUpdate::Unit(s) => encode_string(s),
        FieldUpdate::RealPrice(d) | FieldUpdate::Markup(d) | FieldUpdate::ProfitMargin(d) => {
            encode_decimal(*d)
        }
    }
}

fn encode_draft(draft: &MaterialDraft) -> Value {
    let mut fields = Map::new();
    fields.insert("name".into(), encode_string(&draft.name));
    fields.insert("unit".into(), encode_string(&draft.unit));
    fields.insert("realPrice".into(), encode_decimal(draft.real_price));
    fields.insert("markup".into(), encode_decimal(draft.markup));
    fields.insert("profitMargin".into(), encode_decimal(draft.profit_margin));
    if let Some(ts) = draft.created_at {
        fields.insert("createdAt".into(), encode_timestamp(ts));
    }
    if let Some(ts) = draft.updated_at {
        fields.insert("updatedAt".into(), encode_timestamp(ts));
    }
    if let Some(ts) = draft.imported_at {
        fields.insert("importedAt".into(), encode_timestamp(ts));
    }
    json!({ "fields": fields })
}

fn encode_patch(patch: &MaterialPatch) -> Value {
    let mut fields = Map::new();
    for update in &patch.updates {
        fields.insert(update.field_name().into(), encode_update(update));
    }
    fields.insert("updatedAt".into(), encode_timestamp(patch.updated_at));
    json!({ "fields": fields })
}

async fn watch(shared: Arc<Shared>, tx: mpsc::UnboundedSender<SyncEvent>, mut last: Vec<Material>) {
    let mut ticker = tokio::time::interval(shared.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!("firestore watch closed by receiver");
                return;
            }
            _ = ticker.tick() => {}
        }

        match shared.list().await {
            Ok(snapshot) => {
                if snapshot != last {
                    if tx.send(SyncEvent::Snapshot(snapshot.clone())).is_err() {
                        return;
                    }
                    last = snapshot;
                }
            }
            Err(e) => {
                warn!("firestore watch failed: {}", e);
                let _ = tx.send(SyncEvent::Failed(PriceError::subscription(e.to_string())));
                return;
            }
        }
    }
}

#[async_trait]
impl RemoteStore for FirestoreRemote {
    fn name(&self) -> &'static str {
        "firestore"
    }

    async fn subscribe(&self) -> PriceResult<SyncReceiver> {
        let initial = self
            .shared
            .list()
            .await
            .map_err(|e| PriceError::subscription(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(SyncEvent::Snapshot(initial.clone()));
        tokio::spawn(watch(Arc::clone(&self.shared), tx, initial));
        Ok(rx)
    }

    async fn create(&self, draft: &MaterialDraft) -> PriceResult<MaterialId> {
        let shared = &self.shared;
        let request = shared
            .keyed(shared.client.post(shared.config.collection_url()))
            .json(&encode_draft(draft));

        let response = send(request, "create").await?;
        let document: Document = response
            .json()
            .await
            .map_err(|e| PriceError::remote("create", format!("Failed to parse response: {}", e)))?;
        Ok(document_id(&document.name))
    }

    async fn update(&self, id: &MaterialId, patch: &MaterialPatch) -> PriceResult<()> {
        let shared = &self.shared;
        let mut query: Vec<(&str, &str)> = patch
            .field_paths()
            .into_iter()
            .map(|path| ("updateMask.fieldPaths", path))
            .collect();
        query.push(("currentDocument.exists", "true"));

        let request = shared
            .keyed(shared.client.patch(shared.config.document_url(id)))
            .query(&query)
            .json(&encode_patch(patch));
        send(request, "update").await?;
        Ok(())
    }

    async fn delete(&self, id: &MaterialId) -> PriceResult<()> {
        let shared = &self.shared;
        let request = shared.keyed(shared.client.delete(shared.config.document_url(id)));
        send(request, "delete").await?;
        Ok(())
    }
}
