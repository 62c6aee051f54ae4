//! Firestore REST adapter for the remote mirror.
//!
//! # Responsibility
//! - Map `RemoteRecord` to Firestore typed document fields and back.
//! - Sign in anonymously and reuse the id token for document calls.
//!
//! # Invariants
//! - Status fields round-trip as their wire strings; documents holding any
//!   other status are reported as rejected, never returned.
//! - A 401 response drops the cached token; the next call signs in again.
//! - Document contents are never logged.

use crate::config::MirrorConfig;
use crate::model::entry::CareStatus;
use crate::sync::remote_mirror::{
    MirrorError, MirrorResult, MirrorStage, RemoteDocument, RemoteListing, RemoteMirror,
    RemoteRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use log::{info, warn};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

const LIST_PAGE_SIZE: u32 = 300;
const FIELD_EVALUATOR_NAME: &str = "evaluatorName";
const FIELD_STATUS_ADPRO: &str = "statusAdpro";
const FIELD_STATUS_VASELINE: &str = "statusVaseline";
const FIELD_NOTE: &str = "note";
const FIELD_CREATED_AT: &str = "createdAt";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirestoreValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp_value: Option<String>,
}

impl FirestoreValue {
    fn string(value: impl Into<String>) -> Self {
        Self {
            string_value: Some(value.into()),
            ..Self::default()
        }
    }

    fn timestamp(value: impl Into<String>) -> Self {
        Self {
            timestamp_value: Some(value.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct FirestoreDocument {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default)]
    fields: BTreeMap<String, FirestoreValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
}

/// Remote mirror backed by the Firestore REST API.
pub struct FirestoreMirror {
    client: Client,
    config: MirrorConfig,
    id_token: Mutex<Option<String>>,
}

impl FirestoreMirror {
    pub fn new(config: MirrorConfig) -> MirrorResult<Self> {
        let client = Client::builder().build().map_err(|err| {
            MirrorError::new(MirrorStage::Auth, "client_init", err.to_string(), false)
        })?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: MirrorConfig) -> Self {
        Self {
            client,
            config,
            id_token: Mutex::new(None),
        }
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            self.config.firestore_endpoint, self.config.project_id, self.config.collection
        )
    }

    fn cached_token(&self) -> Option<String> {
        self.id_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store_token(&self, token: Option<String>) {
        *self
            .id_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    async fn token(&self) -> MirrorResult<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let url = format!("{}/accounts:signUp", self.config.identity_endpoint);
        let response = self
            .client
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&serde_json::json!({ "returnSecureToken": true }))
            .send()
            .await
            .map_err(|err| transport_error(MirrorStage::Auth, err))?;
        let response = self.check_status(MirrorStage::Auth, response).await?;
        let body: SignUpResponse = response
            .json()
            .await
            .map_err(|err| decode_error(MirrorStage::Auth, err))?;

        info!(
            "event=mirror_auth module=sync status=ok mirror={}",
            self.mirror_id()
        );
        self.store_token(Some(body.id_token.clone()));
        Ok(body.id_token)
    }

    async fn check_status(&self, stage: MirrorStage, response: Response) -> MirrorResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.store_token(None);
        }
        let body = response.text().await.unwrap_or_default();
        Err(MirrorError::new(
            stage,
            format!("http_{}", status.as_u16()),
            summarize_body(&body),
            status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
        ))
    }

    async fn list_page(&self, page_token: Option<&str>) -> MirrorResult<ListDocumentsResponse> {
        let token = self.token().await?;
        let mut request = self
            .client
            .get(self.collection_url())
            .bearer_auth(token)
            .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }
        let response = request
            .send()
            .await
            .map_err(|err| transport_error(MirrorStage::List, err))?;
        let response = self.check_status(MirrorStage::List, response).await?;
        response
            .json()
            .await
            .map_err(|err| decode_error(MirrorStage::List, err))
    }
}

#[async_trait]
impl RemoteMirror for FirestoreMirror {
    fn mirror_id(&self) -> &str {
        "firestore"
    }

    async fn list_all(&self) -> MirrorResult<RemoteListing> {
        let mut listing = RemoteListing::default();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_page(page_token.as_deref()).await?;
            for document in page.documents {
                match decode_document(&document) {
                    Ok(decoded) => listing.documents.push(decoded),
                    Err(err) => {
                        let id = document_id(&document.name).to_string();
                        warn!(
                            "event=mirror_list module=sync status=rejected remote_id={} error={}",
                            id, err
                        );
                        listing.rejected.push(id);
                    }
                }
            }
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(listing)
    }

    async fn create(&self, record: &RemoteRecord) -> MirrorResult<String> {
        let token = self.token().await?;
        let response = self
            .client
            .post(self.collection_url())
            .bearer_auth(token)
            .json(&encode_document(record))
            .send()
            .await
            .map_err(|err| transport_error(MirrorStage::Create, err))?;
        let response = self.check_status(MirrorStage::Create, response).await?;
        let created: FirestoreDocument = response
            .json()
            .await
            .map_err(|err| decode_error(MirrorStage::Create, err))?;

        let remote_id = document_id(&created.name);
        if remote_id.is_empty() {
            return Err(MirrorError::new(
                MirrorStage::Create,
                "missing_document_name",
                "create response carried no document name",
                false,
            ));
        }
        Ok(remote_id.to_string())
    }

    async fn delete(&self, remote_id: &str) -> MirrorResult<()> {
        let token = self.token().await?;
        let response = self
            .client
            .delete(format!("{}/{}", self.collection_url(), remote_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| transport_error(MirrorStage::Delete, err))?;
        self.check_status(MirrorStage::Delete, response).await?;
        Ok(())
    }
}

fn encode_document(record: &RemoteRecord) -> FirestoreDocument {
    let mut fields = BTreeMap::new();
    fields.insert(
        FIELD_EVALUATOR_NAME.to_string(),
        FirestoreValue::string(record.evaluator_name.as_str()),
    );
    fields.insert(
        FIELD_STATUS_ADPRO.to_string(),
        FirestoreValue::string(record.status_adpro.as_str()),
    );
    fields.insert(
        FIELD_STATUS_VASELINE.to_string(),
        FirestoreValue::string(record.status_vaseline.as_str()),
    );
    fields.insert(
        FIELD_NOTE.to_string(),
        FirestoreValue::string(record.note.as_str()),
    );
    fields.insert(
        FIELD_CREATED_AT.to_string(),
        FirestoreValue::timestamp(
            record
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
    );
    FirestoreDocument {
        name: String::new(),
        fields,
    }
}

fn decode_document(document: &FirestoreDocument) -> Result<RemoteDocument, String> {
    let remote_id = document_id(&document.name);
    if remote_id.is_empty() {
        return Err("document has no name".to_string());
    }

    let created_raw = document
        .fields
        .get(FIELD_CREATED_AT)
        .and_then(|value| {
            value
                .timestamp_value
                .as_deref()
                .or(value.string_value.as_deref())
        })
        .ok_or_else(|| format!("missing field {FIELD_CREATED_AT}"))?;
    let created_at = DateTime::parse_from_rfc3339(created_raw)
        .map_err(|err| format!("invalid {FIELD_CREATED_AT}: {err}"))?;

    Ok(RemoteDocument {
        remote_id: remote_id.to_string(),
        record: RemoteRecord {
            evaluator_name: field_text(document, FIELD_EVALUATOR_NAME)
                .unwrap_or_default()
                .to_string(),
            status_adpro: field_status(document, FIELD_STATUS_ADPRO)?,
            status_vaseline: field_status(document, FIELD_STATUS_VASELINE)?,
            note: field_text(document, FIELD_NOTE)
                .unwrap_or_default()
                .to_string(),
            created_at,
        },
    })
}

fn field_text<'a>(document: &'a FirestoreDocument, field: &str) -> Option<&'a str> {
    document
        .fields
        .get(field)
        .and_then(|value| value.string_value.as_deref())
}

fn field_status(document: &FirestoreDocument, field: &str) -> Result<CareStatus, String> {
    let raw = field_text(document, field).ok_or_else(|| format!("missing field {field}"))?;
    CareStatus::parse(raw).ok_or_else(|| format!("unknown status `{raw}` in {field}"))
}

/// Last path segment of a fully qualified document name.
fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or_default()
}

fn transport_error(stage: MirrorStage, err: reqwest::Error) -> MirrorError {
    MirrorError::new(stage, "transport", err.to_string(), true)
}

fn decode_error(stage: MirrorStage, err: reqwest::Error) -> MirrorError {
    MirrorError::new(stage, "invalid_response", err.to_string(), false)
}

fn summarize_body(body: &str) -> String {
    let flattened = body.replace(['\n', '\r'], " ");
    flattened.trim().chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::{decode_document, document_id, encode_document, FirestoreDocument};
    use crate::model::entry::CareStatus;
    use crate::sync::remote_mirror::RemoteRecord;
    use chrono::DateTime;

    fn record() -> RemoteRecord {
        RemoteRecord {
            evaluator_name: "Sato".to_string(),
            status_adpro: CareStatus::Done,
            status_vaseline: CareStatus::NotApplicable,
            note: "dry skin".to_string(),
            created_at: DateTime::parse_from_rfc3339("2024-05-10T10:00:00.000+09:00").unwrap(),
        }
    }

    #[test]
    fn encode_uses_typed_values() {
        let json = serde_json::to_value(encode_document(&record())).unwrap();
        assert_eq!(json["fields"]["evaluatorName"]["stringValue"], "Sato");
        assert_eq!(json["fields"]["statusVaseline"]["stringValue"], "not_applicable");
        assert_eq!(
            json["fields"]["createdAt"]["timestampValue"],
            "2024-05-10T10:00:00.000+09:00"
        );
        assert!(json.get("name").is_none());
    }

    #[test]
    fn decode_reads_listed_document() {
        let mut document = encode_document(&record());
        document.name = "projects/p/databases/(default)/documents/records/abc123".to_string();
        let decoded = decode_document(&document).unwrap();
        assert_eq!(decoded.remote_id, "abc123");
        assert_eq!(decoded.record, record());
    }

    #[test]
    fn decode_accepts_server_timestamp_format() {
        let document: FirestoreDocument = serde_json::from_value(serde_json::json!({
            "name": "projects/p/databases/(default)/documents/records/x1",
            "fields": {
                "evaluatorName": {"stringValue": "Suzuki"},
                "statusAdpro": {"stringValue": "not_done"},
                "statusVaseline": {"stringValue": "done"},
                "note": {"stringValue": ""},
                "createdAt": {"timestampValue": "2024-04-30T23:59:59.123456Z"}
            },
            "createTime": "2024-04-30T23:59:59.200000Z"
        }))
        .unwrap();
        let decoded = decode_document(&document).unwrap();
        assert_eq!(decoded.record.status_adpro, CareStatus::NotDone);
        assert_eq!(decoded.record.evaluator_name, "Suzuki");
    }

    #[test]
    fn decode_rejects_unknown_status() {
        let mut document = encode_document(&record());
        document.name = "records/bad".to_string();
        document
            .fields
            .get_mut("statusAdpro")
            .unwrap()
            .string_value = Some("partial".to_string());
        let err = decode_document(&document).unwrap_err();
        assert!(err.contains("partial"));
    }

    #[test]
    fn document_id_takes_last_segment() {
        assert_eq!(document_id("a/b/c"), "c");
        assert_eq!(document_id("solo"), "solo");
        assert_eq!(document_id(""), "");
    }
}
