use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::Document;

/// The per-user cloud record: the document plus the server's write time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudDocument {
    #[serde(flatten)]
    pub document: Document,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub last_updated: DateTime<Utc>,
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudMeta {
    pub last_updated: Option<DateTime<Utc>>,
}
