//! Analytics sink: a write-through request log in a document store with
//! fingerprint co-occurrence lookups.
//!
//! Every write is best-effort; a down database costs log lines, never
//! requests.

use mongodb::bson::doc;
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::server::request::{clean_ip, RequestDescriptor};

/// One logged request, indexed by each fingerprint kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestLog {
    pub user_agent: String,
    pub ja3: String,
    pub ja4: String,
    pub ja4h: String,
    pub h2: String,
    pub peetprint: String,
    /// Client IP without the port; empty unless IP logging is enabled.
    #[serde(default)]
    pub ip: String,
    pub time_unix: i64,
}

impl RequestLog {
    /// Flatten a descriptor into the stored record. The H2 column holds
    /// the Akamai fingerprint for HTTP/2 requests and `-` for HTTP/1.1.
    pub fn from_descriptor(req: &RequestDescriptor, log_ip: bool) -> Self {
        let h2 = match req.http_version.as_str() {
            "h2" => req
                .http2
                .as_ref()
                .map(|d| d.akamai_fingerprint.clone())
                .unwrap_or_default(),
            "http/1.1" => "-".to_string(),
            _ => String::new(),
        };
        Self {
            user_agent: req.user_agent.clone(),
            ja3: req.tls.ja3.clone(),
            ja4: req.tls.ja4.clone(),
            ja4h: req.tls.ja4h.clone(),
            h2,
            peetprint: req.tls.peetprint.clone(),
            ip: if log_ip { clean_ip(&req.ip) } else { String::new() },
            time_unix: chrono::Utc::now().timestamp(),
        }
    }
}

/// Searchable fingerprint kinds; the variants name the indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Ja3,
    Ja4,
    Ja4h,
    H2,
    PeetPrint,
    UserAgent,
}

impl SearchKind {
    pub fn field(self) -> &'static str {
        match self {
            Self::Ja3 => "ja3",
            Self::Ja4 => "ja4",
            Self::Ja4h => "ja4h",
            Self::H2 => "h2",
            Self::PeetPrint => "peetprint",
            Self::UserAgent => "user_agent",
        }
    }
}

/// Handle on the configured collection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Analytics {
    collection: Collection<RequestLog>,
}

impl Analytics {
    /// Connect with the configured URL, database and collection.
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = Client::with_uri_str(&config.mongo_url).await?;
        let collection = client
            .database(&config.mongo_database)
            .collection(&config.mongo_collection);
        Ok(Self { collection })
    }

    /// Insert one record.
    pub async fn insert(&self, record: RequestLog) -> Result<()> {
        self.collection.insert_one(record).await?;
        Ok(())
    }

    /// Total number of logged requests.
    pub async fn total_count(&self) -> Result<u64> {
        Ok(self.collection.count_documents(doc! {}).await?)
    }

    /// All records whose `kind` field equals `value`.
    pub async fn find_by(&self, kind: SearchKind, value: &str) -> Result<Vec<RequestLog>> {
        use futures_util::TryStreamExt;
        let mut filter = mongodb::bson::Document::new();
        filter.insert(kind.field(), value);
        let cursor = self.collection.find(filter).await?;
        Ok(cursor.try_collect().await?)
    }
}

/// Count occurrences of a projected field and keep the top ten, sorted
/// by descending count.
pub fn top_counts<F>(logs: &[RequestLog], project: F) -> serde_json::Map<String, serde_json::Value>
where
    F: Fn(&RequestLog) -> &str,
{
    use std::collections::HashMap;

    let mut counts: HashMap<&str, u64> = HashMap::new();
    for log in logs {
        *counts.entry(project(log)).or_insert(0) += 1;
    }

    let mut sorted: Vec<(&str, u64)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    sorted
        .into_iter()
        .take(10)
        .map(|(value, count)| (value.to_string(), serde_json::Value::from(count)))
        .collect()
}
