//! Enriched result schema (`table_metadata.json`), consumed as-is.
//!
//! Every field is optional on the wire; deserialisation is lenient so a
//! schema addition on the server never breaks result retrieval.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    #[serde(alias = "high")]
    High,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "low")]
    Low,
    #[serde(alias = "id")]
    Id,
    #[serde(other)]
    Unknown,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
            Confidence::Id => "ID",
            Confidence::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub rows: Vec<RowRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub importance: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowRecord {
    #[serde(default)]
    pub row_key: Option<Value>,
    #[serde(default)]
    pub cells: BTreeMap<String, Cell>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub full_value: Option<Value>,
    #[serde(default)]
    pub display_value: Option<Value>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub comment: Option<CellComment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellComment {
    #[serde(default)]
    pub validator_explanation: Option<String>,
    #[serde(default)]
    pub qc_reasoning: Option<String>,
    #[serde(default)]
    pub key_citation: Option<Value>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl TableMetadata {
    /// Count cells per confidence level across all rows.
    pub fn confidence_counts(&self) -> BTreeMap<Confidence, usize> {
        let mut counts = BTreeMap::new();
        for cell in self.rows.iter().flat_map(|r| r.cells.values()) {
            if let Some(confidence) = cell.confidence {
                *counts.entry(confidence).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Results of a completed job, with the metadata file embedded when available.
#[derive(Debug, Clone)]
pub struct ResultsBundle {
    pub job_id: String,
    pub metadata: Option<TableMetadata>,
    pub raw: Map<String, Value>,
}

impl ResultsBundle {
    pub fn download_url(&self) -> Option<&str> {
        self.raw
            .get("results")
            .and_then(|r| r.get("download_url"))
            .and_then(|v| v.as_str())
    }

    pub fn row_count(&self) -> usize {
        self.metadata.as_ref().map(|m| m.rows.len()).unwrap_or(0)
    }

    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = self.raw.clone();
        body.entry("job_id")
            .or_insert_with(|| Value::String(self.job_id.clone()));
        if let Some(metadata) = &self.metadata {
            let counts: Map<String, Value> = metadata
                .confidence_counts()
                .into_iter()
                .map(|(c, n)| (c.as_str().to_string(), Value::from(n)))
                .collect();
            body.insert("row_count".into(), Value::from(metadata.rows.len()));
            body.insert("confidence_counts".into(), Value::Object(counts));
        }
        body
    }
}
