use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{f64_value, str_field};
use crate::error::HpxError;

/// Minimum match score at which a prior config is reused without an interview.
pub const CONFIG_REUSE_THRESHOLD: f64 = 0.85;

/// File formats the upload endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Excel,
    Csv,
    Pdf,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Excel => "excel",
            FileType::Csv => "csv",
            FileType::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileType::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            FileType::Csv => "text/csv",
            FileType::Pdf => "application/pdf",
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, HpxError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "xlsx" | "xls" | "xlsm" => Ok(FileType::Excel),
            "csv" => Ok(FileType::Csv),
            "pdf" => Ok(FileType::Pdf),
            _ => Err(HpxError::BadRequest(format!(
                "Cannot infer file_type from '{}'; pass one of: excel, csv, pdf",
                path.display()
            ))),
        }
    }
}

/// Result of the compound presign + PUT upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub session_id: String,
    pub upload_id: String,
    pub s3_key: String,
    pub filename: String,
    pub file_type: FileType,
    pub bytes_uploaded: usize,
}

impl UploadReceipt {
    pub fn to_body(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// A prior validation config matched against an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigMatch {
    pub config_id: String,
    pub match_score: f64,
}

impl ConfigMatch {
    pub fn is_reusable(&self) -> bool {
        self.match_score >= CONFIG_REUSE_THRESHOLD
    }
}

/// Read `matches` (or the older `config_matches`) best-first.
pub fn parse_config_matches(raw: &Map<String, Value>) -> Vec<ConfigMatch> {
    let items = raw
        .get("matches")
        .or_else(|| raw.get("config_matches"))
        .and_then(|v| v.as_array());
    let mut matches: Vec<ConfigMatch> = items
        .map(|items| {
            items
                .iter()
                .filter_map(|m| {
                    let map = m.as_object()?;
                    Some(ConfigMatch {
                        config_id: str_field(map, "config_id")?,
                        match_score: map.get("match_score").and_then(f64_value).unwrap_or(0.0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    matches.sort_by(|a, b| {
        b.match_score
            .partial_cmp(&a.match_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches
}

/// Outcome of `confirm_upload`: either a reusable config or an interview.
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub session_id: String,
    /// Set only when the best match reaches [`CONFIG_REUSE_THRESHOLD`].
    pub matched: Option<ConfigMatch>,
    /// Set only when no reusable config exists.
    pub conversation_id: Option<String>,
    pub raw: Map<String, Value>,
}

impl ConfirmOutcome {
    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = self.raw.clone();
        body.insert("session_id".into(), Value::String(self.session_id.clone()));
        body.remove("conversation_id");
        body.remove("config_id");
        body.remove("match_score");
        match (&self.matched, &self.conversation_id) {
            (Some(m), _) => {
                body.insert("config_id".into(), Value::String(m.config_id.clone()));
                body.insert("match_score".into(), Value::from(m.match_score));
            }
            (None, Some(conversation_id)) => {
                body.insert(
                    "conversation_id".into(),
                    Value::String(conversation_id.clone()),
                );
            }
            (None, None) => {}
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_type_inference() {
        assert_eq!(FileType::from_path(Path::new("companies.XLSX")).unwrap(), FileType::Excel);
        assert_eq!(FileType::from_path(Path::new("/tmp/x.csv")).unwrap(), FileType::Csv);
        assert_eq!(FileType::from_path(Path::new("paper.pdf")).unwrap(), FileType::Pdf);
        assert!(FileType::from_path(Path::new("notes.txt")).is_err());
    }

    #[test]
    fn test_matches_sorted_best_first() {
        let raw = json!({
            "matches": [
                { "config_id": "cfg_low", "match_score": 0.4 },
                { "config_id": "cfg_high", "match_score": 0.91 },
                { "match_score": 0.99 }
            ]
        });
        let matches = parse_config_matches(raw.as_object().unwrap());
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].config_id, "cfg_high");
        assert!(matches[0].is_reusable());
        assert!(!matches[1].is_reusable());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let m = ConfigMatch {
            config_id: "cfg".into(),
            match_score: CONFIG_REUSE_THRESHOLD,
        };
        assert!(m.is_reusable());
    }
}
