use chrono::NaiveDate;

use super::requests::GetUsageRequest;
use super::{body_of, Body, WorkflowAdapter};
use crate::error::{HpxError, HpxResult};

impl WorkflowAdapter {
    pub async fn get_balance(&self) -> HpxResult<Body> {
        let data = self.client.get("/account/balance", &[]).await?;
        Ok(body_of(data))
    }

    pub async fn get_usage(&self, req: GetUsageRequest) -> HpxResult<Body> {
        let start = parse_date("start_date", req.start_date.as_deref())?;
        let end = parse_date("end_date", req.end_date.as_deref())?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(HpxError::BadRequest(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }

        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(start) = start {
            query.push(("start_date", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = end {
            query.push(("end_date", end.format("%Y-%m-%d").to_string()));
        }
        if let Some(limit) = req.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(offset) = req.offset {
            query.push(("offset", offset.to_string()));
        }

        let data = self.client.get("/account/usage", &query).await?;
        Ok(body_of(data))
    }
}

fn parse_date(field: &str, value: Option<&str>) -> HpxResult<Option<NaiveDate>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| HpxError::BadRequest(format!("{} must be YYYY-MM-DD, got '{}'", field, v))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("start_date", None).unwrap(), None);
        assert_eq!(
            parse_date("start_date", Some("2026-03-01")).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        let err = parse_date("end_date", Some("03/01/2026")).unwrap_err();
        assert!(err.to_string().contains("end_date must be YYYY-MM-DD"));
    }
}
