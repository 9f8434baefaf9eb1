//! Parsing of bulk and refresh responses.

use serde_json::Value;

use crate::errors::SearchError;
use index_sync_shared::{BulkSummary, RefreshSummary};

/// Reduce a `_bulk` response body to one aggregate outcome.
///
/// When the engine reports `"errors": true`, the failed items are counted and
/// the first error reason is kept for the message.
pub(crate) fn parse_bulk_response(body: &Value, total: usize) -> Result<BulkSummary, SearchError> {
    let took_ms = body.get("took").and_then(Value::as_u64).unwrap_or(0);
    let has_errors = body.get("errors").and_then(Value::as_bool).unwrap_or(false);

    if !has_errors {
        return Ok(BulkSummary { total, took_ms });
    }

    let failed: Vec<&Value> = body
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object()?.values().next())
                .filter_map(|result| result.get("error"))
                .collect()
        })
        .unwrap_or_default();

    let reason = failed
        .first()
        .map(|error| {
            error
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string())
        })
        .unwrap_or_else(|| "unknown item failure".to_string());

    Err(SearchError::bulk_index(format!(
        "{} of {} operations failed: {}",
        failed.len(),
        total,
        reason
    )))
}

/// Extract shard counts from a refresh response body.
pub(crate) fn parse_refresh_response(body: &Value) -> Result<RefreshSummary, SearchError> {
    let shards = body
        .get("_shards")
        .ok_or_else(|| SearchError::parse("refresh response has no _shards section"))?;

    let count = |field: &str| shards.get(field).and_then(Value::as_u64).unwrap_or(0);

    Ok(RefreshSummary {
        total: count("total"),
        successful: count("successful"),
        failed: count("failed"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bulk_success() {
        let body = json!({ "took": 30, "errors": false, "items": [] });

        let summary = parse_bulk_response(&body, 2).unwrap();

        assert_eq!(summary, BulkSummary { total: 2, took_ms: 30 });
    }

    #[test]
    fn test_parse_bulk_item_failures() {
        let body = json!({
            "took": 12,
            "errors": true,
            "items": [
                { "index": { "_id": "1", "status": 201 } },
                { "index": { "_id": "2", "status": 400, "error": {
                    "type": "mapper_parsing_exception",
                    "reason": "failed to parse field [age]"
                } } }
            ]
        });

        let err = parse_bulk_response(&body, 2).unwrap_err();

        match err {
            SearchError::BulkIndexError(msg) => {
                assert!(msg.starts_with("1 of 2 operations failed"));
                assert!(msg.contains("failed to parse field [age]"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_refresh() {
        let body = json!({ "_shards": { "total": 2, "successful": 1, "failed": 0 } });

        let summary = parse_refresh_response(&body).unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn test_parse_refresh_missing_shards() {
        assert!(matches!(
            parse_refresh_response(&json!({})),
            Err(SearchError::ParseError(_))
        ));
    }
}
