//! Shared query-string types: pagination, date ranges, order filters.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use crate::domain::order::OrderStatus;
use crate::error::{ApiError, ApiResult};
use crate::services::orders::OrderFilter;
use crate::services::Page;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    /// Tenant to act for; admins only, everyone else is pinned.
    pub tenant_id: Option<uuid::Uuid>,
    /// Customer filter for the tenant-side customer-orders view.
    pub customer_id: Option<uuid::Uuid>,
}

impl ListQuery {
    pub fn pagination(&self) -> Page {
        Page::new(self.page, self.page_size)
    }

    pub fn order_filter(&self) -> ApiResult<OrderFilter> {
        let (start, end) = parse_date_range(self.start_date.as_deref(), self.end_date.as_deref())?;
        Ok(OrderFilter {
            status: self.status.as_deref().map(parse_order_status).transpose()?,
            start,
            end,
            search: non_empty(&self.search),
            user_email: non_empty(&self.user_email),
            user_name: non_empty(&self.user_name),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub fn parse_order_status(raw: &str) -> ApiResult<OrderStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" => Ok(OrderStatus::Pending),
        "processing" => Ok(OrderStatus::Processing),
        "shipped" => Ok(OrderStatus::Shipped),
        "delivered" => Ok(OrderStatus::Delivered),
        "refunded" => Ok(OrderStatus::Refunded),
        other => Err(ApiError::Validation(format!("unknown status: {other}"))),
    }
}

/// Literal `YYYY-MM-DD` bounds. The end date is inclusive: it extends
/// to the last second of that day.
pub fn parse_date_range(
    start: Option<&str>,
    end: Option<&str>,
) -> ApiResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let start = start.map(|s| parse_day(s, "start_date")).transpose()?;
    let end = end.map(|s| parse_day(s, "end_date")).transpose()?;
    Ok((
        start.map(|d| d.and_time(NaiveTime::MIN).and_utc()),
        end.map(|d| d.and_time(NaiveTime::MIN).and_utc() + Duration::seconds(86_399)),
    ))
}

fn parse_day(raw: &str, field: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::Validation(format!("{field} must be YYYY-MM-DD")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_date_is_inclusive() {
        let (start, end) = parse_date_range(Some("2025-03-07"), Some("2025-03-07")).unwrap();
        let start = start.unwrap();
        let end = end.unwrap();
        assert_eq!(start.to_rfc3339(), "2025-03-07T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-03-07T23:59:59+00:00");
        assert!(start <= end);
    }

    #[test]
    fn malformed_date_is_rejected() {
        assert!(parse_date_range(Some("07-03-2025"), None).is_err());
        assert!(parse_date_range(None, Some("2025-13-01")).is_err());
        assert!(parse_date_range(None, None).unwrap().0.is_none());
    }

    #[test]
    fn status_parsing() {
        assert_eq!(parse_order_status("Pending").unwrap(), OrderStatus::Pending);
        assert_eq!(
            parse_order_status("refunded").unwrap(),
            OrderStatus::Refunded
        );
        assert!(parse_order_status("confirmed").is_err());
    }

    #[test]
    fn blank_search_is_dropped() {
        let q = ListQuery {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert!(q.order_filter().unwrap().search.is_none());
    }
}
