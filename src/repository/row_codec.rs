// ==========================================
// 出入库批量指令 - 行字段编解码
// ==========================================
// 约定:
// - 数量: Decimal 以 TEXT 存储，保持精度
// - 时间: UTC，RFC3339 固定微秒精度，可按字符串排序比较
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(field: &str, raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::FieldValueError {
            field: field.to_string(),
            message: format!("无效时间 '{}': {}", raw, e),
        })
}

pub(crate) fn parse_decimal(field: &str, raw: &str) -> RepositoryResult<Decimal> {
    Decimal::from_str(raw.trim()).map_err(|e| RepositoryError::FieldValueError {
        field: field.to_string(),
        message: format!("无效数量 '{}': {}", raw, e),
    })
}

pub(crate) fn parse_opt_decimal(field: &str, raw: Option<String>) -> RepositoryResult<Option<Decimal>> {
    raw.map(|s| parse_decimal(field, &s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_text_orders_like_time() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::milliseconds(500);
        assert!(fmt_ts(&a) < fmt_ts(&b));
        assert_eq!(parse_ts("t", &fmt_ts(&b)).unwrap(), b);
    }

    #[test]
    fn test_decimal_round_trip_keeps_scale() {
        let d = parse_decimal("on_hand", "12.50").unwrap();
        assert_eq!(d.to_string(), "12.50");
        assert!(parse_decimal("on_hand", "abc").is_err());
    }
}
