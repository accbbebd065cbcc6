use chrono::{DateTime, TimeZone, Utc};

/// 当前毫秒时间戳
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}

/// `yyyy-MM-dd`，执行日志按天分目录
pub fn date_dir_name(millis: i64) -> String {
    millis_to_datetime(millis).format("%Y-%m-%d").to_string()
}
