/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a fresh order identifier (UUID v4, string form).
///
/// Orders are created once and never deleted, so collision resistance is the
/// only requirement; no ordering is encoded in the id.
pub fn order_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
