use uuid::Uuid;

/// Last 8 hex chars of a v4 uuid: the id format for transmissions and
/// sessions, short enough to ride in a DNS label
pub(crate) fn short_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[hex.len() - 8..].to_string()
}
