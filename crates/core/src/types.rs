/// Identifier of one requester-conversation. Matches the chat id handed to
/// us by the conversational layer.
pub type SessionKey = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
