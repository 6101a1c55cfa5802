use serde::{Deserialize, Serialize};

/// Opaque message handle assigned by Gmail
pub type MessageId = String;

/// Raw `From` header value, used as the aggregation key
pub type SenderKey = String;

/// Headers requested with every metadata fetch
pub const METADATA_HEADERS: &[&str] = &[
    "From",
    "Subject",
    "List-Unsubscribe",
    "List-ID",
    "Precedence",
];

/// System label every scanned message starts in by default
pub const INBOX_LABEL: &str = "INBOX";

/// System label messages are moved to on deletion
pub const TRASH_LABEL: &str = "TRASH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Metadata of one message as returned by a `format=metadata` fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: MessageId,
    pub headers: Vec<Header>,
    pub snippet: String,
}

/// One page of a message listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<MessageId>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderStats {
    pub email: String,
    pub domain: String,
    pub count: usize,
}

/// Flattened sender statistics, the unit of display and CSV export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderRow {
    pub sender: SenderKey,
    pub email: String,
    pub domain: String,
    pub count: usize,
}

/// Progress of the running (or last) deletion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteProgress {
    pub in_progress: bool,
    pub done: usize,
    pub total: usize,
}
