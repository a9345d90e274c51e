use serde::{Deserialize, Serialize};

/// Subject recorded when a message carries no `Subject:` header.
pub const NO_SUBJECT: &str = "(No Subject)";

/// A message captured by a session and handed to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub data: Vec<u8>,
}

impl Message {
    /// Build a message from the captured envelope and body, extracting the
    /// subject from the body.
    pub fn new(from: impl Into<String>, to: impl Into<String>, data: Vec<u8>) -> Self {
        let subject = extract_subject(&String::from_utf8_lossy(&data));

        Self {
            from: from.into(),
            to: to.into(),
            subject,
            data,
        }
    }
}

/// Find the first CRLF-separated line starting (case-insensitively) with
/// `Subject:` and return the trimmed remainder.
pub fn extract_subject(body: &str) -> String {
    const PREFIX: &str = "subject:";

    body.split("\r\n")
        .find(|line| {
            line.get(..PREFIX.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(PREFIX))
        })
        .map_or_else(
            || NO_SUBJECT.to_string(),
            |line| line[PREFIX.len()..].trim().to_string(),
        )
}
