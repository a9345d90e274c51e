use core::fmt::{self, Display, Formatter};
use std::borrow::Cow;

use mailgate_common::status::Status;

/// A single-line SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub text: Cow<'static, str>,
}

impl Reply {
    pub const fn new(status: Status, text: &'static str) -> Self {
        Self {
            status,
            text: Cow::Borrowed(text),
        }
    }

    pub const fn greeting() -> Self {
        Self::new(Status::ServiceReady, "Welcome to the SMTP Relay Server")
    }

    pub const fn hello() -> Self {
        Self::new(Status::Ok, "Hello")
    }

    pub const fn ok() -> Self {
        Self::new(Status::Ok, "OK")
    }

    pub const fn bye() -> Self {
        Self::new(Status::GoodBye, "Bye")
    }

    pub const fn ready_for_tls() -> Self {
        Self::new(Status::ServiceReady, "Ready to start TLS")
    }

    pub const fn must_starttls() -> Self {
        Self::new(Status::SyntaxError, "Must issue STARTTLS first")
    }

    pub const fn unrecognized() -> Self {
        Self::new(Status::SyntaxError, "Unrecognized command")
    }

    pub const fn start_mail_input() -> Self {
        Self::new(
            Status::StartMailInput,
            "Start mail input; end with <CRLF>.<CRLF>",
        )
    }

    pub const fn recipient_blocked() -> Self {
        Self::new(Status::Error, "Recipient blocked")
    }

    pub const fn connection_blocked() -> Self {
        Self::new(Status::Error, "Connection blocked")
    }

    pub const fn service_unavailable() -> Self {
        Self::new(Status::Unavailable, "Service not available")
    }

    pub const fn rate_limited() -> Self {
        Self::new(Status::Unavailable, "Rate limit exceeded")
    }
}

impl Display for Reply {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {}", self.status, self.text)
    }
}
