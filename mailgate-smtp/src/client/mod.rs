//! Minimal SMTP client used for onward delivery and by the test suites.
//!
//! Speaks plain SMTP with optional STARTTLS and reads multi-line replies.

mod error;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::{SmtpClient, dot_stuff};
