//! Shared infrastructure for the end-to-end suites.

pub mod harness;
pub mod mock_server;

pub use harness::Harness;
pub use mock_server::{MockSmtpServer, SmtpCommand};
