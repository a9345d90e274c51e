pub mod client;
pub mod command;
pub mod connection;
pub mod error;
pub mod listener;
pub mod policy;
pub mod rate_limiter;
pub mod server;
pub mod session;
pub mod tls;

pub use policy::PolicyFilter;
pub use rate_limiter::RateLimiter;
pub use server::{Server, ServerStatus};
pub use session::{Session, SessionConfig};
pub use tls::TlsMaterial;
