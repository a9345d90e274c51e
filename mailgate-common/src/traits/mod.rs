pub mod relay;

pub use self::relay::Relay;
