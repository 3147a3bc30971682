mod backoff;
mod error;
#[cfg(test)]
mod fake_broker;
mod options;
mod publisher;
mod session;
mod subscriber;

pub use backoff::*;
pub use error::*;
pub use options::*;
pub use publisher::*;
pub use session::*;
pub use subscriber::*;
