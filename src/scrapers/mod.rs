pub mod coordinator;
pub mod discovery;
pub mod http;
pub mod pattern;
pub mod session;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod fake;

pub use coordinator::{CompletedStreet, ScrapeCoordinator};
pub use discovery::AddressDiscoverer;
pub use http::ReqwestTransport;
pub use session::RentQuerySession;
pub use traits::Transport;
