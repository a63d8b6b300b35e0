// pollcast-api: clients for the adapter's two external collaborators,
// the PostgREST counter store and the streaming broker.

pub mod broker;
pub mod error;
pub mod store;
pub mod transport;

pub use error::Error;
pub use store::{CounterRow, StoreClient};
pub use transport::{TlsMode, TransportConfig};
