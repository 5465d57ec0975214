pub mod common;
pub mod dispatch;
pub mod emitter;
pub mod rotation;
pub mod transport;

pub use common::messages::{CheckStatus, Location, LocationResult, Verdict};
pub use dispatch::{Dispatcher, Strategy};
pub use transport::{TlsTransport, Transport, TransportError};
