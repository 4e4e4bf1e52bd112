// Core modules
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod proto;
pub mod store;
pub mod types;

// Wire protocols
pub mod transport;

// Public exports
pub use client::Client;
pub use config::Config;
pub use dispatcher::{Dispatcher, DispatcherHandle, DispatcherState};
pub use error::{ClientError, StoreError, TransportError};
pub use store::Store;
pub use transport::{Connection, Exchange};
pub use types::{Operation, PendingResponse, Request, Response, ValueHolder, ValueType};
