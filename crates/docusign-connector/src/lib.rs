pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;
pub mod host;
pub mod http_client;
pub mod normalize;
pub mod orchestrator;
pub mod row;
pub mod schema;
pub mod state;

pub use auth::AuthContext;
pub use config::ConnectorConfig;
pub use error::ConnectorError;
pub use host::{HostLogger, HostSink, TracingLogger};
pub use http_client::HttpClient;
pub use orchestrator::Orchestrator;
pub use row::Row;
pub use schema::{TableSchema, schema};
pub use state::SyncState;
