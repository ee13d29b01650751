//! Node Connectors - HTTP Bridges to Currency Nodes
//!
//! One `HttpConnector` per configured currency. Each speaks a small
//! JSON protocol to a node bridge and maps transport failures onto the
//! transient/hard split of `ConnectorError`.

pub mod http;

pub use http::HttpConnector;
