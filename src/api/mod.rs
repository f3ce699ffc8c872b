//! HTTP API Module
//!
//! Access-key REST API over the peer registry.

mod http;

pub use http::{AccessKey, AccessKeyList, AppState, CreateAccessKeyRequest, ErrorResponse, HttpServer};
