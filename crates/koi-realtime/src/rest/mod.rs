//! REST collaborator seam: send fallback and presence bootstrap.

pub mod api;
pub mod http;

pub use api::RestApi;
pub use http::HttpRestApi;
