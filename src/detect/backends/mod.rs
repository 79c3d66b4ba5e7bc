pub mod http;
pub mod stub;

pub use http::{HttpBackend, HttpBackendConfig};
pub use stub::StubBackend;
