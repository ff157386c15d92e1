mod error;
mod request;
mod retry;
mod transport;

pub use crate::error::TransportError;
pub use crate::request::ByteStream;
pub use crate::request::Request;
pub use crate::request::Response;
pub use crate::request::StreamResponse;
pub use crate::retry::RetryOn;
pub use crate::retry::RetryPolicy;
pub use crate::retry::backoff;
pub use crate::transport::HttpTransport;
pub use crate::transport::ReqwestTransport;
