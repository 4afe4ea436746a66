//! Wire-level pieces of the provider protocols: request construction, SSE
//! decoding, delta extraction and model catalog parsing.

pub mod catalog;
pub mod decoder;
pub mod extract;
pub mod request;
pub mod scan;

pub use decoder::{DecodeEvent, StreamDecoder};
pub use request::{HttpRequest, Method, RequestBuilder};
