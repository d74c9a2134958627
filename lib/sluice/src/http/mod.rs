//! HTTP/1.x response parsing over the bucket pipeline.

pub mod chunked;
pub mod response;
