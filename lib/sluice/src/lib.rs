//! Lazy, composable, streaming byte pipelines. A bucket is a polymorphic
//! source of bytes read incrementally by a non-blocking loop; reads return
//! partial results and `Wait`-style statuses instead of suspending the
//! thread. On top of the structural buckets sit an HTTP/1.x response
//! parser and a TLS bucket pair bridging an external TLS engine.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod bucket;
pub mod buffer;
pub mod http;
pub mod status;
pub mod tls;
