//! Asynchronous metadata resolution.
//!
//! - [`Resolver`] - pluggable catalog lookup that may decline a request
//! - [`Fetcher`] - bounded queue drained by a fixed worker pool running the
//!   resolver chain, with per-instance cancellation

mod fetcher;
mod resolver;

pub use fetcher::{FetchCallback, FetchError, Fetcher};
pub use resolver::{CACHE_RESOLVER, CacheResolver, Resolver};
