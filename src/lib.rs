//! Quota-aware client for the Yalidine and Guepex delivery APIs.
//!
//! A [`Session`] validates its configuration, owns a [`RequestEngine`] that
//! retries transient transport failures with capped exponential backoff and
//! tracks the per-window request quota reported by the service, and a
//! [`CacheStore`] warmed with reference data on [`Session::init`].

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod quota;
pub mod session;
pub mod types;

pub use cache::{cache_key, CacheStore, CacheStoreExt, FileCacheStore, MemoryCacheStore};
pub use config::{Agent, Config, HeaderNames, SessionOptions};
pub use error::{CacheError, ConfigError, Error, Result};
pub use http::{ApiResponse, RequestContext, RequestEngine};
pub use quota::QuotaTracker;
pub use session::Session;
pub use types::{QuotaStatus, QuotaWindow};
