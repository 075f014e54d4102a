//! geocorr Store - Fingerprint-keyed cache for pipeline stages
//!
//! This crate defines the cache tier port and provides an in-memory tier,
//! a persistent disk tier and the [`CacheService`] that layers them.

pub mod disk;
pub mod fingerprint;
pub mod memory;
pub mod ports;
pub mod service;

pub use disk::DiskTier;
pub use fingerprint::{CacheKey, Fingerprint};
pub use memory::MemoryTier;
pub use ports::{CacheEntry, CacheTier};
pub use service::{CacheReport, CacheService, Computed};
