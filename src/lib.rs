//! Caching layer for a FUSE gateway that projects an object-storage bucket
//! as a POSIX tree.
//!
//! Repeated `getattr`/`read` calls against a slow remote store are made
//! cheap by two caches: [`cache::stat_cache::MetadataCache`] holds attribute
//! snapshots with TTL and pin counts (swept in the background by
//! [`cache::sweeper::CacheSweeper`]), and
//! [`cache::directory::FileCacheDirectory`] hands out per-path
//! [`cache::fcache::FileByteRangeCache`]s that turn random-offset reads into
//! bounded range fetches over pages from a shared
//! [`cache::page::PagePool`]. [`gateway::Gateway`] ties the pieces together
//! for the filesystem dispatch layer.

pub mod attr;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod remote;
