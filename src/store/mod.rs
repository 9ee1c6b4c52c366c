//! Persistence seams for the daemon services: an object store for
//! per-resource config documents and a revisioned key-value store for
//! cross-resource indexes and account settings.

pub mod blob;
pub mod kv;
