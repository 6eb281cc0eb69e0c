//! Hostname synthesis and classification
//!
//! `allocator` derives deterministic hostnames and validates custom-domain
//! format/reservation/DNS; `classifier` decides whether a hostname is public
//! (shared gateway) or custom (dedicated gateway) and builds the minimal
//! Gateway/VirtualService configs from that split.

mod allocator;
mod classifier;

pub use allocator::{DnsResolver, DomainAllocator, HashSource, Sha256HashSource, TokioDnsResolver};
pub use classifier::DomainClassifier;
