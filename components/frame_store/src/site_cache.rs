//! Per-read-site caching of lookup results.
//!
//! Provides mono/poly/megamorphic caching states keyed by the frame
//! descriptor a read starts from. A site usually only ever sees one
//! descriptor; call sites reached from several functions transition to a
//! small polymorphic table and finally give up.

use arrayvec::ArrayVec;

use core_types::FrameDescriptorId;

use crate::monitor::LookupResult;

/// A cached entry: the monitor's answer for one start descriptor.
/// `None` records that the lookup was not cacheable there.
pub type SiteEntry = Option<LookupResult>;

/// Read-site cache for identifier lookups.
///
/// Transitions through states as more start descriptors are encountered.
#[derive(Debug, Clone)]
pub enum LookupSiteCache {
    /// No descriptor seen yet.
    Uninitialized,
    /// Single descriptor seen (most common case).
    Monomorphic {
        /// The cached start descriptor.
        descriptor: FrameDescriptorId,
        /// The monitor's answer for it.
        entry: SiteEntry,
    },
    /// Several descriptors seen (up to 4).
    Polymorphic {
        /// (descriptor, answer) pairs.
        entries: ArrayVec<(FrameDescriptorId, SiteEntry), 4>,
    },
    /// Too many descriptors; always ask the monitor.
    Megamorphic,
}

impl LookupSiteCache {
    /// Create a new uninitialized cache.
    pub fn new() -> Self {
        LookupSiteCache::Uninitialized
    }

    /// Look up the cached entry for a start descriptor.
    ///
    /// Returns `Some` if the descriptor is cached, `None` otherwise.
    /// Callers must still validate a cached `LookupResult` before use.
    pub fn lookup(&self, descriptor: FrameDescriptorId) -> Option<SiteEntry> {
        match self {
            LookupSiteCache::Uninitialized => None,
            LookupSiteCache::Monomorphic {
                descriptor: cached,
                entry,
            } => {
                if *cached == descriptor {
                    Some(entry.clone())
                } else {
                    None
                }
            }
            LookupSiteCache::Polymorphic { entries } => entries
                .iter()
                .find(|(d, _)| *d == descriptor)
                .map(|(_, entry)| entry.clone()),
            LookupSiteCache::Megamorphic => None,
        }
    }

    /// Update the cache with a fresh answer for a descriptor.
    ///
    /// Transitions cache state as needed:
    /// - Uninitialized → Monomorphic
    /// - Monomorphic → Polymorphic (if different descriptor)
    /// - Polymorphic → Megamorphic (if > 4 descriptors)
    pub fn update(&mut self, descriptor: FrameDescriptorId, entry: SiteEntry) {
        match self {
            LookupSiteCache::Uninitialized => {
                *self = LookupSiteCache::Monomorphic { descriptor, entry };
            }
            LookupSiteCache::Monomorphic {
                descriptor: cached,
                entry: cached_entry,
            } => {
                if *cached == descriptor {
                    *cached_entry = entry;
                } else {
                    let mut entries = ArrayVec::new();
                    entries.push((*cached, cached_entry.clone()));
                    entries.push((descriptor, entry));
                    *self = LookupSiteCache::Polymorphic { entries };
                }
            }
            LookupSiteCache::Polymorphic { entries } => {
                if let Some(existing) = entries.iter_mut().find(|(d, _)| *d == descriptor) {
                    existing.1 = entry;
                } else if entries.len() < 4 {
                    entries.push((descriptor, entry));
                } else {
                    *self = LookupSiteCache::Megamorphic;
                }
            }
            LookupSiteCache::Megamorphic => {}
        }
    }
}

impl Default for LookupSiteCache {
    fn default() -> Self {
        Self::new()
    }
}
