//! Locally materialised playable resources
//!
//! A successful preload turns fetched bytes into a resource the slot can open
//! without touching the network. Resources are owned through
//! [`ResourceHandle`]: dropping the handle revokes the resource.

use crate::error::PreloadError;
use crate::types::SongId;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

/// Identifier of a materialised resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(Uuid);

impl ResourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Address of a materialised resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub id: ResourceId,
    /// Platform-openable address (`mem://<uuid>` for the memory store)
    pub locator: String,
}

/// Binds a resource to the song it was fetched for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub resource_id: ResourceId,
    pub song_id: SongId,
}

/// Backing store for preloaded audio
///
/// Shared between the engine (which creates and revokes) and platform slots
/// (which open).
pub trait ResourceStore: Send + Sync {
    /// Register `bytes` and return an address for them
    fn materialize(
        &self,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<ResourceRef, PreloadError>;

    /// Forget a resource. Unknown ids are ignored.
    fn revoke(&self, id: ResourceId);

    /// Bytes of a live resource
    fn open(&self, id: ResourceId) -> Option<Bytes>;
}

/// Owning guard for one materialised resource
pub struct ResourceHandle {
    reference: ResourceRef,
    store: Arc<dyn ResourceStore>,
}

impl ResourceHandle {
    /// Materialise `bytes` in `store`
    pub fn materialize(
        store: Arc<dyn ResourceStore>,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<Self, PreloadError> {
        let reference = store.materialize(bytes, content_type)?;
        debug!(resource = %reference.id, "Materialised preload resource");
        Ok(Self { reference, store })
    }

    pub fn reference(&self) -> &ResourceRef {
        &self.reference
    }

    pub fn id(&self) -> ResourceId {
        self.reference.id
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        debug!(resource = %self.reference.id, "Revoking preload resource");
        self.store.revoke(self.reference.id);
    }
}

#[derive(Debug)]
struct StoredResource {
    bytes: Bytes,
    content_type: Option<String>,
}

/// In-memory [`ResourceStore`]
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    entries: Mutex<HashMap<ResourceId, StoredResource>>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resources not yet revoked
    pub fn live_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Content type recorded for a live resource
    pub fn content_type(&self, id: ResourceId) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .and_then(|entry| entry.content_type.clone())
    }
}

impl ResourceStore for MemoryResourceStore {
    fn materialize(
        &self,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<ResourceRef, PreloadError> {
        let id = ResourceId::new();
        let entry = StoredResource {
            bytes,
            content_type: content_type.map(str::to_string),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry);

        Ok(ResourceRef {
            id,
            locator: format!("mem://{}", id),
        })
    }

    fn revoke(&self, id: ResourceId) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn open(&self, id: ResourceId) -> Option<Bytes> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|entry| entry.bytes.clone())
    }
}
