//! Identity enrichment.
//! Maps application GUIDs to org/space/app identity through a local cache,
//! falling back to one directory lookup per miss.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::directory::AppDirectory;
use crate::types::{AppInfo, Event, Identity};

pub struct IdentityResolver {
    cache: DashMap<String, AppInfo>,
    directory: Arc<dyn AppDirectory>,
}

impl IdentityResolver {
    pub fn new(directory: Arc<dyn AppDirectory>) -> Self {
        Self {
            cache: DashMap::new(),
            directory,
        }
    }

    pub fn directory(&self) -> &Arc<dyn AppDirectory> {
        &self.directory
    }

    /// Resolve a GUID. Never fails: fields the directory could not supply are
    /// left empty and the caller proceeds with a partial identity.
    pub async fn resolve(&self, guid: &str) -> Identity {
        if guid.is_empty() {
            return Identity::default();
        }
        if let Some(identity) = self.cached(guid) {
            return identity;
        }

        // No cache entry is held across this await.
        match self.directory.app_by_guid(guid).await {
            Ok(Some(info)) => self.prime(info),
            Ok(None) => debug!("identity: app {} unknown to directory", guid),
            Err(err) => warn!("identity: directory lookup for {} failed: {err:?}", guid),
        }

        self.cache
            .get(guid)
            .map(|info| info.identity())
            .unwrap_or_default()
    }

    /// Fill the event's identity from its GUID, keeping any field already set
    /// when the resolved value is empty.
    pub async fn annotate(&self, event: &mut Event) {
        let resolved = self.resolve(&event.app_id).await;
        let current = &mut event.identity;
        fill(&mut current.app_name, resolved.app_name);
        fill(&mut current.org_name, resolved.org_name);
        fill(&mut current.org_id, resolved.org_id);
        fill(&mut current.space_name, resolved.space_name);
        fill(&mut current.space_id, resolved.space_id);
    }

    /// Insert or refresh a cache entry.
    pub fn prime(&self, info: AppInfo) {
        if info.guid.is_empty() {
            return;
        }
        self.cache.insert(info.guid.clone(), info);
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn cached(&self, guid: &str) -> Option<Identity> {
        self.cache
            .get(guid)
            .filter(|info| !info.name.is_empty())
            .map(|info| info.identity())
    }
}

fn fill(slot: &mut String, value: String) {
    if !value.is_empty() {
        *slot = value;
    }
}
