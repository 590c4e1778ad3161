//! In-memory directory used across the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use appmetrics::directory::AppDirectory;
use appmetrics::types::{AppDetail, AppInfo, Instance, Named};
use async_trait::async_trait;

#[derive(Default)]
pub struct MockDirectory {
    pub apps: Mutex<HashMap<String, AppInfo>>,
    pub topology: Mutex<HashMap<String, Vec<Instance>>>,
    pub failing_guids: Mutex<HashSet<String>>,
    pub fail_lookups: Mutex<bool>,
    pub fail_roster: Mutex<bool>,
    pub lookups: AtomicUsize,
    pub annotations: AtomicUsize,
}

impl MockDirectory {
    pub fn with_apps(apps: Vec<AppInfo>) -> Self {
        let dir = Self::default();
        for app in apps {
            dir.add(app);
        }
        dir
    }

    pub fn add(&self, app: AppInfo) {
        self.apps.lock().unwrap().insert(app.guid.clone(), app);
    }

    pub fn set_topology(&self, guid: &str, instances: Vec<Instance>) {
        self.topology
            .lock()
            .unwrap()
            .insert(guid.to_string(), instances);
    }

    pub fn fail_annotate_for(&self, guid: &str) {
        self.failing_guids.lock().unwrap().insert(guid.to_string());
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppDirectory for MockDirectory {
    async fn app_by_guid(&self, guid: &str) -> Result<Option<AppInfo>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if *self.fail_lookups.lock().unwrap() {
            anyhow::bail!("directory unavailable");
        }
        Ok(self.apps.lock().unwrap().get(guid).cloned())
    }

    async fn list_apps(&self) -> Result<Vec<AppInfo>> {
        if *self.fail_roster.lock().unwrap() {
            anyhow::bail!("roster unavailable");
        }
        let mut apps: Vec<AppInfo> = self.apps.lock().unwrap().values().cloned().collect();
        apps.sort_by(|a, b| a.guid.cmp(&b.guid));
        Ok(apps)
    }

    async fn annotate(&self, mut app: AppDetail) -> Result<AppDetail> {
        self.annotations.fetch_add(1, Ordering::SeqCst);
        if self.failing_guids.lock().unwrap().contains(&app.guid) {
            anyhow::bail!("annotate failed for {}", app.guid);
        }
        let info = self
            .apps
            .lock()
            .unwrap()
            .get(&app.guid)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown app {}", app.guid))?;
        app.name = info.name.clone();
        app.organization = Named {
            id: info.org_guid.clone(),
            name: info.org_name.clone(),
        };
        app.space = Named {
            id: info.space_guid.clone(),
            name: info.space_name.clone(),
        };
        app.state = "STARTED".to_string();
        app.instances = self
            .topology
            .lock()
            .unwrap()
            .get(&app.guid)
            .cloned()
            .unwrap_or_default();
        app.desired_instances = app.instances.len() as u32;
        Ok(app)
    }
}

pub fn app_info(guid: &str, org: &str, space: &str, name: &str) -> AppInfo {
    AppInfo {
        guid: guid.to_string(),
        name: name.to_string(),
        space_guid: format!("{space}-guid"),
        space_name: space.to_string(),
        org_guid: format!("{org}-guid"),
        org_name: org.to_string(),
    }
}

pub fn instances(n: u32) -> Vec<Instance> {
    (0..n)
        .map(|index| Instance {
            index,
            state: "RUNNING".to_string(),
            ..Instance::default()
        })
        .collect()
}
