//! Application directory collaborator.
//! The engine only sees the [`AppDirectory`] trait; [`CloudControllerDirectory`]
//! implements it against the Cloud Controller v2 API.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::aggregate::MAX_INSTANCES;
use crate::cc_http::CcHttp;
use crate::types::{AppDetail, AppInfo, Instance, Named};

const PAGE_SIZE: usize = 100;
const STARTED: &str = "STARTED";

/// Authoritative source of application identity and topology.
///
/// Implementations own their retry policy; the engine calls each method once
/// and treats an error as "unknown for now".
#[async_trait]
pub trait AppDirectory: Send + Sync {
    /// Look up one application by GUID. `Ok(None)` when the directory has no such app.
    async fn app_by_guid(&self, guid: &str) -> Result<Option<AppInfo>>;

    /// Every application currently deployed on the platform.
    async fn list_apps(&self) -> Result<Vec<AppInfo>>;

    /// Fill organization, space and instance topology into an application stub
    /// carrying at least its GUID.
    async fn annotate(&self, app: AppDetail) -> Result<AppDetail>;
}

#[derive(Clone)]
pub struct CloudControllerDirectory {
    http: CcHttp,
}

impl CloudControllerDirectory {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: CcHttp::new(api_url, token, timeout)?,
        })
    }

    async fn fetch_app(&self, guid: &str) -> Result<Option<AppResource>> {
        let path = format!("/v2/apps/{guid}?inline-relations-depth=2");
        self.http.get_json_opt(&path, "cc get app").await
    }

    async fn fetch_stats(&self, guid: &str) -> Result<BTreeMap<String, InstanceStats>> {
        let path = format!("/v2/apps/{guid}/stats");
        self.http.get_json(&path, "cc get app stats").await
    }
}

#[async_trait]
impl AppDirectory for CloudControllerDirectory {
    async fn app_by_guid(&self, guid: &str) -> Result<Option<AppInfo>> {
        Ok(self.fetch_app(guid).await?.map(|r| r.app_info()))
    }

    async fn list_apps(&self) -> Result<Vec<AppInfo>> {
        let mut apps = Vec::new();
        let mut next = Some(format!(
            "/v2/apps?inline-relations-depth=2&results-per-page={PAGE_SIZE}"
        ));
        while let Some(path) = next {
            let page: AppPage = self.http.get_json(&path, "cc list apps").await?;
            debug!(
                "directory: fetched {} apps (total {})",
                page.resources.len(),
                page.total_results
            );
            apps.extend(page.resources.iter().map(AppResource::app_info));
            next = page.next_url;
        }
        Ok(apps)
    }

    async fn annotate(&self, app: AppDetail) -> Result<AppDetail> {
        let resource = self
            .fetch_app(&app.guid)
            .await?
            .with_context(|| format!("app {} not found in directory", app.guid))?;
        let stats = if resource.entity.state == STARTED {
            self.fetch_stats(&app.guid).await?
        } else {
            BTreeMap::new()
        };
        Ok(annotate_from(app, &resource, &stats))
    }
}

/// Fill a stub from a directory app resource and its per-instance stats.
pub fn annotate_from(
    mut app: AppDetail,
    resource: &AppResource,
    stats: &BTreeMap<String, InstanceStats>,
) -> AppDetail {
    let info = resource.app_info();
    app.guid = info.guid;
    app.name = info.name;
    app.space = Named {
        id: info.space_guid,
        name: info.space_name,
    };
    app.organization = Named {
        id: info.org_guid,
        name: info.org_name,
    };
    app.state = resource.entity.state.clone();
    app.buildpack = resource
        .entity
        .buildpack
        .clone()
        .or_else(|| resource.entity.detected_buildpack.clone())
        .unwrap_or_default();
    app.desired_instances = resource.entity.instances;
    app.instances = instances_from_stats(stats);
    app
}

/// Instances ordered so that position equals instance index; unreported
/// indexes in between are left zero-valued. Keys that are not an index below
/// [`MAX_INSTANCES`] are skipped.
pub fn instances_from_stats(stats: &BTreeMap<String, InstanceStats>) -> Vec<Instance> {
    let parsed: Vec<(u32, &InstanceStats)> = stats
        .iter()
        .filter_map(|(k, v)| match k.parse::<u32>() {
            Ok(i) if (i as usize) < MAX_INSTANCES => Some((i, v)),
            _ => {
                debug!("directory: skipping stats for instance key {k:?}");
                None
            }
        })
        .collect();
    let len = parsed.iter().map(|(i, _)| *i as usize + 1).max().unwrap_or(0);
    let mut instances: Vec<Instance> = (0..len as u32)
        .map(|index| Instance {
            index,
            ..Instance::default()
        })
        .collect();
    for (index, s) in parsed {
        let slot = &mut instances[index as usize];
        slot.state = s.state.clone();
        if let Some(detail) = &s.stats {
            slot.uptime = detail.uptime;
            if let Some(usage) = &detail.usage {
                slot.cpu_usage = usage.cpu * 100.0;
                slot.memory_usage = usage.mem;
                slot.disk_usage = usage.disk;
            }
        }
    }
    instances
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppPage {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub next_url: Option<String>,
    #[serde(default)]
    pub resources: Vec<AppResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub guid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppResource {
    pub metadata: Metadata,
    pub entity: AppEntity,
}

impl AppResource {
    pub fn app_info(&self) -> AppInfo {
        let space = self.entity.space.as_ref();
        let org = space.and_then(|s| s.entity.organization.as_ref());
        AppInfo {
            guid: self.metadata.guid.clone(),
            name: self.entity.name.clone(),
            space_guid: self.entity.space_guid.clone(),
            space_name: space.map(|s| s.entity.name.clone()).unwrap_or_default(),
            org_guid: space
                .map(|s| s.entity.organization_guid.clone())
                .unwrap_or_default(),
            org_name: org.map(|o| o.entity.name.clone()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppEntity {
    pub name: String,
    #[serde(default)]
    pub space_guid: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub instances: u32,
    #[serde(default)]
    pub buildpack: Option<String>,
    #[serde(default)]
    pub detected_buildpack: Option<String>,
    #[serde(default)]
    pub space: Option<SpaceResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpaceResource {
    pub entity: SpaceEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpaceEntity {
    pub name: String,
    #[serde(default)]
    pub organization_guid: String,
    #[serde(default)]
    pub organization: Option<OrgResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrgResource {
    pub entity: OrgEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrgEntity {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceStats {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub stats: Option<StatsDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsDetail {
    #[serde(default)]
    pub uptime: u64,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub mem: u64,
    #[serde(default)]
    pub disk: u64,
}
