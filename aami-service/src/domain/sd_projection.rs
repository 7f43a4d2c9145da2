//! Service-discovery projection (§4.7): turns `(target, enabled exporter)` pairs into
//! Prometheus-compatible SD entries, with optional filters and a file-SD variant.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::GroupId;
use crate::repository::Repository;

use super::model::{ExporterType, Target, TargetStatus};
use super::repositories::{ExporterRepository, GroupRepository, TargetRepository};
use super::rule_file_manager::atomic_write;

/// One `(target, exporter)` pairing's SD entry (§4.7 Shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdEntry {
    pub targets: Vec<String>,
    pub labels: super::model::StringMap,
}

/// Optional narrowing applied before projection (§4.7 Filters).
#[derive(Debug, Clone, Default)]
pub struct SdFilter {
    pub status: Option<TargetStatus>,
    pub exporter_type: Option<ExporterType>,
    pub group_id: Option<GroupId>,
    pub labels: super::model::StringMap,
    pub enabled_only: bool,
}

/// File format for the file-SD variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdFileFormat {
    Json,
    Yaml,
}

/// Stateless service turning the fleet's targets/exporters into SD entries (§4.7).
#[derive(Debug, Default, Clone, Copy)]
pub struct SdProjection;

impl SdProjection {
    pub fn new() -> Self {
        Self
    }

    /// `GetSdEntries` (§4.7): one entry per enabled exporter on a target matching `filter`.
    pub async fn project<S>(&self, store: &S, filter: &SdFilter) -> Result<Vec<SdEntry>>
    where
        S: TargetRepository + ExporterRepository + GroupRepository,
    {
        let targets = match &filter.group_id {
            Some(group_id) => store.get_by_group_id(group_id).await?,
            None => store.find_all(&[], None, None).await?,
        };

        let mut entries = Vec::new();
        for target in &targets {
            if let Some(status) = filter.status {
                if target.status != status {
                    continue;
                }
            }
            if !filter.labels.is_empty()
                && !filter
                    .labels
                    .iter()
                    .all(|(k, v)| target.labels.get(k).is_some_and(|tv| tv == v))
            {
                continue;
            }

            let groups = store.groups_for_target(&target.id).await?;
            let mut group_records = Vec::with_capacity(groups.len());
            for group_id in &groups {
                if let Some(group) = store.find_by_id(group_id).await? {
                    group_records.push(group);
                }
            }

            let exporters = store.get_by_target_id(&target.id).await?;
            for exporter in exporters {
                if filter.enabled_only && !exporter.enabled {
                    continue;
                }
                if let Some(exporter_type) = filter.exporter_type {
                    if exporter.exporter_type != exporter_type {
                        continue;
                    }
                }

                entries.push(build_entry(target, &exporter, &group_records));
            }
        }

        Ok(entries)
    }

    /// File-SD variant (§4.7): writes the projected entries to `path` through the same
    /// atomic temp-file-plus-rename primitive the rule-file manager uses, so readers
    /// never observe a half-written feed.
    pub async fn write_file_sd<S>(
        &self,
        store: &S,
        filter: &SdFilter,
        path: &Path,
        format: SdFileFormat,
    ) -> Result<()>
    where
        S: TargetRepository + ExporterRepository + GroupRepository,
    {
        let entries = self.project(store, filter).await?;
        let bytes = match format {
            SdFileFormat::Json => serde_json::to_vec_pretty(&entries)
                .map_err(|e| crate::error::Error::ConfigInvalid(e.to_string()))?,
            SdFileFormat::Yaml => serde_yaml::to_string(&entries)?.into_bytes(),
        };
        atomic_write(path, &bytes).await
    }
}

fn build_entry(target: &Target, exporter: &super::model::Exporter, groups: &[super::model::Group]) -> SdEntry {
    let mut labels = super::model::StringMap::new();
    labels.insert("job".to_string(), format!("{:?}", exporter.exporter_type).to_lowercase());
    labels.insert("instance".to_string(), target.hostname.clone());
    labels.insert("hostname".to_string(), target.hostname.clone());
    labels.insert("ip_address".to_string(), target.ip_address.clone());
    labels.insert("target_id".to_string(), target.id.as_str().to_string());
    labels.insert(
        "exporter_type".to_string(),
        format!("{:?}", exporter.exporter_type).to_lowercase(),
    );
    labels.insert("exporter_id".to_string(), exporter.id.as_str().to_string());
    labels.insert("metrics_path".to_string(), exporter.metrics_path.clone());
    labels.insert("target_status".to_string(), format!("{:?}", target.status).to_lowercase());

    for (k, v) in &target.labels {
        labels.insert(format!("target_label_{k}"), v.clone());
    }

    for (i, group) in groups.iter().enumerate() {
        labels.insert(format!("group_{i}"), group.name.clone());
        labels.insert(format!("group_{i}_id"), group.id.as_str().to_string());
    }
    if let Some(first) = groups.first() {
        labels.insert("group".to_string(), first.name.clone());
    }

    SdEntry {
        targets: vec![format!("{}:{}", target.ip_address, exporter.port)],
        labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::memory_store::InMemoryStore;
    use crate::domain::model::{CreateExporter, CreateGroup, CreateTarget, DynamicMap, StringMap};
    use crate::repository::Repository;

    async fn seed(store: &InMemoryStore) -> (Target, super::super::model::Exporter) {
        let group = store
            .create(CreateGroup {
                name: "gpu-nodes".into(),
                description: None,
                priority: None,
                is_default_own: false,
                parent_id: None,
                metadata: StringMap::new(),
            })
            .await
            .unwrap();

        let mut labels = StringMap::new();
        labels.insert("rack".to_string(), "a1".to_string());

        let target = store
            .create(CreateTarget {
                hostname: "gpu-01".into(),
                ip_address: "10.0.0.5".into(),
                status: Some(TargetStatus::Active),
                labels,
                metadata: DynamicMap::new(),
            })
            .await
            .unwrap();
        store.link_group(&target.id, &group.id, false).await.unwrap();

        let exporter = store
            .create(CreateExporter {
                target_id: target.id.clone(),
                exporter_type: ExporterType::DcgmExporter,
                port: 9400,
                enabled: true,
                metrics_path: None,
                scrape_interval_secs: None,
                scrape_timeout_secs: None,
                config: DynamicMap::new(),
            })
            .await
            .unwrap();

        (target, exporter)
    }

    #[tokio::test]
    async fn test_project_produces_one_entry_per_enabled_exporter() {
        let store = InMemoryStore::new();
        let (target, exporter) = seed(&store).await;

        let entries = SdProjection::new().project(&store, &SdFilter::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].targets, vec![format!("{}:{}", target.ip_address, exporter.port)]);
        assert_eq!(entries[0].labels.get("hostname"), Some(&target.hostname));
        assert_eq!(entries[0].labels.get("exporter_type"), Some(&"dcgm_exporter".to_string()));
        assert_eq!(entries[0].labels.get("target_label_rack"), Some(&"a1".to_string()));
        assert_eq!(entries[0].labels.get("group_0"), Some(&"gpu-nodes".to_string()));
        assert_eq!(entries[0].labels.get("group"), Some(&"gpu-nodes".to_string()));
    }

    #[tokio::test]
    async fn test_enabled_only_filter_excludes_disabled_exporters() {
        let store = InMemoryStore::new();
        let (target, _exporter) = seed(&store).await;

        store
            .create(CreateExporter {
                target_id: target.id.clone(),
                exporter_type: ExporterType::NodeExporter,
                port: 9100,
                enabled: false,
                metrics_path: None,
                scrape_interval_secs: None,
                scrape_timeout_secs: None,
                config: DynamicMap::new(),
            })
            .await
            .unwrap();

        let filter = SdFilter {
            enabled_only: true,
            ..Default::default()
        };
        let entries = SdProjection::new().project(&store, &filter).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].labels.get("exporter_type"), Some(&"dcgm_exporter".to_string()));
    }

    #[tokio::test]
    async fn test_exporter_type_filter() {
        let store = InMemoryStore::new();
        seed(&store).await;

        let filter = SdFilter {
            exporter_type: Some(ExporterType::NodeExporter),
            ..Default::default()
        };
        let entries = SdProjection::new().project(&store, &filter).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_write_file_sd_round_trips_json() {
        let store = InMemoryStore::new();
        seed(&store).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sd.json");
        SdProjection::new()
            .write_file_sd(&store, &SdFilter::default(), &path, SdFileFormat::Json)
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let entries: Vec<SdEntry> = serde_json::from_str(&contents).unwrap();
        assert_eq!(entries.len(), 1);
    }
}
