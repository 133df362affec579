//! Helm chart repository index (`index.yaml`)

use chrono::{DateTime, Utc};
use larets_core::{ChartDependency, ChartMetadata};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{RepoError, Result};

/// Repository index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartIndex {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Chart versions by chart name, newest first
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartEntry>>,

    /// When this index was generated
    #[serde(default = "Utc::now")]
    pub generated: DateTime<Utc>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for ChartIndex {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            entries: BTreeMap::new(),
            generated: Utc::now(),
        }
    }
}

impl ChartIndex {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::Internal {
            message: format!("Invalid chart index: {}", e),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::Internal {
            message: format!("Invalid chart index: invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Get all versions of a chart
    pub fn get(&self, name: &str) -> Option<&Vec<ChartEntry>> {
        self.entries.get(name)
    }

    pub fn get_version(&self, name: &str, version: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .find(|e| e.version == version)
    }

    /// Highest semver version of a chart
    pub fn get_latest(&self, name: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .max_by(|a, b| compare_versions(&a.version, &b.version))
    }

    /// Add an entry, replacing any entry with the same version
    pub fn add_entry(&mut self, entry: ChartEntry) {
        let versions = self.entries.entry(entry.name.clone()).or_default();
        versions.retain(|e| e.version != entry.version);
        versions.push(entry);
    }

    /// Order each chart's versions newest first
    pub fn sort_entries(&mut self) {
        for versions in self.entries.values_mut() {
            versions.sort_by(|a, b| compare_versions(&b.version, &a.version));
        }
    }

    /// Total number of chart versions
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    match (Version::parse(a).ok(), Version::parse(b).ok()) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Chart version entry in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    pub name: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ChartDependency>,

    /// URLs to download the chart archive
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive, hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,

    /// `application` or `library`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

impl ChartEntry {
    pub fn from_metadata(
        meta: ChartMetadata,
        url: String,
        digest: String,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            api_version: meta.api_version,
            name: meta.name,
            version: meta.version,
            app_version: meta.app_version,
            description: meta.description,
            home: meta.home,
            sources: meta.sources,
            keywords: meta.keywords,
            dependencies: meta.dependencies,
            urls: vec![url],
            digest: Some(digest),
            created: Some(created),
            deprecated: meta.deprecated,
            r#type: meta.r#type,
        }
    }

    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }
}
