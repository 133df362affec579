//! Helm chart descriptor (`Chart.yaml`)

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::{ChartDependency, ChartDetails};

/// Parsed `Chart.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default)]
    pub api_version: Option<String>,

    pub name: String,

    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub home: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub maintainers: Vec<ChartMaintainer>,

    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,

    #[serde(default)]
    pub deprecated: bool,

    /// `application` or `library`
    #[serde(default)]
    pub r#type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartMaintainer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl ChartMetadata {
    /// Parse and validate a descriptor
    pub fn parse(yaml: &str) -> Result<Self> {
        let meta: ChartMetadata = serde_yaml::from_str(yaml)?;

        if meta.name.trim().is_empty() {
            return Err(CoreError::InvalidChart {
                message: "Chart.yaml has an empty name".to_string(),
            });
        }

        Version::parse(&meta.version).map_err(|e| CoreError::InvalidChart {
            message: format!("Invalid chart version '{}': {}", meta.version, e),
        })?;

        Ok(meta)
    }

    /// Conventional package file name, `<name>-<version>.tgz`
    pub fn package_file_name(&self) -> String {
        format!("{}-{}.tgz", self.name, self.version)
    }

    pub fn details(&self) -> ChartDetails {
        ChartDetails {
            app_version: self.app_version.clone(),
            description: self.description.clone(),
            keywords: self.keywords.clone(),
            dependencies: self.dependencies.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let meta = ChartMetadata::parse("name: app\nversion: 0.1.0\n").unwrap();
        assert_eq!(meta.name, "app");
        assert!(meta.dependencies.is_empty());
        assert_eq!(meta.package_file_name(), "app-0.1.0.tgz");
    }

    #[test]
    fn test_parse_rejects_bad_version() {
        let err = ChartMetadata::parse("name: app\nversion: latest\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidChart { .. }));
    }

    #[test]
    fn test_parse_rejects_empty_name() {
        assert!(ChartMetadata::parse("name: ''\nversion: 1.0.0\n").is_err());
    }

    #[test]
    fn test_details() {
        let meta = ChartMetadata::parse(
            "name: app\nversion: 1.2.3\nappVersion: v9\nkeywords: [a]\ndependencies:\n  - name: db\n    version: 1.x\n",
        )
        .unwrap();

        let details = meta.details();
        assert_eq!(details.app_version.as_deref(), Some("v9"));
        assert_eq!(details.keywords, vec!["a"]);
        assert_eq!(details.dependencies[0].name, "db");
        assert_eq!(details.dependencies[0].repository, None);
    }
}
