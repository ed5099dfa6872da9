//! Dashboard listings read from a file.

use crate::collaborators::{Capture, DashboardSource};
use crate::types::DashboardRef;
use async_trait::async_trait;
use dashlens_core::{AppError, AppResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// A listing file is either a bare list or `{ dashboards: [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing {
    Bare(Vec<DashboardRef>),
    Wrapped { dashboards: Vec<DashboardRef> },
}

/// Dashboard source backed by a JSON or YAML file. Captures nothing.
#[derive(Debug, Clone)]
pub struct StaticSource {
    path: PathBuf,
}

impl StaticSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a listing; `.json` files as JSON, everything else as YAML.
    pub fn parse(content: &str, path: &Path) -> AppResult<Vec<DashboardRef>> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let listing: Listing = if is_json {
            serde_json::from_str(content)?
        } else {
            serde_yaml::from_str(content)?
        };

        Ok(match listing {
            Listing::Bare(dashboards) => dashboards,
            Listing::Wrapped { dashboards } => dashboards,
        })
    }
}

#[async_trait]
impl DashboardSource for StaticSource {
    async fn list_available_dashboards(&self) -> AppResult<Vec<DashboardRef>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AppError::Config(format!(
                "Failed to read dashboard list {:?}: {}",
                self.path, e
            ))
        })?;

        let dashboards = Self::parse(&content, &self.path)?;
        tracing::info!(
            path = %self.path.display(),
            count = dashboards.len(),
            "Loaded dashboard list"
        );
        Ok(dashboards)
    }

    async fn capture(&self, _dashboard: &DashboardRef) -> AppResult<Capture> {
        Ok(Capture::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_json_list() {
        let dashboards = StaticSource::parse(
            r#"[{"id": 12, "title": "Sales", "charts": [{"title": "By Region", "chart_type": "bar"}]}]"#,
            Path::new("dashboards.json"),
        )
        .unwrap();
        assert_eq!(dashboards[0].id, "12");
        assert_eq!(dashboards[0].charts[0].chart_type, "bar");
    }

    #[test]
    fn test_parse_yaml_wrapped() {
        let yaml = "dashboards:\n  - id: ops\n    title: Operations\n  - id: 3\n    title: Finance\n";
        let dashboards = StaticSource::parse(yaml, Path::new("dashboards.yaml")).unwrap();
        assert_eq!(dashboards.len(), 2);
        assert_eq!(dashboards[1].id, "3");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(StaticSource::parse("{\"nope\": true}", Path::new("x.json")).is_err());
    }

    #[tokio::test]
    async fn test_list_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dashboards.json");
        std::fs::write(&path, r#"{"dashboards": [{"id": "a", "title": "A"}]}"#).unwrap();

        let source = StaticSource::new(&path);
        let dashboards = source.list_available_dashboards().await.unwrap();
        assert_eq!(dashboards.len(), 1);
        assert!(source.capture(&dashboards[0]).await.unwrap().is_empty());

        assert!(StaticSource::new(temp.path().join("missing.json"))
            .list_available_dashboards()
            .await
            .is_err());
    }
}
