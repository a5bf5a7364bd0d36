use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ParamError;
use crate::source::{ParameterSource, Parameters};

/// Key wrapping a node's parameters in ROS-style parameter files
const ROS_PARAMETERS_KEY: &str = "ros__parameters";

/// How often `wait_for_service` checks for the file
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Parameters read from a YAML file.
///
/// The file may be flat (`dt: 10`) or keyed by node name, optionally with a
/// `ros__parameters` wrapper:
///
/// ```yaml
/// image_publisher:
///   ros__parameters:
///     dt: 10
///     max_count: 100
/// ```
///
/// The source counts as reachable once the file exists.
pub struct FileParameterSource {
    path: PathBuf,
    namespace: Option<String>,
    poll_interval: Duration,
}

impl FileParameterSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            namespace: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Select the section keyed by `namespace` when the file has one
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole parameter section
    pub async fn load(&self) -> Result<Parameters, ParamError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse_parameters(&content, self.namespace.as_deref())
    }
}

/// Parse parameter YAML, selecting the namespace section if present.
pub fn parse_parameters(content: &str, namespace: Option<&str>) -> Result<Parameters, ParamError> {
    let root: Value = serde_yaml::from_str(content)?;
    let section = match root {
        Value::Null => return Ok(Parameters::new()),
        Value::Object(map) => {
            let scoped = namespace
                .and_then(|ns| map.get(ns))
                .and_then(Value::as_object)
                .cloned();
            unwrap_ros_parameters(scoped.unwrap_or(map))
        }
        other => {
            return Err(ParamError::InvalidType {
                name: "<root>".to_string(),
                reason: format!("expected a mapping, found {}", other),
            })
        }
    };
    Ok(section.into_iter().collect())
}

fn unwrap_ros_parameters(map: serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
    match map.get(ROS_PARAMETERS_KEY).and_then(Value::as_object) {
        Some(inner) => inner.clone(),
        None => map,
    }
}

#[async_trait]
impl ParameterSource for FileParameterSource {
    async fn wait_for_service(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
                return true;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn get_parameters(&self, names: &[&str]) -> Result<Parameters, ParamError> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(ParamError::Unavailable(self.path.display().to_string()));
        }
        let params = self.load().await?;
        tracing::debug!(path = %self.path.display(), count = params.len(), "loaded parameter file");
        Ok(params.select(names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_flat() {
        let params = parse_parameters("dt: 5\nmax_count: 7\n", None).unwrap();
        assert_eq!(params.get_or::<u32>("dt", 10).unwrap(), 5);
        assert_eq!(params.get_or::<u32>("max_count", 100).unwrap(), 7);
    }

    #[test]
    fn test_parse_namespaced_ros_style() {
        let yaml = r#"
image_publisher:
  ros__parameters:
    dt: 20
    benchmark_path: /tmp/bench
other_node:
  ros__parameters:
    dt: 99
"#;
        let params = parse_parameters(yaml, Some("image_publisher")).unwrap();
        assert_eq!(params.get_or::<u32>("dt", 10).unwrap(), 20);
        assert_eq!(params.get_or("benchmark_path", String::new()).unwrap(), "/tmp/bench");
    }

    #[test]
    fn test_namespace_missing_falls_back_to_root() {
        let params = parse_parameters("dt: 3\n", Some("image_publisher")).unwrap();
        assert_eq!(params.get_or::<u32>("dt", 10).unwrap(), 3);
    }

    #[test]
    fn test_parse_empty_file() {
        let params = parse_parameters("", None).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn test_parse_non_mapping_rejected() {
        assert!(parse_parameters("- 1\n- 2\n", None).is_err());
    }

    #[tokio::test]
    async fn test_file_source_reads_selected_names() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "dt: 15\ndimensions: 2\nunrelated: true").unwrap();

        let source = FileParameterSource::new(file.path());
        assert!(source.wait_for_service(Duration::from_millis(10)).await);

        let params = source.get_parameters(&["dt", "dimensions"]).await.unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params.get_or::<u32>("dimensions", 1024).unwrap(), 2);
        assert!(!params.contains("unrelated"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_missing_file_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileParameterSource::new(dir.path().join("params.yaml"));
        assert!(!source.wait_for_service(Duration::from_secs(1)).await);
        assert!(matches!(
            source.get_parameters(&["dt"]).await,
            Err(ParamError::Unavailable(_))
        ));
    }
}
