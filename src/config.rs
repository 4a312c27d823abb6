//! Configuration loading and constants.
//!
//! Loads the verifier configuration from a TOML file and defines defaults for
//! the failure signature set, backend timeouts, worker pool sizing, logging
//! format, and default paths. `AppConfig` is the root configuration struct
//! containing all settings.

use std::path::Path;

use const_format::formatcp;
use serde::Deserialize;

use crate::detector::FailureDetector;
use crate::registry::ServiceRegistry;

// =============================================================================
// Failure Detection Defaults
// =============================================================================

/// Signatures scanned for when the configuration does not override them
pub const DEFAULT_SIGNATURES: &[&str] = &["FileNotFoundError", "Traceback", "ERROR", "Errno"];

// =============================================================================
// Backend Defaults
// =============================================================================

/// Container runtime CLI invoked by the Docker backend
pub const DEFAULT_DOCKER_BINARY: &str = "docker";

/// Placeholder substituted with the service name in container name templates
pub const SERVICE_PLACEHOLDER: &str = "{service}";

/// Default container name template (container named exactly like the service)
pub const DEFAULT_CONTAINER_NAME_TEMPLATE: &str = SERVICE_PLACEHOLDER;

/// Per-service timeout in seconds for probe + log collection
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Verifier Worker Pool
// =============================================================================

/// Number of concurrent per-service checks
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Capacity of the job queue feeding the verifier workers
pub const VERIFIER_QUEUE_CAPACITY: usize = 64;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/fleetcheck.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "fleetcheck=warn";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Help text for the --log-level flag
pub const LOG_LEVEL_HELP: &str = formatcp!(
    "Log level filter (default: \"{}\", or RUST_LOG when set)",
    DEFAULT_LOG_FILTER
);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Ordered list of services to verify
    pub registry: RegistryConfig,
    /// Failure signature settings
    #[serde(default)]
    pub detector: DetectorConfig,
    /// Orchestration backend settings
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub report: ReportConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Service registry configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    /// Service names in reporting order
    #[serde(default)]
    pub services: Vec<String>,
}

/// Failure detector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Ordered failure signatures
    #[serde(default = "DetectorConfig::default_signatures")]
    pub signatures: Vec<String>,
    /// Match signatures as literal substrings (true) or regular expressions (false)
    #[serde(default = "DetectorConfig::default_literal")]
    pub literal: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            signatures: Self::default_signatures(),
            literal: Self::default_literal(),
        }
    }
}

impl DetectorConfig {
    fn default_signatures() -> Vec<String> {
        DEFAULT_SIGNATURES.iter().map(|s| s.to_string()).collect()
    }

    fn default_literal() -> bool {
        true
    }
}

/// Orchestration backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Path or name of the docker CLI
    #[serde(default = "BackendConfig::default_docker_binary")]
    pub docker_binary: String,
    /// Container name for a service, `{service}` is replaced by the service name
    #[serde(default = "BackendConfig::default_container_name_template")]
    pub container_name_template: String,
    /// Per-service timeout in seconds
    #[serde(default = "BackendConfig::default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            docker_binary: Self::default_docker_binary(),
            container_name_template: Self::default_container_name_template(),
            timeout_seconds: Self::default_timeout(),
        }
    }
}

impl BackendConfig {
    fn default_docker_binary() -> String {
        DEFAULT_DOCKER_BINARY.to_string()
    }

    fn default_container_name_template() -> String {
        DEFAULT_CONTAINER_NAME_TEMPLATE.to_string()
    }

    fn default_timeout() -> u64 {
        DEFAULT_TIMEOUT_SECS
    }

    /// Container name for a service according to the template
    pub fn container_name(&self, service: &str) -> String {
        self.container_name_template.replace(SERVICE_PLACEHOLDER, service)
    }
}

/// Verifier worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VerifierConfig {
    /// Number of services checked concurrently (default: 8)
    #[serde(default = "VerifierConfig::default_concurrency")]
    pub concurrency: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            concurrency: Self::default_concurrency(),
        }
    }
}

impl VerifierConfig {
    fn default_concurrency() -> usize {
        DEFAULT_CONCURRENCY
    }
}

/// Report rendering configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportConfig {
    /// Show only the last N log lines per service (unset: whole log)
    pub max_log_lines: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    /// Whether structured JSON output was requested
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Command-line values that replace configured ones
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Replaces the registry when non-empty
    pub services: Vec<String>,
    /// Replaces the signature set when non-empty
    pub signatures: Vec<String>,
    pub concurrency: Option<usize>,
    pub timeout_seconds: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut AppConfig) {
        if !self.services.is_empty() {
            config.registry.services = self.services.clone();
        }
        if !self.signatures.is_empty() {
            config.detector.signatures = self.signatures.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.verifier.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout_seconds {
            config.backend.timeout_seconds = timeout;
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with(path, &Overrides::default())
    }

    /// Load a config file, apply overrides, then validate.
    ///
    /// A missing file is tolerated when the overrides name the services.
    pub fn load_with<P: AsRef<Path>>(path: P, overrides: &Overrides) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_with(&contents, overrides),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !overrides.services.is_empty() => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                let mut config = AppConfig::default();
                overrides.apply(&mut config);
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Self::from_toml_with(contents, &Overrides::default())
    }

    pub fn from_toml_with(contents: &str, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut config: AppConfig = toml::from_str(contents)?;
        overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        ServiceRegistry::from_config(&self.registry)?;

        if self.detector.signatures.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::Validation(
                "Failure signatures must not be empty strings".to_string(),
            ));
        }
        FailureDetector::from_config(&self.detector)?;

        if !self.backend.container_name_template.contains(SERVICE_PLACEHOLDER) {
            return Err(ConfigError::Validation(format!(
                "backend.container_name_template must contain {}",
                SERVICE_PLACEHOLDER
            )));
        }

        if self.backend.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "backend.timeout_seconds must be at least 1".to_string(),
            ));
        }

        if self.verifier.concurrency == 0 {
            return Err(ConfigError::Validation(
                "verifier.concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid failure signature: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [registry]
            services = ["svc-a", "svc-b"]
            "#,
        )
        .unwrap();

        assert_eq!(config.registry.services, vec!["svc-a", "svc-b"]);
        assert_eq!(
            config.detector.signatures,
            vec!["FileNotFoundError", "Traceback", "ERROR", "Errno"]
        );
        assert!(config.detector.literal);
        assert_eq!(config.backend.docker_binary, "docker");
        assert_eq!(config.backend.timeout_seconds, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.verifier.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.report.max_log_lines, None);
        assert!(!config.logging.is_json());
    }

    #[test]
    fn test_full_config_overrides_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [registry]
            services = ["controller"]

            [detector]
            signatures = ["panicked at", "FATAL"]
            literal = false

            [backend]
            docker_binary = "/usr/local/bin/docker"
            container_name_template = "regression-{service}-1"
            timeout_seconds = 5

            [verifier]
            concurrency = 2

            [report]
            max_log_lines = 200

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.detector.signatures, vec!["panicked at", "FATAL"]);
        assert!(!config.detector.literal);
        assert_eq!(config.backend.docker_binary, "/usr/local/bin/docker");
        assert_eq!(config.backend.container_name("controller"), "regression-controller-1");
        assert_eq!(config.backend.timeout_seconds, 5);
        assert_eq!(config.verifier.concurrency, 2);
        assert_eq!(config.report.max_log_lines, Some(200));
        assert!(config.logging.is_json());
    }

    #[test]
    fn test_empty_signature_list_is_allowed() {
        let config = AppConfig::from_toml(
            r#"
            [registry]
            services = ["svc-a"]
            [detector]
            signatures = []
            "#,
        )
        .unwrap();
        assert!(config.detector.signatures.is_empty());
    }

    #[test]
    fn test_empty_registry_is_rejected() {
        let err = AppConfig::from_toml("[registry]\nservices = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_duplicate_service_is_rejected() {
        let err = AppConfig::from_toml("[registry]\nservices = [\"a\", \"b\", \"a\"]\n").unwrap_err();
        assert!(err.to_string().contains("Duplicate service name"));
    }

    #[test]
    fn test_template_without_placeholder_is_rejected() {
        let err = AppConfig::from_toml(
            "[registry]\nservices = [\"a\"]\n[backend]\ncontainer_name_template = \"fixed\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let err =
            AppConfig::from_toml("[registry]\nservices = [\"a\"]\n[verifier]\nconcurrency = 0\n")
                .unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_invalid_regex_signature_is_rejected() {
        let err = AppConfig::from_toml(
            "[registry]\nservices = [\"a\"]\n[detector]\nsignatures = [\"(unclosed\"]\nliteral = false\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Pattern(_)));
    }

    #[test]
    fn test_regex_metacharacters_allowed_in_literal_mode() {
        let config = AppConfig::from_toml(
            "[registry]\nservices = [\"a\"]\n[detector]\nsignatures = [\"(unclosed\"]\n",
        )
        .unwrap();
        assert_eq!(config.detector.signatures, vec!["(unclosed"]);
    }

    #[test]
    fn test_missing_registry_is_parse_error() {
        let err = AppConfig::from_toml("[verifier]\nconcurrency = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[registry]\nservices = [\"svc-a\"]").unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.registry.services, vec!["svc-a"]);
    }

    #[test]
    fn test_overrides_replace_configured_values() {
        let overrides = Overrides {
            services: vec!["svc-x".to_string()],
            signatures: vec!["panic".to_string()],
            concurrency: Some(1),
            timeout_seconds: Some(3),
        };
        let config = AppConfig::from_toml_with(
            "[registry]\nservices = [\"svc-a\", \"svc-b\"]\n",
            &overrides,
        )
        .unwrap();
        assert_eq!(config.registry.services, vec!["svc-x"]);
        assert_eq!(config.detector.signatures, vec!["panic"]);
        assert_eq!(config.verifier.concurrency, 1);
        assert_eq!(config.backend.timeout_seconds, 3);
    }

    #[test]
    fn test_overrides_fill_empty_registry() {
        let overrides = Overrides {
            services: vec!["svc-a".to_string()],
            ..Default::default()
        };
        let config = AppConfig::from_toml_with("[registry]\n", &overrides).unwrap();
        assert_eq!(config.registry.services, vec!["svc-a"]);
    }

    #[test]
    fn test_missing_file_with_service_overrides_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = Overrides {
            services: vec!["svc-a".to_string()],
            ..Default::default()
        };
        let config = AppConfig::load_with(dir.path().join("absent.toml"), &overrides).unwrap();
        assert_eq!(config.registry.services, vec!["svc-a"]);
        assert_eq!(config.detector.signatures.len(), DEFAULT_SIGNATURES.len());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
