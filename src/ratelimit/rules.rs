//! Per-endpoint quota rules.
//!
//! Each protected path can carry its own [`QuotaConfig`]; everything else
//! falls back to the default quota. Rules are matched by exact path first,
//! then by the longest segment-aligned path prefix.

use serde::{Deserialize, Serialize};

use super::window::{QuotaConfig, DEFAULT_WINDOW_MS};
use crate::error::{GateError, Result};

/// Path of the flip API.
pub const FLIP_PATH: &str = "/api/flip";
/// Requests per window admitted on the flip API.
pub const FLIP_MAX_REQUESTS: u32 = 30;

/// Quota rules for every protected endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRules {
    /// Quota applied when no rule matches
    #[serde(default)]
    pub default: QuotaConfig,
    /// Endpoint-specific rules
    #[serde(default)]
    pub endpoints: Vec<EndpointRule>,
}

/// A quota bound to a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRule {
    /// Path this rule applies to, including everything below it
    pub path: String,
    /// Quota applied on this path
    #[serde(flatten)]
    pub quota: QuotaConfig,
    /// Optional name/description for this rule
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for EndpointRules {
    fn default() -> Self {
        Self {
            default: QuotaConfig::default(),
            endpoints: vec![EndpointRule {
                path: FLIP_PATH.to_string(),
                quota: QuotaConfig {
                    window_ms: DEFAULT_WINDOW_MS,
                    max_requests: FLIP_MAX_REQUESTS,
                },
                name: Some("flip".to_string()),
            }],
        }
    }
}

impl EndpointRules {
    /// Rules with only a default quota.
    pub fn with_default(default: QuotaConfig) -> Self {
        Self {
            default,
            endpoints: Vec::new(),
        }
    }

    /// Add a rule for `path`.
    pub fn with_endpoint(mut self, path: impl Into<String>, quota: QuotaConfig) -> Self {
        self.endpoints.push(EndpointRule {
            path: path.into(),
            quota,
            name: None,
        });
        self
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: EndpointRules = serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("Failed to parse quota rules: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check every quota and path in the rule set.
    pub fn validate(&self) -> Result<()> {
        self.default.validate()?;
        for rule in &self.endpoints {
            if !rule.path.starts_with('/') {
                return Err(GateError::Config(format!(
                    "endpoint path must start with '/': {}",
                    rule.path
                )));
            }
            rule.quota
                .validate()
                .map_err(|e| GateError::Config(format!("endpoint {}: {}", rule.path, e)))?;
        }
        Ok(())
    }

    /// Find the quota that applies to a request path.
    pub fn quota_for(&self, path: &str) -> &QuotaConfig {
        self.find_rule(path)
            .map(|rule| &rule.quota)
            .unwrap_or(&self.default)
    }

    /// Find the most specific rule matching `path`, if any.
    pub fn find_rule(&self, path: &str) -> Option<&EndpointRule> {
        if let Some(exact) = self.endpoints.iter().find(|rule| rule.path == path) {
            return Some(exact);
        }

        self.endpoints
            .iter()
            .filter(|rule| covers(&rule.path, path))
            .max_by_key(|rule| rule.path.len())
    }
}

/// Whether `prefix` covers `path` on a segment boundary.
fn covers(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_protect_flip() {
        let rules = EndpointRules::default();

        assert_eq!(rules.quota_for("/api/flip").max_requests, 30);
        assert_eq!(rules.quota_for("/api/flip").window_ms, 15 * 60 * 1000);
        assert_eq!(rules.quota_for("/api/aura").max_requests, 100);
    }

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
default:
  window_ms: 60000
  max_requests: 50
endpoints:
  - path: /api/flip
    window_ms: 900000
    max_requests: 30
    name: flip
  - path: /api/sms
    window_ms: 1000
    max_requests: 2
"#;
        let rules = EndpointRules::from_yaml(yaml).unwrap();

        assert_eq!(rules.default.max_requests, 50);
        assert_eq!(rules.endpoints.len(), 2);
        assert_eq!(rules.endpoints[0].name.as_deref(), Some("flip"));
        assert_eq!(rules.quota_for("/api/sms").window_ms, 1000);
    }

    #[test]
    fn test_parse_rejects_zero_quota() {
        let yaml = r#"
endpoints:
  - path: /api/flip
    window_ms: 0
    max_requests: 30
"#;
        assert!(EndpointRules::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_parse_rejects_relative_path() {
        let yaml = r#"
endpoints:
  - path: api/flip
    window_ms: 1000
    max_requests: 30
"#;
        assert!(EndpointRules::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_prefix_match_is_segment_aligned() {
        let api = QuotaConfig::new(1_000, 10).unwrap();
        let rules = EndpointRules::with_default(QuotaConfig::default()).with_endpoint("/api", api);

        assert_eq!(rules.quota_for("/api"), &api);
        assert_eq!(rules.quota_for("/api/flip"), &api);
        assert_eq!(rules.quota_for("/apiary"), &QuotaConfig::default());
    }

    #[test]
    fn test_most_specific_rule_wins() {
        let broad = QuotaConfig::new(1_000, 100).unwrap();
        let narrow = QuotaConfig::new(1_000, 5).unwrap();
        let rules = EndpointRules::with_default(QuotaConfig::default())
            .with_endpoint("/api", broad)
            .with_endpoint("/api/flip", narrow);

        assert_eq!(rules.quota_for("/api/flip/config"), &narrow);
        assert_eq!(rules.quota_for("/api/aura"), &broad);
    }

    #[test]
    fn test_no_match_uses_default() {
        let rules = EndpointRules::with_default(QuotaConfig::new(5_000, 7).unwrap());
        assert!(rules.find_rule("/anything").is_none());
        assert_eq!(rules.quota_for("/anything").max_requests, 7);
    }
}
