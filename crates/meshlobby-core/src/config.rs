//! Coordinator configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Whether advertising and browsing are activated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    /// Starting either advertising or browsing starts both, and a reset
    /// resumes both under the new identity.
    #[default]
    Paired,
    /// Advertising and browsing are controlled separately and stay stopped
    /// after a reset.
    Independent,
}

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Service tag advertised and browsed for
    pub service_tag: String,
    /// Timeout passed to the transport with every invitation
    pub invite_timeout: Duration,
    /// Time allowed for a join attempt, request through confirmation
    pub join_timeout: Duration,
    /// Advertising/browsing activation policy
    pub mode: OperatingMode,
    /// Remove members from the lobby when their connection drops
    pub evict_on_disconnect: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            service_tag: "meshlobby".to_owned(),
            invite_timeout: Duration::from_secs(30),
            join_timeout: Duration::from_secs(15),
            mode: OperatingMode::Paired,
            evict_on_disconnect: false,
        }
    }
}

impl CoordinatorConfig {
    /// Longest accepted service tag.
    pub const MAX_SERVICE_TAG_LEN: usize = 15;

    /// Check the configuration.
    ///
    /// Service tags are 1-15 characters of lowercase ASCII letters, digits and
    /// hyphens, with no leading, trailing or doubled hyphen.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_service_tag(&self.service_tag)?;

        if self.invite_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout { field: "invite_timeout" });
        }
        if self.join_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout { field: "join_timeout" });
        }

        Ok(())
    }
}

fn validate_service_tag(tag: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidServiceTag { tag: tag.to_owned(), reason };

    if tag.is_empty() || tag.len() > CoordinatorConfig::MAX_SERVICE_TAG_LEN {
        return Err(invalid("must be 1-15 characters"));
    }
    if !tag.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-') {
        return Err(invalid("only lowercase letters, digits and hyphens are allowed"));
    }
    if tag.starts_with('-') || tag.ends_with('-') || tag.contains("--") {
        return Err(invalid("hyphens must separate other characters"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_tag(tag: &str) -> CoordinatorConfig {
        CoordinatorConfig { service_tag: tag.to_owned(), ..Default::default() }
    }

    #[test]
    fn default_is_valid() {
        assert!(CoordinatorConfig::default().validate().is_ok());
    }

    #[test]
    fn accepts_hyphenated_tag() {
        assert!(with_tag("test-lol").validate().is_ok());
        assert!(with_tag("a1-b2-c3").validate().is_ok());
    }

    #[test]
    fn rejects_bad_tags() {
        for tag in ["", "sixteen-chars-xx", "Upper", "under_score", "-lead", "trail-", "dou--ble"] {
            assert!(
                matches!(with_tag(tag).validate(), Err(ConfigError::InvalidServiceTag { .. })),
                "tag {tag:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_zero_timeouts() {
        let config = CoordinatorConfig { join_timeout: Duration::ZERO, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout { field: "join_timeout" }));

        let config = CoordinatorConfig { invite_timeout: Duration::ZERO, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout { field: "invite_timeout" }));
    }
}
