//! Registry configuration.

use serde::{Deserialize, Serialize};

/// Tuning for the [`ConnectionRegistry`](crate::ConnectionRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How many simultaneous live connections one user may hold. When a
    /// new connection pushes a user over this limit, the oldest ones are
    /// superseded.
    ///
    /// Default: 1 (newest connection wins).
    pub max_connections_per_user: usize,

    /// Number of independently locked shards per index. Operations on users
    /// in different shards never contend.
    ///
    /// Default: 16.
    pub shards: usize,
}

impl RegistryConfig {
    /// Returns a copy with every field clamped to a usable value.
    ///
    /// A limit or shard count of zero would make the registry unusable, so
    /// both are raised to 1 with a warning.
    pub fn validated(mut self) -> Self {
        if self.max_connections_per_user == 0 {
            tracing::warn!("max_connections_per_user = 0, clamping to 1");
            self.max_connections_per_user = 1;
        }
        if self.shards == 0 {
            tracing::warn!("registry shards = 0, clamping to 1");
            self.shards = 1;
        }
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_connections_per_user: 1,
            shards: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_clamps_zero_values() {
        let config = RegistryConfig {
            max_connections_per_user: 0,
            shards: 0,
        }
        .validated();
        assert_eq!(config.max_connections_per_user, 1);
        assert_eq!(config.shards, 1);
    }

    #[test]
    fn test_validated_keeps_sane_values() {
        let config = RegistryConfig {
            max_connections_per_user: 3,
            shards: 4,
        };
        assert_eq!(config.clone().validated(), config);
    }
}
