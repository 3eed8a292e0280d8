use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunnerId(Arc<str>);

impl RunnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunnerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetName(Arc<str>);

impl TargetName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The (runner, target) pair that owns one checkpoint and one lease.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunnerKey {
    pub runner_id: RunnerId,
    pub target: TargetName,
}

impl RunnerKey {
    pub fn new(runner_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            runner_id: RunnerId::new(runner_id),
            target: TargetName::new(target),
        }
    }

    /// Storage key shared by the checkpoint, lease and WAL entries of this pair.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.runner_id.as_str(), self.target.as_str())
    }
}

impl fmt::Display for RunnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.runner_id.as_str(), self.target.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_joins_runner_and_target() {
        let key = RunnerKey::new("turbine-merge", "bronzeturbinet_target");
        assert_eq!(key.storage_key(), "turbine-merge:bronzeturbinet_target");
        assert_eq!(key.to_string(), "turbine-merge/bronzeturbinet_target");
    }

    #[test]
    fn key_serializes_as_plain_strings() {
        let key = RunnerKey::new("turbines", "silver");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"runner_id":"turbines","target":"silver"}"#);
        assert_eq!(serde_json::from_str::<RunnerKey>(&json).unwrap(), key);
    }
}
