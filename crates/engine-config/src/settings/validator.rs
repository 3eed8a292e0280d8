use crate::settings::{
    RunMode, RunnerSettings, default_state_dir, error::SettingsError,
    validated::ValidatedSettings,
};
use model::records::record::Record;
use std::time::Duration;
use tracing::debug;

/// Characters reserved by the state store key layout.
const RESERVED: [char; 3] = [':', '#', '/'];

pub struct SettingsValidator;

impl SettingsValidator {
    pub fn validate(raw: &RunnerSettings) -> Result<ValidatedSettings, SettingsError> {
        let runner_id = Self::name("runner_id", &raw.runner_id)?;
        let source = Self::name("source", &raw.source)?;
        let target = Self::name("target", &raw.target)?;

        let salt = match raw.salt.as_deref() {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => return Err(SettingsError::Missing("salt")),
        };

        if raw.chunk_size == 0 {
            return Err(Self::invalid("chunk_size", "must be at least 1"));
        }
        if raw.transform_concurrency == 0 {
            return Err(Self::invalid("transform_concurrency", "must be at least 1"));
        }
        if raw.retry.threshold == 0 {
            return Err(Self::invalid("retry.threshold", "must be at least 1"));
        }
        if raw.retry.max_delay_ms < raw.retry.base_delay_ms {
            return Err(Self::invalid(
                "retry.max_delay_ms",
                "must not be smaller than retry.base_delay_ms",
            ));
        }
        if raw.mode == RunMode::Continuous && raw.poll_interval_ms == 0 {
            return Err(Self::invalid(
                "poll_interval_ms",
                "must be positive in continuous mode",
            ));
        }
        if raw.lease_ttl_secs == 0 {
            return Err(Self::invalid("lease_ttl_secs", "must be positive"));
        }
        // The lease is renewed once per fetch; waits must leave half the TTL as margin.
        let renew_budget_ms = raw.lease_ttl_secs.saturating_mul(1_000) / 2;
        if raw.mode == RunMode::Continuous && raw.poll_interval_ms > renew_budget_ms {
            return Err(Self::invalid(
                "poll_interval_ms",
                format!("must not exceed half of lease_ttl_secs ({renew_budget_ms} ms)"),
            ));
        }
        if raw.retry.max_delay_ms > renew_budget_ms {
            return Err(Self::invalid(
                "retry.max_delay_ms",
                format!("must not exceed half of lease_ttl_secs ({renew_budget_ms} ms)"),
            ));
        }

        let privileged_group = raw.redaction.privileged_group.trim().to_string();
        if privileged_group.is_empty() {
            return Err(SettingsError::Missing("redaction.privileged_group"));
        }

        let mut restricted_columns = Vec::with_capacity(raw.redaction.restricted_columns.len());
        for column in &raw.redaction.restricted_columns {
            let normalized = column.trim().to_ascii_lowercase();
            if !Record::COLUMNS.contains(&normalized.as_str()) {
                return Err(SettingsError::UnknownColumn(column.clone()));
            }
            if !restricted_columns.contains(&normalized) {
                restricted_columns.push(normalized);
            }
        }

        let validated = ValidatedSettings {
            runner_id,
            source,
            target,
            state_dir: raw.state_dir.clone().unwrap_or_else(default_state_dir),
            salt,
            mode: raw.mode,
            poll_interval: Duration::from_millis(raw.poll_interval_ms),
            chunk_size: raw.chunk_size,
            transform_concurrency: raw.transform_concurrency,
            excluded_keys: raw.excluded_keys.iter().copied().collect(),
            create_target_if_missing: raw.create_target_if_missing,
            lease_ttl: Duration::from_secs(raw.lease_ttl_secs),
            retry: raw.retry.clone(),
            privileged_group,
            restricted_columns,
        };

        debug!(settings = ?validated, "Settings validated");
        Ok(validated)
    }

    fn name(field: &'static str, value: &str) -> Result<String, SettingsError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(SettingsError::Missing(field));
        }
        if let Some(c) = value.chars().find(|c| RESERVED.contains(c)) {
            return Err(Self::invalid(field, format!("must not contain '{c}'")));
        }
        Ok(value.to_string())
    }

    fn invalid(field: &'static str, reason: impl Into<String>) -> SettingsError {
        SettingsError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RetrySettings;

    fn raw() -> RunnerSettings {
        RunnerSettings {
            runner_id: "turbines".into(),
            source: "bronze".into(),
            target: "silver".into(),
            salt: Some("TEST".into()),
            state_dir: Some("/tmp/saltmerge".into()),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_defaults() {
        let settings = SettingsValidator::validate(&raw()).unwrap();
        assert_eq!(settings.runner_key().storage_key(), "turbines:silver");
        assert_eq!(settings.restricted_columns, vec!["rpm", "angle"]);
        assert!(settings.excluded_keys.contains(&0));
        assert!(!settings.is_continuous());
    }

    #[test]
    fn salt_is_required_and_hidden_from_debug() {
        let err = SettingsValidator::validate(&RunnerSettings {
            salt: None,
            ..raw()
        })
        .unwrap_err();
        assert!(matches!(err, SettingsError::Missing("salt")));

        let rendered = format!("{:?}", SettingsValidator::validate(&raw()).unwrap());
        assert!(!rendered.contains("TEST"));
    }

    #[test]
    fn rejects_reserved_characters_in_names() {
        let err = SettingsValidator::validate(&RunnerSettings {
            target: "a:b".into(),
            ..raw()
        })
        .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { field: "target", .. }));
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let err = SettingsValidator::validate(&RunnerSettings {
            chunk_size: 0,
            ..raw()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                field: "chunk_size",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_restricted_column() {
        let mut settings = raw();
        settings.redaction.restricted_columns = vec!["RPM".into(), "torque".into()];
        assert!(matches!(
            SettingsValidator::validate(&settings),
            Err(SettingsError::UnknownColumn(c)) if c == "torque"
        ));
    }

    #[test]
    fn continuous_mode_needs_poll_interval() {
        let err = SettingsValidator::validate(&RunnerSettings {
            mode: RunMode::Continuous,
            poll_interval_ms: 0,
            ..raw()
        })
        .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { .. }));
    }

    #[test]
    fn mode_override_is_checked_by_validation() {
        let drain = RunnerSettings {
            poll_interval_ms: 0,
            ..raw()
        };
        assert!(SettingsValidator::validate(&drain).is_ok());

        let err = SettingsValidator::validate(&drain.with_mode(RunMode::Continuous)).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                field: "poll_interval_ms",
                ..
            }
        ));
    }

    #[test]
    fn poll_interval_must_stay_well_below_lease_ttl() {
        let settings = RunnerSettings {
            mode: RunMode::Continuous,
            lease_ttl_secs: 10,
            poll_interval_ms: 5_000,
            retry: RetrySettings {
                max_delay_ms: 1_000,
                ..RetrySettings::default()
            },
            ..raw()
        };
        assert!(SettingsValidator::validate(&settings).is_ok());

        let err = SettingsValidator::validate(&RunnerSettings {
            poll_interval_ms: 10_000,
            ..settings.clone()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                field: "poll_interval_ms",
                ..
            }
        ));

        // Drain mode never sleeps between fetches.
        assert!(
            SettingsValidator::validate(&RunnerSettings {
                mode: RunMode::Drain,
                poll_interval_ms: 10_000,
                ..settings
            })
            .is_ok()
        );
    }

    #[test]
    fn retry_backoff_must_stay_well_below_lease_ttl() {
        let err = SettingsValidator::validate(&RunnerSettings {
            lease_ttl_secs: 10,
            retry: RetrySettings {
                max_delay_ms: 6_000,
                ..RetrySettings::default()
            },
            ..raw()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                field: "retry.max_delay_ms",
                ..
            }
        ));
    }
}
