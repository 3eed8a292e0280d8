use model::{core::value::Value, records::record::Record};
use serde::Serialize;
use std::collections::BTreeSet;

pub const REDACTED: &str = "REDACTED";

/// Columns exposed through the redacted view, in order.
pub const VIEW_COLUMNS: [&str; 4] = ["message_id", "device_id", "rpm", "angle"];

/// The user asking to read the view and the groups they belong to.
#[derive(Debug, Clone, Default)]
pub struct CallerIdentity {
    pub user: String,
    groups: BTreeSet<String>,
}

impl CallerIdentity {
    pub fn new(user: impl Into<String>, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            user: user.into(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_member(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedColumn {
    pub name: &'static str,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedRow {
    pub columns: Vec<ProjectedColumn>,
}

impl ProjectedRow {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| &c.value)
    }
}

/// Read-only projection of records for a given caller.
pub trait RedactionView: Send + Sync {
    fn project(&self, record: &Record, caller: &CallerIdentity) -> ProjectedRow;
}

/// Replaces restricted columns with [`REDACTED`] unless the caller belongs
/// to the privileged group.
#[derive(Debug, Clone)]
pub struct GroupRedactionView {
    privileged_group: String,
    restricted: BTreeSet<String>,
}

impl GroupRedactionView {
    pub fn new(
        privileged_group: impl Into<String>,
        restricted: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            privileged_group: privileged_group.into(),
            restricted: restricted
                .into_iter()
                .map(|c| c.into().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_restricted(&self, column: &str) -> bool {
        self.restricted.contains(&column.to_ascii_lowercase())
    }
}

impl Default for GroupRedactionView {
    fn default() -> Self {
        Self::new("test", ["rpm", "angle"])
    }
}

impl RedactionView for GroupRedactionView {
    fn project(&self, record: &Record, caller: &CallerIdentity) -> ProjectedRow {
        let privileged = caller.is_member(&self.privileged_group);
        let columns = VIEW_COLUMNS
            .iter()
            .map(|&name| {
                let value = if !privileged && self.is_restricted(name) {
                    Value::String(REDACTED.to_string())
                } else {
                    record.get_value(name)
                };
                ProjectedColumn { name, value }
            })
            .collect();

        ProjectedRow { columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use model::records::record::MessageId;

    fn record() -> Record {
        Record {
            device_id: Some(123),
            message_id: MessageId(4),
            rpm: Some(7.0),
            angle: Some(0.3),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn outsiders_see_sentinel_for_restricted_columns() {
        let view = GroupRedactionView::default();
        let row = view.project(&record(), &CallerIdentity::new("bob", ["analysts"]));

        assert_eq!(row.get("rpm"), Some(&Value::String(REDACTED.into())));
        assert_eq!(row.get("angle"), Some(&Value::String(REDACTED.into())));
        assert_eq!(row.get("device_id"), Some(&Value::Int(123)));
        assert_eq!(row.get("message_id"), Some(&Value::Uint(4)));
    }

    #[test]
    fn members_see_true_values() {
        let view = GroupRedactionView::default();
        let row = view.project(&record(), &CallerIdentity::new("alice", ["test"]));

        assert_eq!(row.get("rpm"), Some(&Value::Float(7.0)));
        assert_eq!(row.get("angle"), Some(&Value::Float(0.3)));
    }

    #[test]
    fn projection_does_not_touch_the_record() {
        let original = record();
        let copy = original.clone();
        GroupRedactionView::new("ops", ["RPM"]).project(&original, &CallerIdentity::default());
        assert_eq!(original, copy);
    }

    #[test]
    fn restricted_column_names_are_case_insensitive() {
        let view = GroupRedactionView::new("ops", ["RPM"]);
        let row = view.project(&record(), &CallerIdentity::default());
        assert_eq!(row.get("rpm"), Some(&Value::String(REDACTED.into())));
        assert_eq!(row.get("angle"), Some(&Value::Float(0.3)));
        assert_eq!(row.columns.len(), VIEW_COLUMNS.len());
    }
}
