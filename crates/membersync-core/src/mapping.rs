//! Source group to directory group mapping.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::source::SourceUser;

/// Marker stripped from configured target names when deriving the prefix.
const TARGET_MARKER: &str = "Qlik-";

/// Maps a source user to the directory group names they belong in.
pub trait GroupResolver: Send + Sync {
    fn resolve_target_groups(&self, user: &SourceUser) -> BTreeSet<String>;
}

/// Prefix-based lookup built once from the configured target group names.
///
/// A target named `Qlik-Sales_All` owns the prefix `Sales_`: everything up
/// to and including the first underscore, minus the leading `Qlik-` marker.
/// A source group such as `Sales_Oslo` maps to it via the same prefix.
#[derive(Debug, Clone, Default)]
pub struct PrefixGroupMapping {
    target_by_prefix: HashMap<String, String>,
}

impl PrefixGroupMapping {
    #[must_use]
    pub fn from_target_groups(target_groups: &[String]) -> Self {
        let mut target_by_prefix = HashMap::new();

        for target in target_groups.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            let Some(idx) = target.find('_').filter(|&idx| idx > 0) else {
                warn!(group = %target, "Group mapping does not contain '_', skipping");
                continue;
            };
            let start = if target.starts_with(TARGET_MARKER) {
                TARGET_MARKER.len()
            } else {
                0
            };
            let Some(prefix) = target.get(start..=idx) else {
                warn!(group = %target, "Group mapping has an empty prefix, skipping");
                continue;
            };
            debug!(prefix = %prefix, group = %target, "Configured group mapping");
            target_by_prefix.insert(prefix.to_string(), target.to_string());
        }

        Self { target_by_prefix }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.target_by_prefix.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.target_by_prefix.is_empty()
    }

    fn target_for(&self, source_group: &str) -> Option<&String> {
        let idx = source_group.find('_').filter(|&idx| idx > 0)?;
        self.target_by_prefix.get(&source_group[..=idx])
    }
}

impl GroupResolver for PrefixGroupMapping {
    fn resolve_target_groups(&self, user: &SourceUser) -> BTreeSet<String> {
        let targets: BTreeSet<String> = user
            .assigned_groups
            .iter()
            .filter_map(|g| g.name.as_deref())
            .filter_map(|name| self.target_for(name))
            .cloned()
            .collect();

        if !targets.is_empty() {
            debug!(user_id = %user.id, groups = ?targets, "Resolved target groups");
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::AssignedGroup;

    fn mapping(targets: &[&str]) -> PrefixGroupMapping {
        let targets: Vec<String> = targets.iter().map(ToString::to_string).collect();
        PrefixGroupMapping::from_target_groups(&targets)
    }

    fn user_in(groups: &[&str]) -> SourceUser {
        SourceUser {
            id: "q1".into(),
            assigned_groups: groups.iter().map(|g| AssignedGroup::new(*g, "idp")).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_marker_is_stripped_from_prefix() {
        let m = mapping(&["Qlik-Sales_All", "Finance_Readers"]);
        assert_eq!(m.len(), 2);

        let groups = m.resolve_target_groups(&user_in(&["Sales_Oslo", "Finance_Q3"]));
        assert_eq!(
            groups,
            BTreeSet::from(["Qlik-Sales_All".to_string(), "Finance_Readers".to_string()])
        );
    }

    #[test]
    fn test_names_without_underscore_are_skipped() {
        let m = mapping(&["Sales", "_Leading", "  "]);
        assert!(m.is_empty());
    }

    #[test]
    fn test_unmapped_and_malformed_source_groups_resolve_to_nothing() {
        let m = mapping(&["Qlik-Sales_All"]);
        let user = SourceUser {
            id: "q1".into(),
            assigned_groups: vec![
                AssignedGroup::new("Marketing_Oslo", "idp"),
                AssignedGroup::new("Sales", "idp"),
                AssignedGroup::new("_Sales", "idp"),
                AssignedGroup::default(),
            ],
            ..Default::default()
        };
        assert!(m.resolve_target_groups(&user).is_empty());
    }

    #[test]
    fn test_prefix_match_is_case_sensitive() {
        let m = mapping(&["Qlik-Sales_All"]);
        assert!(m.resolve_target_groups(&user_in(&["sales_Oslo"])).is_empty());
    }
}
