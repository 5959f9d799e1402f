use std::collections::BTreeMap;

pub const MANAGED_BY_KEY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VAL: &str = "kaito-workspace-engine";
pub const WORKSPACE_LABEL_KEY: &str = "kaito.sh/workspace";

/// Collection of labels used to identify the objects generated for a workspace.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkspaceLabels(BTreeMap<String, String>);

impl WorkspaceLabels {
    /// Creates a new collection holding the workspace label only. These are the labels
    /// used as pod selectors, so they must stay stable across revisions.
    pub fn new(workspace_name: &str) -> Self {
        WorkspaceLabels(BTreeMap::from([(
            WORKSPACE_LABEL_KEY.to_string(),
            workspace_name.to_string(),
        )]))
    }

    /// Adds the managed-by label to the set.
    pub fn with_managed_by(mut self) -> Self {
        self.0
            .insert(MANAGED_BY_KEY.to_string(), MANAGED_BY_VAL.to_string());
        self
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn managed_by() {
        let labels = WorkspaceLabels::new("foo").with_managed_by().get();
        assert_eq!(labels.get(MANAGED_BY_KEY), Some(&MANAGED_BY_VAL.to_string()));
        assert_eq!(labels.get(WORKSPACE_LABEL_KEY), Some(&"foo".to_string()));
    }

    #[test]
    fn extra_labels() {
        let labels = WorkspaceLabels::new("foo").with("a", "b");
        assert_eq!(labels.get().get("a"), Some(&"b".to_string()));
        assert_eq!(labels.get().len(), 2);
    }
}
