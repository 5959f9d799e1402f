//! The workspace request the engine deploys. Field names follow the workspace resource
//! (camelCase) so requests can be read straight from YAML or JSON.
//!
use serde::Deserialize;

/// Node count used when the request does not set one.
pub const DEFAULT_NODE_COUNT: i32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub name: String,
    pub namespace: String,
    /// Set for workspaces read from the cluster; generated workloads are then owned by it.
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub resource: ResourceSpec,
    #[serde(default)]
    pub inference: InferenceSpec,
    #[serde(default)]
    pub status: WorkspaceStatus,
}

impl Workspace {
    pub fn node_count(&self) -> i32 {
        self.resource.count.unwrap_or(DEFAULT_NODE_COUNT)
    }

    pub fn preset_name(&self) -> Option<&str> {
        self.inference.preset.as_ref().map(|p| p.name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(default)]
    pub count: Option<i32>,
    #[serde(default)]
    pub instance_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceSpec {
    #[serde(default)]
    pub preset: Option<PresetSpec>,
    #[serde(default)]
    pub adapters: Vec<AdapterSpec>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ModelImageAccessMode {
    #[default]
    #[serde(rename = "public")]
    Public,
    #[serde(rename = "private")]
    Private,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetSpec {
    pub name: String,
    #[serde(default)]
    pub access_mode: ModelImageAccessMode,
    #[serde(default)]
    pub preset_options: PresetOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetOptions {
    /// Image used when the access mode is private.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_pull_secrets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSpec {
    #[serde(default)]
    pub source: AdapterSource,
    #[serde(default)]
    pub strength: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSource {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_pull_secrets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    #[serde(default)]
    pub worker_nodes: Vec<String>,
}
