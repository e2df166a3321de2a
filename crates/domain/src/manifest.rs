//! Declarative manifest shapes: the core manifest and plugin manifests.
//!
//! Both shapes are deserialized from YAML by the `yaml_ops` adapter; this
//! module only defines the data, not the parsing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A component name, unique within a manifest. Plugin-contributed
/// components are namespaced by plugin identifier at resolution time (see
/// `guardrails-resolver`), not here.
pub type ComponentName = String;

/// A plugin identifier, unique among enabled plugins.
pub type PluginId = String;

/// `on_error` policy for an installation phase step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    Fail,
    Skip,
    Warn,
}

/// A single named step within an installation phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default = "default_on_error")]
    pub on_error: OnError,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn default_on_error() -> OnError {
    OnError::Fail
}

/// The four installation phases a plugin may declare steps for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phases {
    #[serde(default)]
    pub pre_install: Vec<Step>,
    #[serde(default)]
    pub install: Vec<Step>,
    #[serde(default)]
    pub post_install: Vec<Step>,
    #[serde(default)]
    pub verify: Vec<Step>,
}

impl Phases {
    pub fn is_empty(&self) -> bool {
        self.pre_install.is_empty() && self.install.is_empty() && self.post_install.is_empty() && self.verify.is_empty()
    }
}

/// A typed user prompt surfaced to the shell; the core records it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptType {
    Boolean { default: Option<bool> },
    String { default: Option<String> },
    Enum { choices: Vec<String>, default: Option<String> },
    Int { default: Option<i64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    #[serde(flatten)]
    pub kind: PromptType,
    #[serde(default)]
    pub description: Option<String>,
}

/// Plugin-declared configuration surface: prompts, environment variables,
/// and their defaults. Consumed verbatim by the shell; also the source of
/// whitelisted variable names for `yaml_ops::template`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub prompts: Vec<Prompt>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

/// Merge strategy admissible for a structure-schema path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MergeStrategy {
    Union,
    Override,
    Strict,
    Interactive,
}

/// One entry of a plugin's (or the core's) structure schema: a path the
/// plugin provides, requires to pre-exist, or conflicts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureEntry {
    pub path: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub merge_strategy: Option<MergeStrategy>,
    #[serde(default)]
    pub description: Option<String>,
}

/// The structure schema a plugin (or core) manifest may declare.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureSchema {
    #[serde(default)]
    pub provides: Vec<StructureEntry>,
    #[serde(default)]
    pub requires: Vec<StructureEntry>,
    #[serde(default)]
    pub conflicts: Vec<StructureEntry>,
}

/// Optional `validation.command` attached to a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub command: String,
}

/// A named, atomically-installed set of files with declared dependencies
/// and post-install actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: ComponentName,
    /// Source-path glob patterns, rooted at the manifest's template base.
    pub files: Vec<String>,
    #[serde(default)]
    pub target_prefix: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<ComponentName>,
    #[serde(default)]
    pub install_order: u8,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub post_install: Vec<String>,
    #[serde(default)]
    pub validation: Option<Validation>,
}

/// A named, ordered set of components — the usual entry point for planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub components: Vec<ComponentName>,
}

/// Mapping from plugin identifier to the payload root it contributes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginRef {
    pub id: PluginId,
    pub path: String,
}

/// The core manifest: components, profiles, and enabled plugins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreManifest {
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub plugins: Vec<PluginRef>,
}

/// A plugin manifest: same component/profile shape as the core manifest,
/// plus a structure schema, installation phases, and configuration surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub structure: Option<StructureSchema>,
    #[serde(default)]
    pub phases: Option<Phases>,
    #[serde(default)]
    pub configuration: Option<Configuration>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn core_manifest_round_trips_through_yaml() {
        let manifest = CoreManifest {
            components: vec![Component {
                name: "core".into(),
                files: vec![".ai/guardrails.yaml".into()],
                target_prefix: None,
                dependencies: vec![],
                install_order: 0,
                required: true,
                post_install: vec![],
                validation: None,
            }],
            profiles: vec![Profile {
                name: "minimal".into(),
                components: vec!["core".into()],
            }],
            plugins: vec![],
        };

        let text = serde_yaml::to_string(&manifest).unwrap();
        let parsed: CoreManifest = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn prompt_type_is_tagged_by_kind() {
        let yaml = "name: enable_hooks\ntype: boolean\ndefault: true\n";
        let prompt: Prompt = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(prompt.kind, PromptType::Boolean { default: Some(true) }));
    }
}
