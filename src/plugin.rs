//! Plugin specs, attachment descriptors and plugin directory discovery.
//!
//! A plugin contributes one node type plus a list of attachment descriptors
//! naming the parents it should appear under:
//!
//! - `class:<TypeName>` attaches under every node whose type name is `TypeName`
//! - `name:<NodeName>` attaches under the node whose name is `NodeName`
//!
//! Plugins found on disk are JSON manifests named `menu_*.json`:
//!
//! ```json
//! {
//!     "type_name": "ImagesMenu",
//!     "name": "images_menu",
//!     "summary": "Image utilities",
//!     "commands": [{ "name": "list", "doc": "List images", "output": "no images" }],
//!     "parents": ["class:HomeMenu", "name:tests_menu"]
//! }
//! ```

use crate::command::Command;
use crate::error::{Result, ShellError};
use crate::node::{MenuNode, NodeType};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

static DESCRIPTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(class|name):\s*(\S(?:.*\S)?)\s*$").expect("descriptor pattern is valid")
});

/// Parsed attachment descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Class(String),
    Name(String),
}

impl Attachment {
    pub fn matches(&self, node: &MenuNode) -> bool {
        match self {
            Attachment::Class(type_name) => node.type_name() == type_name,
            Attachment::Name(name) => node.name() == name,
        }
    }
}

impl FromStr for Attachment {
    type Err = String;

    fn from_str(descriptor: &str) -> std::result::Result<Self, Self::Err> {
        let caps = DESCRIPTOR.captures(descriptor.trim()).ok_or_else(|| {
            format!("malformed attachment '{descriptor}', expected 'class:<TypeName>' or 'name:<NodeName>'")
        })?;
        let target = caps[2].to_string();
        Ok(match &caps[1] {
            "class" => Attachment::Class(target),
            _ => Attachment::Name(target),
        })
    }
}

/// A node type together with the parents it attaches to.
#[derive(Debug, Clone)]
pub struct PluginSpec {
    pub node_type: NodeType,
    pub attachments: Vec<String>,
}

impl PluginSpec {
    pub fn new<I, S>(node_type: NodeType, attachments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            node_type,
            attachments: attachments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse every descriptor, failing on the first malformed one.
    pub fn validate(&self) -> Result<Vec<Attachment>> {
        self.attachments
            .iter()
            .map(|d| {
                d.parse().map_err(|reason| ShellError::PluginLoad {
                    plugin: self.node_type.type_name().to_string(),
                    reason,
                })
            })
            .collect()
    }
}

/// On-disk plugin manifest.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub intro: Option<String>,
    #[serde(default)]
    pub commands: Vec<ManifestCommand>,
    #[serde(default)]
    pub children: Vec<String>,
    pub parents: Vec<String>,
}

/// A manifest command prints fixed text through the pager.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestCommand {
    pub name: String,
    #[serde(default)]
    pub doc: String,
    pub output: String,
}

impl PluginManifest {
    pub fn into_spec(self) -> PluginSpec {
        let mut node_type = NodeType::new(self.type_name, self.name);
        if let Some(summary) = self.summary {
            node_type = node_type.summary(summary);
        }
        if let Some(description) = self.description {
            node_type = node_type.description(description);
        }
        if let Some(intro) = self.intro {
            node_type = node_type.intro(intro);
        }
        for child in self.children {
            node_type = node_type.child(child);
        }
        for cmd in self.commands {
            let output = cmd.output;
            node_type = node_type.command(Command::new(cmd.name, cmd.doc, move |ctx, _| {
                ctx.print(&output)
            }));
        }
        PluginSpec::new(node_type, self.parents)
    }
}

/// Whether `path` follows the `menu_*.json` naming convention.
pub fn is_plugin_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with("menu_") && name.ends_with(".json") && path.is_file()
}

/// Read one manifest file into a [`PluginSpec`].
pub fn read_manifest(path: &Path) -> Result<PluginSpec> {
    let plugin_err = |reason: String| ShellError::PluginLoad {
        plugin: path.display().to_string(),
        reason,
    };
    let data = fs::read_to_string(path).map_err(|e| plugin_err(e.to_string()))?;
    let manifest: PluginManifest =
        serde_json::from_str(&data).map_err(|e| plugin_err(format!("invalid manifest: {e}")))?;
    Ok(manifest.into_spec())
}

/// Scan `dir` for plugin manifests, in file-name order.
///
/// Each entry is either a spec or the error that made that file unusable;
/// a bad file never hides the others.
pub fn discover(dir: &Path) -> Result<Vec<Result<PluginSpec>>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_plugin_file(p))
        .collect();
    paths.sort();
    tracing::debug!(dir = %dir.display(), found = paths.len(), "scanned plugin directory");
    Ok(paths.iter().map(|p| read_manifest(p)).collect())
}
