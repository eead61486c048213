use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{Gate, Plugin, PluginLocation};

/// Plugin directory name, both at the town root and inside each rig.
pub const PLUGINS_DIR: &str = "plugins";
/// File defining a plugin inside its directory.
pub const PLUGIN_FILE: &str = "plugin.md";

const FENCE: &str = "+++";

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed plugin {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    gate: Option<Gate>,
}

/// Discovers plugins under the town root and the configured rigs.
///
/// A plugin is a directory containing `plugin.md`: an optional TOML front
/// matter block fenced by `+++` lines, then the instructions.
#[derive(Debug, Clone)]
pub struct Scanner {
    town_root: PathBuf,
    rigs: Vec<String>,
}

impl Scanner {
    pub fn new(town_root: &Path, rigs: &[String]) -> Self {
        let mut rigs = rigs.to_vec();
        rigs.sort();
        rigs.dedup();
        Self {
            town_root: town_root.to_path_buf(),
            rigs,
        }
    }

    /// Every plugin, town-level first, then each rig in name order.
    ///
    /// A town plugin shadows a rig plugin with the same name. Plugins that
    /// fail to parse are skipped with a warning.
    pub fn discover_all(&self) -> Result<Vec<Plugin>, ScanError> {
        let mut plugins = scan_dir(&self.town_root.join(PLUGINS_DIR), &PluginLocation::Town)?;
        let mut seen: HashSet<String> = plugins.iter().map(|p| p.name.clone()).collect();

        for rig in &self.rigs {
            let dir = self.town_root.join(rig).join(PLUGINS_DIR);
            for plugin in scan_dir(&dir, &PluginLocation::Rig(rig.clone()))? {
                if seen.insert(plugin.name.clone()) {
                    plugins.push(plugin);
                } else {
                    tracing::debug!(
                        plugin = %plugin.name,
                        %rig,
                        "plugin shadowed by an earlier definition"
                    );
                }
            }
        }
        Ok(plugins)
    }
}

fn scan_dir(dir: &Path, location: &PluginLocation) -> Result<Vec<Plugin>, ScanError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ScanError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut plugin_dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.join(PLUGIN_FILE).is_file())
        .collect();
    plugin_dirs.sort();

    let mut plugins = Vec::with_capacity(plugin_dirs.len());
    for plugin_dir in plugin_dirs {
        match load_plugin(&plugin_dir, location) {
            Ok(plugin) => plugins.push(plugin),
            Err(e) => tracing::warn!("skipping plugin: {e}"),
        }
    }
    Ok(plugins)
}

fn load_plugin(dir: &Path, location: &PluginLocation) -> Result<Plugin, ScanError> {
    let path = dir.join(PLUGIN_FILE);
    let content = fs::read_to_string(&path).map_err(|source| ScanError::Io {
        path: path.clone(),
        source,
    })?;
    let (front, body) = split_front_matter(&content).map_err(|reason| ScanError::Malformed {
        path: path.clone(),
        reason,
    })?;

    let meta: FrontMatter = match front {
        Some(toml_src) => toml::from_str(toml_src).map_err(|e| ScanError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })?,
        None => FrontMatter::default(),
    };

    let name = meta
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .or_else(|| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .ok_or_else(|| ScanError::Malformed {
            path: path.clone(),
            reason: "plugin has no name".to_string(),
        })?;

    Ok(Plugin {
        name,
        description: meta.description.unwrap_or_default(),
        instructions: body.trim().to_string(),
        gate: meta.gate,
        location: location.clone(),
        path,
    })
}

/// Split `+++`-fenced front matter from the body. No opening fence means no
/// front matter; an opening fence without a closing one is an error.
fn split_front_matter(content: &str) -> Result<(Option<&str>, &str), String> {
    let trimmed = content.trim_start_matches('\u{feff}');
    let Some(after_open) = trimmed
        .strip_prefix(FENCE)
        .and_then(|rest| rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")))
    else {
        return Ok((None, trimmed));
    };

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            let front = &after_open[..offset];
            let body = &after_open[offset + line.len()..];
            return Ok((Some(front), body));
        }
        offset += line.len();
    }
    Err("front matter is missing its closing +++".to_string())
}
