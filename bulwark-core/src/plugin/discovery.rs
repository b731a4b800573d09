use std::{
    fmt,
    path::{Path, PathBuf},
};

use futures::{StreamExt, stream};
use glob::Pattern;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::{
    error::{Result, ScanError},
    plugin::{PluginHost, PluginSet},
};

const DESCRIBE_PARALLELISM: usize = 8;

/// Finds plugin executables below a root directory.
#[derive(Clone)]
pub struct PluginDiscovery {
    root: PathBuf,
    pattern: Option<Pattern>,
}

impl fmt::Debug for PluginDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDiscovery")
            .field("root", &self.root)
            .field("pattern", &self.pattern.as_ref().map(Pattern::as_str))
            .finish()
    }
}

impl PluginDiscovery {
    pub fn new(root: impl Into<PathBuf>, glob: Option<&str>) -> Result<Self> {
        let pattern = glob
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| {
                Pattern::new(raw).map_err(|err| {
                    ScanError::Discovery(format!("invalid glob {raw:?}: {err}"))
                })
            })
            .transpose()?;
        Ok(Self {
            root: root.into(),
            pattern,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Executable files under the root that pass the glob filter.
    pub fn candidates(&self) -> Result<Vec<PathBuf>> {
        std::fs::metadata(&self.root).map_err(|err| {
            ScanError::Discovery(format!(
                "cannot read plugin directory {}: {err}",
                self.root.display()
            ))
        })?;
        let own_binary = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.canonicalize().ok());

        let mut found = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(target: "bulwark::plugin", error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_executable(&entry) {
                continue;
            }
            if !self.matches(&entry) {
                continue;
            }
            if own_binary.is_some()
                && entry.path().canonicalize().ok() == own_binary
            {
                continue;
            }
            found.push(entry.into_path());
        }
        Ok(found)
    }

    /// Describes every candidate through `host`. Candidates that do not
    /// answer with a valid manifest are skipped.
    pub async fn discover(&self, host: &dyn PluginHost) -> Result<PluginSet> {
        let discovery = self.clone();
        let candidates = tokio::task::spawn_blocking(move || discovery.candidates())
            .await
            .map_err(|err| ScanError::Internal(format!("discovery task failed: {err}")))??;

        let described = stream::iter(candidates)
            .map(|path| async move {
                let result = host.describe(&path).await;
                (path, result)
            })
            .buffered(DESCRIBE_PARALLELISM)
            .collect::<Vec<_>>()
            .await;

        let mut descriptors = Vec::new();
        for (path, result) in described {
            match result {
                Ok(descriptor) => {
                    info!(
                        target: "bulwark::plugin",
                        plugin = %descriptor.name,
                        path = %path.display(),
                        "discovered plugin"
                    );
                    descriptors.push(descriptor);
                }
                Err(err) => {
                    debug!(
                        target: "bulwark::plugin",
                        path = %path.display(),
                        error = %err,
                        "not a plugin"
                    );
                }
            }
        }
        Ok(PluginSet::new(descriptors))
    }

    fn matches(&self, entry: &DirEntry) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };
        let name_matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| pattern.matches(name));
        let relative_matches = entry
            .path()
            .strip_prefix(&self.root)
            .is_ok_and(|rel| pattern.matches_path(rel));
        name_matches || relative_matches
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

#[cfg(unix)]
fn is_executable(entry: &DirEntry) -> bool {
    use std::os::unix::fs::PermissionsExt;
    entry
        .metadata()
        .is_ok_and(|meta| meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_entry: &DirEntry) -> bool {
    true
}
