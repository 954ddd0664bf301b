//! Template resolvers.

use std::collections::HashMap;
use std::path::PathBuf;

use log::{debug, trace};

/// Resolves a template name to `(source, filename)`.
pub trait Loader {
    fn get_source(&self, name: &str) -> Option<(String, String)>;
}

/// An in-memory loader backed by a `name -> source` map, used by tests and
/// single-file `--stdin` invocations where there is nothing on disk to
/// resolve.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        MemoryLoader::default()
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.templates.insert(name.into(), source.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }
}

impl Loader for MemoryLoader {
    fn get_source(&self, name: &str) -> Option<(String, String)> {
        let found = self.templates.get(name).cloned();
        trace!("memory loader: lookup `{name}` -> {}", if found.is_some() { "hit" } else { "miss" });
        found.map(|src| (src, name.to_string()))
    }
}

/// A filesystem-backed loader resolving template names relative to a root
/// directory, used by the CLI when a `path` argument is given.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsLoader { root: root.into() }
    }
}

impl Loader for FsLoader {
    fn get_source(&self, name: &str) -> Option<(String, String)> {
        let path = self.root.join(name);
        match std::fs::read_to_string(&path) {
            Ok(source) => {
                debug!("fs loader: loaded `{}` ({} bytes)", path.display(), source.len());
                Some((source, path.to_string_lossy().into_owned()))
            }
            Err(err) => {
                trace!("fs loader: `{}` not found: {err}", path.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_loader_resolves_registered_templates() {
        let loader = MemoryLoader::new().with("base.html", "Hello");
        assert_eq!(
            loader.get_source("base.html"),
            Some(("Hello".to_string(), "base.html".to_string()))
        );
        assert_eq!(loader.get_source("missing.html"), None);
    }
}
