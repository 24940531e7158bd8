//! Compiler configuration loaded from `oneview.json`.

use crate::CompileOptions;
use crate::error::CompileError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory
pub const CONFIG_FILE: &str = "oneview.json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Root the view paths are derived from
    pub views_input: PathBuf,
    /// Where compiled modules are written
    pub output_dir: PathBuf,
    /// Template file extension, with the leading dot
    pub extension: String,
    pub default_scope: String,
    pub strict: bool,
    pub verbose: bool,
    pub runtime_namespace: String,
    pub attr_prefix: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            views_input: PathBuf::from("resources/views"),
            output_dir: PathBuf::from("resources/js/app/views"),
            extension: ".blade.php".to_string(),
            default_scope: "web".to_string(),
            strict: true,
            verbose: false,
            runtime_namespace: "App.View".to_string(),
            attr_prefix: "data-".to_string(),
        }
    }
}

impl CompilerConfig {
    /// Load an explicit config file, or `oneview.json` when present, or the defaults
    pub fn load(path: Option<&Path>) -> Result<Self, CompileError> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(CONFIG_FILE).is_file() => Self::from_file(Path::new(CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, CompileError> {
        let text = fs::read_to_string(path).map_err(|source| CompileError::Io { path: path.display().to_string(), source })?;
        Self::from_json(&text).map_err(|e| CompileError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            strict: self.strict,
            runtime_namespace: self.runtime_namespace.clone(),
            attr_prefix: self.attr_prefix.clone(),
        }
    }

    /// True when `path` names a template file
    pub fn is_template(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(&self.extension) && n.len() > self.extension.len())
    }

    /// Dotted view path of a template: `web/user-detail.blade.php` becomes `web.user-detail`.
    ///
    /// Paths outside `views_input` are taken relative to `base`, the directory being compiled.
    /// A view directly under the root lands in `default_scope`.
    pub fn view_path(&self, file: &Path, base: &Path) -> String {
        let relative = file
            .strip_prefix(&self.views_input)
            .or_else(|_| file.strip_prefix(base))
            .unwrap_or(file);

        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .map(str::to_string)
            .collect();

        let joined = parts.join(".");
        let view = joined.strip_suffix(&self.extension).unwrap_or(&joined);
        // Top-level views live in the default scope
        if parts.len() == 1 && !self.default_scope.is_empty() {
            format!("{}.{}", self.default_scope, view)
        } else {
            view.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.extension, ".blade.php");
        assert!(config.strict);
        assert_eq!(config.compile_options().runtime_namespace, "App.View");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = CompilerConfig::from_json(r#"{"strict": false, "output_dir": "dist"}"#).unwrap();
        assert!(!config.strict);
        assert_eq!(config.output_dir, PathBuf::from("dist"));
        assert_eq!(config.views_input, PathBuf::from("resources/views"));
    }

    #[test]
    fn test_view_path() {
        let config = CompilerConfig::default();
        let file = Path::new("resources/views/web/user-detail.blade.php");
        assert_eq!(config.view_path(file, Path::new(".")), "web.user-detail");

        let file = Path::new("templates/layouts/base.blade.php");
        assert_eq!(config.view_path(file, Path::new("templates")), "layouts.base");

        let file = Path::new("resources/views/home.blade.php");
        assert_eq!(config.view_path(file, Path::new(".")), "web.home");
    }

    #[test]
    fn test_is_template() {
        let config = CompilerConfig::default();
        assert!(config.is_template(Path::new("a/home.blade.php")));
        assert!(!config.is_template(Path::new("a/home.php")));
        assert!(!config.is_template(Path::new(".blade.php")));
    }
}
