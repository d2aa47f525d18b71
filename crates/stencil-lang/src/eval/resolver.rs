use std::{borrow::Cow, fmt::Debug};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

use crate::{Shared, ast::Template};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("Template `{0}` not found")]
    NotFound(Cow<'static, str>),
    #[error("IO error: {0}")]
    IOError(Cow<'static, str>),
    #[error("Invalid template `{0}`: {1}")]
    Invalid(Cow<'static, str>, String),
}

/// Supplies the templates named by `Include` and `Import`.
pub trait TemplateResolver: Debug + Send + Sync {
    /// `current` is the name of the template doing the including.
    fn resolve(&self, name: &str, current: &str) -> Result<Shared<Template>, LoadError>;
}

/// Name of `name` as seen from `current`: absolute names start with `/`,
/// others are relative to the directory of `current`.
pub fn resolve_name(name: &str, current: &str) -> String {
    let joined = match name.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => match current.rsplit_once('/') {
            Some((dir, _)) => format!("{dir}/{name}"),
            None => name.to_string(),
        },
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    segments.join("/")
}

/// Templates registered up front, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    templates: FxHashMap<SmolStr, Shared<Template>>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, template: Template) {
        self.templates
            .insert(template.name.clone(), Shared::new(template));
    }

    pub fn with(mut self, template: Template) -> Self {
        self.insert(template);
        self
    }
}

impl TemplateResolver for MapResolver {
    fn resolve(&self, name: &str, current: &str) -> Result<Shared<Template>, LoadError> {
        let resolved = resolve_name(name, current);
        self.templates
            .get(resolved.as_str())
            .or_else(|| self.templates.get(name))
            .cloned()
            .ok_or(LoadError::NotFound(Cow::Owned(resolved)))
    }
}

#[cfg(feature = "file-io")]
pub use file::FileResolver;

#[cfg(feature = "file-io")]
mod file {
    use std::{
        borrow::Cow,
        fs,
        path::{Path, PathBuf},
        sync::RwLock,
    };

    use rustc_hash::FxHashMap;
    use smol_str::SmolStr;

    use super::{LoadError, TemplateResolver, resolve_name};
    use crate::{Shared, ast::Template};

    const DEFAULT_PATHS: [&str; 2] = ["$ORIGIN/templates", "$ORIGIN"];

    /// Loads JSON-serialized trees from a list of directories. Loaded trees
    /// are cached for the lifetime of the resolver.
    #[derive(Debug, Default)]
    pub struct FileResolver {
        paths: Option<Vec<PathBuf>>,
        cache: RwLock<FxHashMap<SmolStr, Shared<Template>>>,
    }

    impl FileResolver {
        pub fn new(paths: Option<Vec<PathBuf>>) -> Self {
            Self {
                paths,
                cache: RwLock::default(),
            }
        }

        pub fn search_paths(&self) -> Vec<PathBuf> {
            self.paths
                .clone()
                .unwrap_or_else(|| DEFAULT_PATHS.iter().map(PathBuf::from).collect())
        }

        pub fn set_search_paths(&mut self, paths: Vec<PathBuf>) {
            self.paths = if paths.is_empty() { None } else { Some(paths) };
        }

        fn search(&self, name: &str) -> Result<PathBuf, LoadError> {
            let origin = std::env::current_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let file_name = if Path::new(name).extension().is_some() {
                name.to_string()
            } else {
                format!("{name}.json")
            };

            self.search_paths()
                .iter()
                .map(|path| {
                    PathBuf::from(path.to_string_lossy().replace("$ORIGIN", &origin))
                        .join(&file_name)
                })
                .find(|path| path.is_file())
                .ok_or_else(|| LoadError::NotFound(Cow::Owned(file_name)))
        }
    }

    impl TemplateResolver for FileResolver {
        fn resolve(&self, name: &str, current: &str) -> Result<Shared<Template>, LoadError> {
            let resolved = SmolStr::new(resolve_name(name, current));

            if let Some(template) = self
                .cache
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(&resolved)
            {
                return Ok(Shared::clone(template));
            }

            let path = self.search(&resolved)?;
            let json = fs::read_to_string(&path)
                .map_err(|e| LoadError::IOError(Cow::Owned(e.to_string())))?;
            let mut template = Template::from_json(&json)
                .map_err(|e| LoadError::Invalid(Cow::Owned(resolved.to_string()), e.to_string()))?;
            if template.name.is_empty() {
                template.name = resolved.clone();
            }
            tracing::debug!(template = %resolved, path = %path.display(), "template loaded");

            let template = Shared::new(template);
            self.cache
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(resolved, Shared::clone(&template));
            Ok(template)
        }
    }

}
