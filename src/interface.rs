use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use crate::error::{TemplateError, TemplateResult};
use crate::value::Value;

/// The name to value mapping expressions and templates are evaluated
/// against.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Context {
    data: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<N: AsRef<str>, V: Into<Value>>(&mut self, name: N, value: V) -> &mut Self {
        self.data.insert(name.as_ref().to_string(), value.into());
        self
    }

    pub fn get<N: AsRef<str>>(&self, name: N) -> Option<&Value> {
        self.data.get(name.as_ref())
    }

    pub fn contains<N: AsRef<str>>(&self, name: N) -> bool {
        self.data.contains_key(name.as_ref())
    }

    /// Returns a copy of this context with `name` bound to `value`.
    pub fn with_overlay<N: AsRef<str>, V: Into<Value>>(&self, name: N, value: V) -> Self {
        let mut overlay = self.clone();
        overlay.insert(name, value);
        overlay
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<N: Into<String>, V: Into<Value>> FromIterator<(N, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            data: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// `TemplateLoader` is the seam through which `{% include %}` and
/// `Engine::render` fetch template source by name.
///
/// Implementations must be shareable between threads, since a single engine
/// may serve many renders at once.
pub trait TemplateLoader: Send + Sync {
    /// `load` returns the raw source of the named template, or `None` when
    /// no such template exists.
    ///
    /// # Errors
    /// - If the template exists but could not be read.
    fn load(&self, name: &str) -> TemplateResult<Option<String>>;
}

/// Holds templates in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named template.
    ///
    /// # Errors
    /// - If a template with the same name was already added.
    pub fn add<N: AsRef<str>, C: Into<String>>(&mut self, name: N, content: C) -> TemplateResult<()> {
        let name = name.as_ref();

        if self.templates.contains_key(name) {
            return Err(TemplateError::TemplateExists {
                template_name: name.to_string(),
            });
        }

        self.templates.insert(name.to_string(), content.into());
        Ok(())
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, name: &str) -> TemplateResult<Option<String>> {
        Ok(self.templates.get(name).cloned())
    }
}

/// Reads templates from files below a root directory.
///
/// Names are relative paths. Absolute names and names that climb out of the
/// root with `..` are treated as missing.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for component in Path::new(name).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(path)
    }
}

impl TemplateLoader for FileSystemLoader {
    fn load(&self, name: &str) -> TemplateResult<Option<String>> {
        let Some(path) = self.resolve(name) else {
            return Ok(None);
        };

        if !path.is_file() {
            return Ok(None);
        }

        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| TemplateError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }
}
