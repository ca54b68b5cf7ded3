use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::context::Context;
use crate::error::{LoquatError, LoquatResult};
use crate::template::Template;

/// Source of template text for `include` and `extends`.
pub trait FileSystem: Send + Sync + fmt::Debug {
    fn read_template_file(&self, context: &Context, template_name: &str) -> LoquatResult<String>;

    /// A template parsed ahead of time, used as is instead of reading and
    /// parsing its source.
    fn parsed_template(&self, _context: &Context, _template_name: &str) -> Option<Arc<Template>> {
        None
    }
}

/// Refuses every read. The default, so templates cannot reach the disk
/// unless the host opts in.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankFileSystem;

impl FileSystem for BlankFileSystem {
    fn read_template_file(&self, _: &Context, _: &str) -> LoquatResult<String> {
        Err(LoquatError::file_system(
            "This liquid context does not allow includes.",
        ))
    }
}

static TEMPLATE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^./][a-zA-Z0-9_/]+$").expect("valid regex"));

/// Reads partials from a directory. `{% include 'shop/item' %}` loads
/// `<root>/shop/_item.liquid`.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a template name onto the file that backs it.
    pub fn full_path(&self, template_name: &str) -> LoquatResult<PathBuf> {
        if !TEMPLATE_NAME.is_match(template_name) {
            return Err(LoquatError::file_system(format!(
                "Illegal template name '{template_name}'"
            )));
        }

        let (directory, file) = template_name
            .rsplit_once('/')
            .map_or(("", template_name), |(directory, file)| (directory, file));

        let mut path = self.root.clone();
        if !directory.is_empty() {
            path.push(directory);
        }
        path.push(format!("_{file}.liquid"));

        if path.starts_with(&self.root) {
            Ok(path)
        } else {
            Err(LoquatError::file_system(format!(
                "Illegal template path '{}'",
                path.display()
            )))
        }
    }
}

impl FileSystem for LocalFileSystem {
    fn read_template_file(&self, _: &Context, template_name: &str) -> LoquatResult<String> {
        let path = self.full_path(template_name)?;
        tracing::debug!(path = %path.display(), "reading template file");
        std::fs::read_to_string(&path).map_err(|error| {
            LoquatError::file_system(format!("Template '{template_name}' not found: {error}"))
        })
    }
}

/// Template sources held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    templates: HashMap<String, String>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_template_file(&self, _: &Context, template_name: &str) -> LoquatResult<String> {
        self.templates
            .get(template_name)
            .cloned()
            .ok_or_else(|| LoquatError::MissingTemplate {
                template_name: template_name.to_string(),
            })
    }
}
