//! File classification: which files are of interest, and in which category.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;

/// A tracked category such as `doc` or `data`.
///
/// Tags are persisted verbatim, so they are restricted to ASCII
/// alphanumerics, `-`, `_` and `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category(String);

impl Category {
    pub fn new(tag: impl Into<String>) -> Option<Self> {
        let tag = tag.into();
        let valid = !tag.is_empty()
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        valid.then_some(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides whether a file is of interest. Supplied by the cache's owner.
pub trait FileClassifier: Send + Sync {
    fn classify(&self, path: &Path) -> Option<Category>;
}

impl<F> FileClassifier for F
where
    F: Fn(&Path) -> Option<Category> + Send + Sync,
{
    fn classify(&self, path: &Path) -> Option<Category> {
        self(path)
    }
}

/// Classifies files by extension, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ExtensionClassifier {
    by_extension: IndexMap<String, Category>,
}

impl ExtensionClassifier {
    /// Build from `tag -> extensions`. Invalid tags are skipped; the first
    /// category to claim an extension wins.
    pub fn new<'a>(categories: impl IntoIterator<Item = (&'a String, &'a Vec<String>)>) -> Self {
        let mut by_extension = IndexMap::new();
        for (tag, extensions) in categories {
            let Some(category) = Category::new(tag.as_str()) else {
                tracing::warn!("[classify] ignoring invalid category tag '{tag}'");
                continue;
            };
            for ext in extensions {
                let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
                if !ext.is_empty() {
                    by_extension.entry(ext).or_insert_with(|| category.clone());
                }
            }
        }
        Self { by_extension }
    }

    pub fn from_settings(settings: &crate::Settings) -> Self {
        Self::new(&settings.categories)
    }

    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self.by_extension.values().cloned().collect();
        categories.sort();
        categories.dedup();
        categories
    }
}

impl FileClassifier for ExtensionClassifier {
    fn classify(&self, path: &Path) -> Option<Category> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.by_extension.get(&ext).cloned()
    }
}
