//! Event filtering applied by the poll loop.

use std::path::Path;

use super::event::ChangeKind;

/// Filter rules for raw file system events.
///
/// Rules are applied in order: dot-files, extension allow-list, then
/// subdirectories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub ignore_dot_files: bool,
    pub ignore_subdirectories: bool,
    /// Lower-case extensions without the leading dot. Empty means everything.
    extensions: Vec<String>,
}

impl EventFilter {
    pub fn new(
        ignore_dot_files: bool,
        ignore_subdirectories: bool,
        extensions: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        let mut filter = Self {
            ignore_dot_files,
            ignore_subdirectories,
            extensions: Vec::new(),
        };
        filter.set_extensions(extensions);
        filter
    }

    /// Replace the extension allow-list. Entries are case-insensitive and may
    /// carry a leading dot.
    pub fn set_extensions(&mut self, extensions: impl IntoIterator<Item = impl AsRef<str>>) {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self.extensions.sort();
        self.extensions.dedup();
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Decide whether an event should be reported.
    ///
    /// A deleted entry can no longer be stat'ed, so it is taken to have been a
    /// directory iff its name has no `.` in it. A deleted subdirectory named
    /// `v1.2` is therefore still reported when subdirectories are ignored.
    pub fn accepts(&self, kind: ChangeKind, path: &Path) -> bool {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => return false,
        };

        if self.ignore_dot_files && name.starts_with('.') {
            return false;
        }

        if !self.extensions.is_empty() {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase());
            match ext {
                Some(ext) if self.extensions.iter().any(|allowed| *allowed == ext) => {}
                _ => return false,
            }
        }

        if self.ignore_subdirectories {
            let is_dir = match kind {
                ChangeKind::Delete => !name.contains('.'),
                _ => path.is_dir(),
            };
            if is_dir {
                return false;
            }
        }

        true
    }
}
