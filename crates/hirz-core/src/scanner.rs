//! Folder scanning with exclusion rules

use globset::{GlobBuilder, GlobMatcher};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
enum Matcher {
    Glob(GlobMatcher),
    /// Fallback for patterns that are not valid globs
    Literal(String),
}

impl Matcher {
    fn compile(pattern: &str) -> Self {
        let built = GlobBuilder::new(&escape_braces(pattern))
            .literal_separator(true)
            .backslash_escape(false)
            .build();
        match built {
            Ok(glob) => Matcher::Glob(glob.compile_matcher()),
            Err(e) => {
                tracing::warn!("Invalid exclusion pattern '{}' ({}), matching literally", pattern, e);
                Matcher::Literal(pattern.to_string())
            }
        }
    }

    fn is_match(&self, name: &str) -> bool {
        match self {
            Matcher::Glob(glob) => glob.is_match(name),
            Matcher::Literal(literal) => literal == name,
        }
    }
}

/// Turn `{` and `}` outside character classes into single-character
/// classes, so they match themselves instead of starting an alternation.
fn escape_braces(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut class_len: Option<usize> = None;

    for c in pattern.chars() {
        match class_len {
            Some(len) => {
                // `]` right after `[` or `[!` is a member, not the end
                let first = len == 0 || (len == 1 && out.ends_with('!'));
                class_len = if c == ']' && !first { None } else { Some(len + 1) };
                out.push(c);
            }
            None => match c {
                '[' => {
                    class_len = Some(0);
                    out.push(c);
                }
                '{' | '}' => {
                    out.push('[');
                    out.push(c);
                    out.push(']');
                }
                _ => out.push(c),
            },
        }
    }
    out
}

/// Compiled exclusion patterns.
///
/// Patterns use shell glob syntax (`*`, `?`, `[seq]`, `[!seq]`) and are
/// case-sensitive. Braces are ordinary characters. A pattern that does not compile is matched literally.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    matchers: Vec<Matcher>,
}

impl ExclusionSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let matchers = patterns
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| !p.is_empty())
            .map(Matcher::compile)
            .collect();
        Self { matchers }
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// True if any pattern matches this single name
    pub fn matches_name(&self, name: &str) -> bool {
        self.matchers.iter().any(|m| m.is_match(name))
    }

    /// True if any pattern matches any segment of `relative` or its file name
    pub fn matches_path(&self, relative: &Path) -> bool {
        let segment_hit = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy()),
                _ => None,
            })
            .any(|name| self.matches_name(&name));
        if segment_hit {
            return true;
        }
        relative
            .file_name()
            .map(|name| self.matches_name(&name.to_string_lossy()))
            .unwrap_or(false)
    }
}

/// Convert a relative path to the `/`-separated form stored in archives
pub fn to_archive_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Walks backup roots and yields every file that survives the exclusions
#[derive(Debug, Clone)]
pub struct FileScanner {
    base: PathBuf,
}

impl FileScanner {
    /// Create a scanner whose relative paths are computed against `base`
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Recursively list all regular files under `roots`.
    ///
    /// Roots that are not directories are skipped. Files outside the base
    /// directory count as excluded. Results follow traversal order and are
    /// not deduplicated across overlapping roots.
    pub fn scan(&self, roots: &[PathBuf], exclusions: &ExclusionSet) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for root in roots {
            if !root.is_dir() {
                tracing::debug!("Skipping backup root that is not a directory: {}", root.display());
                continue;
            }

            for entry in WalkDir::new(root) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::debug!("Skipping unreadable entry: {}", e);
                        continue;
                    }
                };

                // Symlinks count when they point at a regular file
                let is_file = entry.file_type().is_file()
                    || (entry.path_is_symlink() && entry.path().is_file());
                if !is_file {
                    continue;
                }

                if !self.is_excluded(entry.path(), exclusions) {
                    files.push(entry.into_path());
                }
            }
        }

        tracing::debug!("Scanned {} roots, {} files kept", roots.len(), files.len());
        files
    }

    /// Check a single absolute file path against the exclusions
    pub fn is_excluded(&self, file: &Path, exclusions: &ExclusionSet) -> bool {
        match file.strip_prefix(&self.base) {
            Ok(relative) => exclusions.matches_path(relative),
            Err(_) => true,
        }
    }

    /// Relative archive path for a file under the base, if it is under it
    pub fn relative_path(&self, file: &Path) -> Option<String> {
        file.strip_prefix(&self.base).ok().map(to_archive_path)
    }
}
