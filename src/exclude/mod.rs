//! Exclusion patterns for the pack walk.
//!
//! Two pattern forms, decided by the presence of a path separator:
//!
//! - `node_modules`, `*.png` — matched against the final path segment only,
//!   with an exact-string fallback when the pattern carries no glob
//!   metacharacters.
//! - `docs/drafts/*`, `target/debug` — matched against the whole relative
//!   path.
//!
//! Patterns are evaluated in order; the first match excludes.  `*` never
//! crosses a `/`.  The built-in list is a constant: a user-supplied list
//! replaces it entirely, nothing is ever merged into it.

use globset::{GlobBuilder, GlobMatcher};

/// Built-in exclusions: VCS and IDE directories, dependency caches, OS
/// metadata, and extensions that are binary regardless of content.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git", ".svn", ".hg", ".idea", ".vscode", "node_modules", ".venv", ".DS_Store",
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.ico",
    "*.pdf", "*.zip", "*.tar", "*.gz", "*.xz", "*.7z", "*.rar", "*.jar", "*.war",
    "*.class", "*.so", "*.dll", "*.dylib", "*.bin", "*.exe",
];

/// An ordered, pre-compiled exclusion pattern set.
pub struct ExcludeSet {
    rules: Vec<Rule>,
}

struct Rule {
    raw: String,
    whole_path: bool,
    glob: Option<GlobMatcher>,
}

impl ExcludeSet {
    /// The built-in default set.
    pub fn defaults() -> Self {
        Self::new(DEFAULT_EXCLUDES.iter().map(|p| (*p).to_owned()))
    }

    /// Compile an ordered pattern list.  A pattern that fails to compile as
    /// a glob degrades to exact basename matching rather than failing the
    /// run.
    pub fn new<I>(patterns: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let rules = patterns
            .into_iter()
            .filter_map(|pat| {
                let pat = pat.trim().to_owned();
                if pat.is_empty() {
                    return None;
                }
                let glob = GlobBuilder::new(&pat)
                    .literal_separator(true)
                    .build()
                    .ok()
                    .map(|g| g.compile_matcher());
                Some(Rule {
                    whole_path: pat.contains('/'),
                    glob,
                    raw: pat,
                })
            })
            .collect();
        Self { rules }
    }

    /// Parse a comma-separated pattern list; blanks are dropped.
    pub fn from_csv(csv: &str) -> Self {
        Self::new(
            csv.split(',')
                .map(|p| p.trim().to_owned())
                .filter(|p| !p.is_empty()),
        )
    }

    /// First matching pattern wins.  `rel` is slash-separated, relative.
    pub fn is_excluded(&self, rel: &str) -> bool {
        let base = rel.rsplit('/').next().unwrap_or(rel);
        self.rules.iter().any(|r| r.matches(rel, base))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Rule {
    fn matches(&self, rel: &str, base: &str) -> bool {
        if self.whole_path {
            return self.glob.as_ref().is_some_and(|g| g.is_match(rel));
        }
        if let Some(glob) = &self.glob {
            if glob.is_match(base) {
                return true;
            }
        }
        !has_glob_meta(&self.raw) && base == self.raw
    }
}

fn has_glob_meta(pat: &str) -> bool {
    pat.contains(['*', '?', '[', ']'])
}
