//! Include/exclude filtering for sync operations.
//!
//! Patterns are shell-style wildcards (`*` any run of characters, `?` one
//! character) matched against the whole relative path. A pattern without a
//! `/` also matches the bare file name. A leading `!` negates the pattern.

use globset::{GlobBuilder, GlobMatcher};
use std::path::Path;

use crate::error::Result;

/// One compiled wildcard pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    matcher: GlobMatcher,
    negated: bool,
    name_only: bool,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let (negated, body) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        let body = body.replace('\\', "/");

        let matcher = GlobBuilder::new(&body)
            .literal_separator(false)
            .build()?
            .compile_matcher();

        Ok(Self {
            raw: pattern.to_string(),
            name_only: !body.contains('/'),
            matcher,
            negated,
        })
    }

    /// Check a `/`-separated relative path against this pattern.
    pub fn is_match(&self, path: &str) -> bool {
        let mut matched = self.matcher.is_match(path);
        if !matched && self.name_only {
            if let Some(name) = path.rsplit('/').next() {
                matched = self.matcher.is_match(name);
            }
        }
        matched != self.negated
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Include/exclude policy applied to every relative path of a run.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PathFilter {
    /// A filter that lets everything through.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_patterns<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Excludes are checked first; when includes exist one of them must match.
    pub fn should_include(&self, relative: &Path) -> bool {
        let path = to_slash(relative);

        if self.exclude.iter().any(|p| p.is_match(&path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.is_match(&path))
    }

    pub fn include_patterns(&self) -> impl Iterator<Item = &str> {
        self.include.iter().map(Pattern::as_str)
    }

    pub fn exclude_patterns(&self) -> impl Iterator<Item = &str> {
        self.exclude.iter().map(Pattern::as_str)
    }
}

/// One-shot form of `PathFilter::should_include`.
pub fn should_include<S: AsRef<str>>(path: &Path, include: &[S], exclude: &[S]) -> Result<bool> {
    Ok(PathFilter::from_patterns(include, exclude)?.should_include(path))
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .map(Pattern::new)
        .collect()
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
