//! Project file discovery.
//!
//! Walks a project root and classifies every entry into a
//! [`DiscoveryEvent`]. Ignored directories are pruned before descent, entries
//! are visited in file-name order within each directory, and unreadable
//! subtrees are reported as events instead of aborting the walk.
//!
//! The walk is lazy: [`Discovery::walk`] returns an iterator that can be
//! consumed incrementally and restarted by calling `walk` again.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::config::ProjectConfig;
use crate::models::{CandidateFile, DiscoveryIssue};

/// Names that are never worth reviewing, applied on top of configured patterns.
const DEFAULT_IGNORES: &[&str] = &[".git", "node_modules", "target"];

/// Classification of one walked entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A file that passed every filter.
    Candidate(CandidateFile),
    /// A regular file whose extension is not in the analyzable set.
    Unsupported { path: String },
    /// A file larger than `max_file_size`.
    TooLarge { path: String, size: u64 },
    /// An entry or directory that could not be read.
    Error(DiscoveryIssue),
}

/// Running counts over a stream of [`DiscoveryEvent`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub total_files: u64,
    pub analyzable_files: u64,
    pub too_large: u64,
    pub errors: Vec<DiscoveryIssue>,
}

impl DiscoveryStats {
    pub fn record(&mut self, event: &DiscoveryEvent) {
        match event {
            DiscoveryEvent::Candidate(_) => {
                self.total_files += 1;
                self.analyzable_files += 1;
            }
            DiscoveryEvent::Unsupported { .. } => self.total_files += 1,
            DiscoveryEvent::TooLarge { .. } => {
                self.total_files += 1;
                self.too_large += 1;
            }
            DiscoveryEvent::Error(issue) => self.errors.push(issue.clone()),
        }
    }
}

/// A configured, reusable project walker.
#[derive(Debug, Clone)]
pub struct Discovery {
    root: PathBuf,
    ignore: GlobSet,
    extensions: HashSet<String>,
    max_file_size: u64,
    follow_symlinks: bool,
}

impl Discovery {
    /// Build a walker for `root`.
    ///
    /// `extensions` overrides `project.extensions` when given. Fails if the
    /// root is not a directory or an ignore pattern is not a valid glob.
    pub fn new(root: &Path, project: &ProjectConfig, extensions: Option<&[String]>) -> Result<Self> {
        if !root.is_dir() {
            bail!("Project root is not a directory: {}", root.display());
        }

        let mut patterns: Vec<String> = DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect();
        patterns.extend(project.ignore.iter().cloned());
        let ignore = build_globset(&patterns)?;

        let extensions = extensions
            .unwrap_or(&project.extensions)
            .iter()
            .map(|e| e.trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty())
            .collect::<HashSet<_>>();
        if extensions.is_empty() {
            bail!("No analyzable extensions configured");
        }

        Ok(Self {
            root: root.to_path_buf(),
            ignore,
            extensions,
            max_file_size: project.max_file_size,
            follow_symlinks: project.follow_symlinks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree from the start. Each call yields the same sequence for
    /// an unchanged tree.
    pub fn walk(&self) -> impl Iterator<Item = DiscoveryEvent> + '_ {
        WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_ignored(entry))
            .filter_map(move |entry| match entry {
                Ok(entry) => self.classify(&entry),
                Err(err) => {
                    let path = err
                        .path()
                        .map(|p| self.relative(p))
                        .unwrap_or_else(|| ".".to_string());
                    Some(DiscoveryEvent::Error(DiscoveryIssue {
                        path,
                        message: err.to_string(),
                    }))
                }
            })
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if self.ignore.is_match(name.as_ref()) {
            return true;
        }
        self.ignore.is_match(self.relative(entry.path()))
    }

    fn classify(&self, entry: &DirEntry) -> Option<DiscoveryEvent> {
        if !entry.file_type().is_file() {
            return None;
        }

        let relative_path = self.relative(entry.path());

        let supported = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(e))
            .unwrap_or(false);
        if !supported {
            return Some(DiscoveryEvent::Unsupported {
                path: relative_path,
            });
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(err) => {
                return Some(DiscoveryEvent::Error(DiscoveryIssue {
                    path: relative_path,
                    message: err.to_string(),
                }))
            }
        };

        if size > self.max_file_size {
            return Some(DiscoveryEvent::TooLarge {
                path: relative_path,
                size,
            });
        }

        Some(DiscoveryEvent::Candidate(CandidateFile {
            absolute_path: entry.path().to_path_buf(),
            relative_path,
            size,
        }))
    }

    /// Root-relative path joined with `/` regardless of platform.
    fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
