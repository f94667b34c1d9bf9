//! File-backed templates with `{{ key }}` placeholders.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{TemplateError, TemplateRenderer};

/// Templates loaded from disk once, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct FileTemplates {
    templates: HashMap<String, String>,
}

impl FileTemplates {
    /// Load every file matching `pattern` (`<dir>/<glob>`, one `*` at most).
    pub fn load(pattern: &str) -> Result<Self, TemplateError> {
        let (dir, glob) = match pattern.rsplit_once('/') {
            Some(("", glob)) => (Path::new("/"), glob),
            Some((dir, glob)) => (Path::new(dir), glob),
            None => (Path::new("."), pattern),
        };
        let glob = FileGlob::parse(glob)
            .ok_or_else(|| TemplateError::InvalidPattern(pattern.to_string()))?;

        let io_err = |source: std::io::Error| TemplateError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut templates = HashMap::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !entry.file_type().map_err(io_err)?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !glob.matches(&name) {
                continue;
            }

            let path: PathBuf = entry.path();
            let content = fs::read_to_string(&path)
                .map_err(|source| TemplateError::Io { path, source })?;
            templates.insert(name, content);
        }

        if templates.is_empty() {
            return Err(TemplateError::NoMatches(pattern.to_string()));
        }

        tracing::info!(pattern, count = templates.len(), "Templates loaded");
        Ok(Self { templates })
    }

    /// Build from in-memory sources.
    pub fn from_sources<I, N, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        Self {
            templates: sources
                .into_iter()
                .map(|(n, s)| (n.into(), s.into()))
                .collect(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

impl TemplateRenderer for FileTemplates {
    fn render(&self, name: &str, data: &Value) -> Result<String, TemplateError> {
        let source = self
            .templates
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        Ok(substitute(source, data))
    }
}

/// A file-name glob with at most one `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileGlob {
    Exact(String),
    Wildcard { prefix: String, suffix: String },
}

impl FileGlob {
    fn parse(glob: &str) -> Option<Self> {
        match glob.split_once('*') {
            None if glob.is_empty() => None,
            None => Some(FileGlob::Exact(glob.to_string())),
            Some((_, rest)) if rest.contains('*') => None,
            Some((prefix, suffix)) => Some(FileGlob::Wildcard {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            }),
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            FileGlob::Exact(exact) => name == exact,
            FileGlob::Wildcard { prefix, suffix } => {
                name.len() >= prefix.len() + suffix.len()
                    && name.starts_with(prefix.as_str())
                    && name.ends_with(suffix.as_str())
            }
        }
    }
}

/// Replace `{{ key }}` / `{{ .key }}` with HTML-escaped values from `data`.
fn substitute(source: &str, data: &Value) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..open]);

        let key = rest[open + 2..open + 2 + close].trim().trim_start_matches('.');
        match data.get(key) {
            Some(Value::String(s)) => escape_html(s, &mut out),
            Some(Value::Null) | None => {}
            Some(other) => escape_html(&other.to_string(), &mut out),
        }

        rest = &rest[open + 2 + close + 2..];
    }

    out.push_str(rest);
    out
}

fn escape_html(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}
