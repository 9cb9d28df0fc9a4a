// src/evidence/imports.rs

//! Import statement scanning
//!
//! Line-oriented pattern matching, not parsing: good enough to notice which
//! third-party packages a project touches. Standard-library modules,
//! relative imports and the project's own modules are ignored, and Python
//! import names are mapped to their distribution names where they differ.

use super::EvidenceSource;
use crate::claim::{DependencyClaim, PackageIdentity, SourceKind};
use crate::ecosystem::Ecosystem;
use crate::error::{Error, Result};
use crate::workspace::{Project, is_scannable};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;
use walkdir::WalkDir;

/// Confidence of a package seen in an import statement
pub const IMPORT_CONFIDENCE: f64 = 0.8;

static PY_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*import\s+([A-Za-z_][\w.]*(?:\s+as\s+\w+)?(?:\s*,\s*[A-Za-z_][\w.]*(?:\s+as\s+\w+)?)*)")
        .expect("valid regex")
});
static PY_FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*from\s+([A-Za-z_][\w.]*)\s+import\b").expect("valid regex"));

static JS_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:\bimport\s+(?:[\w*{}\s,$]+\s+from\s+)?|\bexport\s+[\w*{}\s,$]+\s+from\s+|\brequire\s*\(\s*|\bimport\s*\(\s*)["']([^"'\s]+)["']"#)
        .expect("valid regex")
});

static GO_SINGLE_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*import\s+(?:[\w.]+\s+)?"([^"]+)""#).expect("valid regex"));
static GO_BLOCK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*(?:[\w.]+\s+)?"([^"]+)""#).expect("valid regex"));
static GO_MODULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*module\s+(\S+)").expect("valid regex"));

static RB_REQUIRE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*require\s*\(?\s*["']([^"']+)["']"#).expect("valid regex"));

/// Import names whose distribution is named differently
static PY_DISTRIBUTIONS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("sklearn", "scikit-learn"),
        ("skimage", "scikit-image"),
        ("cv2", "opencv-python"),
        ("yaml", "PyYAML"),
        ("PIL", "Pillow"),
        ("bs4", "beautifulsoup4"),
        ("dateutil", "python-dateutil"),
        ("dotenv", "python-dotenv"),
        ("jwt", "PyJWT"),
        ("Crypto", "pycryptodome"),
        ("OpenSSL", "pyOpenSSL"),
        ("google.protobuf", "protobuf"),
        ("attr", "attrs"),
        ("magic", "python-magic"),
        ("serial", "pyserial"),
        ("usb", "pyusb"),
        ("zmq", "pyzmq"),
        ("MySQLdb", "mysqlclient"),
        ("psycopg2", "psycopg2-binary"),
    ])
});

const PY_STDLIB: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "atexit", "base64", "bisect",
    "builtins", "bz2", "calendar", "cmath", "cmd", "codecs", "collections", "colorsys",
    "concurrent", "configparser", "contextlib", "contextvars", "copy", "copyreg", "cProfile",
    "csv", "ctypes", "curses", "dataclasses", "datetime", "dbm", "decimal", "difflib", "dis",
    "doctest", "email", "encodings", "enum", "errno", "faulthandler", "fcntl", "filecmp",
    "fileinput", "fnmatch", "fractions", "ftplib", "functools", "gc", "getopt", "getpass",
    "gettext", "glob", "graphlib", "grp", "gzip", "hashlib", "heapq", "hmac", "html", "http",
    "imaplib", "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword",
    "linecache", "locale", "logging", "lzma", "mailbox", "marshal", "math", "mimetypes", "mmap",
    "multiprocessing", "netrc", "numbers", "operator", "optparse", "os", "pathlib", "pdb",
    "pickle", "pkgutil", "platform", "plistlib", "poplib", "posix", "pprint", "profile",
    "pstats", "pty", "pwd", "queue", "quopri", "random", "re", "readline", "reprlib",
    "resource", "rlcompleter", "runpy", "sched", "secrets", "select", "selectors", "shelve",
    "shlex", "shutil", "signal", "site", "smtplib", "socket", "socketserver", "sqlite3", "ssl",
    "stat", "statistics", "string", "stringprep", "struct", "subprocess", "sys", "sysconfig",
    "syslog", "tarfile", "tempfile", "termios", "textwrap", "threading", "time", "timeit",
    "tkinter", "token", "tokenize", "tomllib", "trace", "traceback", "tracemalloc", "tty",
    "turtle", "types", "typing", "unicodedata", "unittest", "urllib", "uuid", "venv",
    "warnings", "wave", "weakref", "webbrowser", "winreg", "wsgiref", "xml", "xmlrpc",
    "zipapp", "zipfile", "zipimport", "zlib", "zoneinfo",
];

const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http", "http2",
    "https", "inspector", "module", "net", "os", "path", "perf_hooks", "process", "punycode",
    "querystring", "readline", "repl", "stream", "string_decoder", "sys", "timers", "tls",
    "trace_events", "tty", "url", "util", "v8", "vm", "wasi", "worker_threads", "zlib",
];

const RUBY_STDLIB: &[&str] = &[
    "abbrev", "base64", "benchmark", "bigdecimal", "cgi", "csv", "date", "delegate", "digest",
    "English", "erb", "etc", "fileutils", "find", "forwardable", "io", "ipaddr", "json",
    "logger", "monitor", "net", "objspace", "observer", "open-uri", "open3", "openssl",
    "optparse", "ostruct", "pathname", "pp", "prettyprint", "pstore", "psych", "racc",
    "rbconfig", "resolv", "ripper", "securerandom", "set", "shellwords", "singleton", "socket",
    "stringio", "strscan", "syslog", "tempfile", "time", "timeout", "tmpdir", "tsort", "un",
    "uri", "weakref", "yaml", "zlib",
];

/// Require names that differ from the gem name
const RUBY_GEMS: &[(&str, &str)] = &[
    ("active_record", "activerecord"),
    ("active_support", "activesupport"),
    ("action_controller", "actionpack"),
    ("action_view", "actionview"),
    ("action_mailer", "actionmailer"),
    ("active_job", "activejob"),
];

/// Distribution name for an imported module, `None` for the standard library
fn python_package(module: &str) -> Option<String> {
    let top = module.split('.').next()?;
    if PY_STDLIB.contains(&top) {
        return None;
    }
    // Namespace packages map on their two-level name
    let two_level = module.splitn(3, '.').take(2).collect::<Vec<_>>().join(".");
    let dist = PY_DISTRIBUTIONS
        .get(two_level.as_str())
        .or_else(|| PY_DISTRIBUTIONS.get(top))
        .copied()
        .unwrap_or(top);
    Some(dist.to_string())
}

fn node_package(specifier: &str) -> Option<String> {
    if specifier.starts_with('.') || specifier.starts_with('/') || specifier.starts_with("node:") {
        return None;
    }
    let mut parts = specifier.split('/');
    let first = parts.next()?;
    let name = if first.starts_with('@') {
        format!("{}/{}", first, parts.next()?)
    } else {
        first.to_string()
    };
    if NODE_BUILTINS.contains(&name.as_str()) || name.contains(':') {
        return None;
    }
    Some(name)
}

/// Module path owning an import path
fn go_module(import: &str, own_module: Option<&str>) -> Option<String> {
    if own_module.is_some_and(|own| import == own || import.starts_with(&format!("{}/", own))) {
        return None;
    }
    let segments: Vec<&str> = import.split('/').collect();
    // Standard library paths have no dot in the first element
    if !segments[0].contains('.') {
        return None;
    }
    let keep = match segments[0] {
        "github.com" | "gitlab.com" | "bitbucket.org" => 3,
        "golang.org" | "google.golang.org" if segments.get(1) == Some(&"x") => 3,
        "gopkg.in" => 2,
        _ => segments.len(),
    };
    Some(segments[..keep.min(segments.len())].join("/"))
}

fn ruby_gem(feature: &str) -> Option<String> {
    let top = feature.split('/').next()?;
    if RUBY_STDLIB.contains(&top) {
        return None;
    }
    let gem = RUBY_GEMS.iter().find(|(req, _)| *req == top).map_or(top, |(_, gem)| *gem);
    Some(gem.to_string())
}

/// Top-level modules defined by the project itself
fn local_python_modules(root: &Path) -> BTreeSet<String> {
    let Ok(entries) = fs::read_dir(root) else {
        return BTreeSet::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let path = e.path();
            if path.is_dir() {
                path.file_name().map(|n| n.to_string_lossy().into_owned())
            } else if path.extension().is_some_and(|x| x == "py") {
                path.file_stem().map(|n| n.to_string_lossy().into_owned())
            } else {
                None
            }
        })
        .collect()
}

/// Packages imported by one Python source file
fn scan_python(content: &str) -> Vec<String> {
    let mut modules = Vec::new();
    for line in content.lines() {
        if let Some(caps) = PY_FROM_RE.captures(line) {
            modules.push(caps[1].to_string());
        } else if let Some(caps) = PY_IMPORT_RE.captures(line) {
            for part in caps[1].split(',') {
                if let Some(module) = part.split_whitespace().next() {
                    modules.push(module.to_string());
                }
            }
        }
    }
    modules
}

fn scan_javascript(content: &str) -> Vec<String> {
    JS_IMPORT_RE
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn scan_go(content: &str) -> Vec<String> {
    let mut imports = Vec::new();
    let mut in_block = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if in_block {
            if trimmed.starts_with(')') {
                in_block = false;
            } else if let Some(caps) = GO_BLOCK_LINE_RE.captures(line) {
                imports.push(caps[1].to_string());
            }
        } else if trimmed.starts_with("import (") || trimmed == "import(" {
            in_block = true;
        } else if let Some(caps) = GO_SINGLE_IMPORT_RE.captures(line) {
            imports.push(caps[1].to_string());
        }
    }
    imports
}

fn scan_ruby(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| RB_REQUIRE_RE.captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Import-statement evidence source
pub struct ImportScanner {
    max_depth: usize,
}

impl ImportScanner {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Package names imported under a project, with the first file each
    /// was seen in
    pub fn imported_packages(&self, project: &Project) -> Result<Vec<(String, String)>> {
        let ecosystem = project.ecosystem;
        if ecosystem == Ecosystem::JavaMaven {
            return Err(Error::EvidenceFailed {
                source_name: self.name().to_string(),
                reason: "import scanning is not supported for java".to_string(),
            });
        }

        let local_modules = match ecosystem {
            Ecosystem::PythonPip => local_python_modules(&project.root),
            _ => BTreeSet::new(),
        };
        let own_go_module = match ecosystem {
            Ecosystem::GoModules => fs::read_to_string(project.root.join("go.mod"))
                .ok()
                .and_then(|c| GO_MODULE_RE.captures(&c).map(|caps| caps[1].to_string())),
            _ => None,
        };

        let extensions = ecosystem.source_extensions();
        let walker = WalkDir::new(&project.root)
            .max_depth(self.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| is_scannable(e) && !project.nested.iter().any(|n| n == e.path()));

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut found = Vec::new();
        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file()
                || !path.extension().and_then(|x| x.to_str()).is_some_and(|x| extensions.contains(&x))
            {
                continue;
            }
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            let packages: Vec<String> = match ecosystem {
                Ecosystem::PythonPip => scan_python(&content)
                    .iter()
                    .filter(|m| !local_modules.contains(m.split('.').next().unwrap_or_default()))
                    .filter_map(|m| python_package(m))
                    .collect(),
                Ecosystem::NodeNpm => scan_javascript(&content).iter().filter_map(|s| node_package(s)).collect(),
                Ecosystem::GoModules => scan_go(&content)
                    .iter()
                    .filter_map(|i| go_module(i, own_go_module.as_deref()))
                    .collect(),
                Ecosystem::RubyGems => scan_ruby(&content).iter().filter_map(|f| ruby_gem(f)).collect(),
                Ecosystem::JavaMaven => Vec::new(),
            };

            let relative = path.strip_prefix(&project.root).unwrap_or(path).display().to_string();
            for package in packages {
                let key = ecosystem.normalize_name(&package);
                if seen.insert(key) {
                    found.push((package, relative.clone()));
                }
            }
        }
        Ok(found)
    }
}

impl EvidenceSource for ImportScanner {
    fn name(&self) -> &str {
        "import-scan"
    }

    fn scan(&self, project: &Project, _prior: &[DependencyClaim]) -> Result<Vec<DependencyClaim>> {
        Ok(self
            .imported_packages(project)?
            .into_iter()
            .map(|(package, file)| {
                DependencyClaim::new(
                    PackageIdentity::new(project.ecosystem, &package),
                    SourceKind::ImportScan,
                    IMPORT_CONFIDENCE,
                    format!("imported in {}", file),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn names(project: &Project) -> Vec<String> {
        ImportScanner::new(8)
            .imported_packages(project)
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    #[test]
    fn test_python_imports() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "app.py",
            "import os, sys\nimport numpy as np, pandas\nfrom sklearn.linear_model import Ridge\n\
             from . import sibling\nfrom helpers import thing\nfrom google.protobuf import message\n\
             import cv2\n",
        );
        write(dir.path(), "helpers.py", "import yaml\n");
        write(dir.path(), "venv/lib/site.py", "import should_not_appear\n");

        let project = Project::new(dir.path(), "", Ecosystem::PythonPip);
        assert_eq!(
            names(&project),
            vec!["numpy", "pandas", "scikit-learn", "protobuf", "opencv-python", "PyYAML"]
        );
    }

    #[test]
    fn test_javascript_imports() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "src/index.ts",
            "import React from 'react';\nimport { render } from \"react-dom/client\";\n\
             const fs = require('fs');\nimport './styles.css';\nimport type { X } from '@types/node';\n\
             const lazy = import('lodash/merge');\nimport path from 'node:path';\n",
        );

        let project = Project::new(dir.path(), "", Ecosystem::NodeNpm);
        assert_eq!(names(&project), vec!["react", "react-dom", "@types/node", "lodash"]);
    }

    #[test]
    fn test_go_imports() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "go.mod", "module example.com/app\n\ngo 1.22\n");
        write(
            dir.path(),
            "main.go",
            "package main\n\nimport (\n\t\"fmt\"\n\tcobra \"github.com/spf13/cobra/doc\"\n\t\"example.com/app/internal\"\n\t\"golang.org/x/sync/errgroup\"\n)\n\nimport \"gopkg.in/yaml.v3\"\n",
        );

        let project = Project::new(dir.path(), "", Ecosystem::GoModules);
        assert_eq!(
            names(&project),
            vec!["github.com/spf13/cobra", "golang.org/x/sync", "gopkg.in/yaml.v3"]
        );
    }

    #[test]
    fn test_ruby_requires() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "app.rb",
            "require 'json'\nrequire \"sinatra/base\"\nrequire_relative 'lib/thing'\nrequire 'active_record'\n",
        );

        let project = Project::new(dir.path(), "", Ecosystem::RubyGems);
        assert_eq!(names(&project), vec!["sinatra", "activerecord"]);
    }

    #[test]
    fn test_java_unsupported() {
        let dir = TempDir::new().unwrap();
        let project = Project::new(dir.path(), "", Ecosystem::JavaMaven);
        let err = ImportScanner::new(8).scan(&project, &[]).unwrap_err();
        assert!(matches!(err, Error::EvidenceFailed { .. }));
    }

    #[test]
    fn test_nested_projects_excluded() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.js", "require('express');\n");
        write(dir.path(), "packages/ui/index.js", "require('vue');\n");

        let mut project = Project::new(dir.path(), "", Ecosystem::NodeNpm);
        project.nested.push(dir.path().join("packages/ui"));
        assert_eq!(names(&project), vec!["express"]);
    }
}
