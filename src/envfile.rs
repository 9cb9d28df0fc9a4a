// src/envfile.rs

//! Environment variable template
//!
//! Source files are scanned for reads of environment variables
//! (`os.getenv("X")`, `process.env.X`, `os.Getenv("X")`, `ENV["X"]`,
//! `System.getenv("X")`) and the names found become a `.env.example` with
//! an empty value each. The real `.env` is never written: it holds secrets.

use crate::ecosystem::Ecosystem;
use crate::manifest::ManifestFile;
use crate::workspace::{Project, is_scannable};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::sync::LazyLock;
use tracing::debug;
use walkdir::WalkDir;

/// Name of the generated template
pub const ENV_TEMPLATE_NAME: &str = ".env.example";

static PY_ENV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bos\.(?:getenv|environ\.get)\(\s*["']([A-Za-z_][A-Za-z0-9_]*)["']|\bos\.environ\[\s*["']([A-Za-z_][A-Za-z0-9_]*)["']\s*\]"#)
        .expect("valid regex")
});
static JS_ENV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bprocess\.env\.([A-Za-z_][A-Za-z0-9_]*)|\bprocess\.env\[\s*["'`]([A-Za-z_][A-Za-z0-9_]*)["'`]\s*\]"#)
        .expect("valid regex")
});
static GO_ENV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bos\.(?:Getenv|LookupEnv)\(\s*"([A-Za-z_][A-Za-z0-9_]*)""#).expect("valid regex")
});
static RB_ENV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bENV(?:\.fetch\(\s*|\[\s*)["']([A-Za-z_][A-Za-z0-9_]*)["']"#).expect("valid regex")
});
static JAVA_ENV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bSystem\.getenv\(\s*"([A-Za-z_][A-Za-z0-9_]*)""#).expect("valid regex")
});

fn pattern(ecosystem: Ecosystem) -> &'static Regex {
    match ecosystem {
        Ecosystem::PythonPip => &PY_ENV_RE,
        Ecosystem::NodeNpm => &JS_ENV_RE,
        Ecosystem::GoModules => &GO_ENV_RE,
        Ecosystem::RubyGems => &RB_ENV_RE,
        Ecosystem::JavaMaven => &JAVA_ENV_RE,
    }
}

/// Variable names read by one source file
pub fn env_reads(ecosystem: Ecosystem, content: &str) -> BTreeSet<String> {
    pattern(ecosystem)
        .captures_iter(content)
        .filter_map(|caps| caps.iter().skip(1).flatten().next())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Variable names read anywhere in a project's sources
pub fn scan(project: &Project, max_depth: usize) -> BTreeSet<String> {
    let extensions = project.ecosystem.source_extensions();
    let walker = WalkDir::new(&project.root)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| is_scannable(e) && !project.nested.iter().any(|n| n == e.path()));

    let mut names = BTreeSet::new();
    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file()
            || !path.extension().and_then(|x| x.to_str()).is_some_and(|x| extensions.contains(&x))
        {
            continue;
        }
        match fs::read_to_string(path) {
            Ok(content) => names.extend(env_reads(project.ecosystem, &content)),
            Err(e) => debug!("Skipping {}: {}", path.display(), e),
        }
    }
    names
}

/// `.env.example` listing the variables, `None` when there are none
pub fn render(names: &BTreeSet<String>) -> Option<ManifestFile> {
    if names.is_empty() {
        return None;
    }
    let mut contents = String::from("# Environment variables read by this project\n");
    for name in names {
        contents.push_str(name);
        contents.push_str("=\n");
    }
    Some(ManifestFile::new(ENV_TEMPLATE_NAME, contents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(ecosystem: Ecosystem, content: &str) -> Vec<String> {
        env_reads(ecosystem, content).into_iter().collect()
    }

    #[test]
    fn test_reads_per_language() {
        assert_eq!(
            names(
                Ecosystem::PythonPip,
                "key = os.getenv('API_KEY')\nurl = os.environ[\"DATABASE_URL\"]\nx = os.environ.get('DEBUG', '0')\n"
            ),
            vec!["API_KEY", "DATABASE_URL", "DEBUG"]
        );
        assert_eq!(
            names(Ecosystem::NodeNpm, "const p = process.env.PORT || 3000;\nprocess.env['NODE_ENV']"),
            vec!["NODE_ENV", "PORT"]
        );
        assert_eq!(
            names(Ecosystem::GoModules, "v := os.Getenv(\"REDIS_ADDR\")\n_, ok := os.LookupEnv(\"TRACE\")"),
            vec!["REDIS_ADDR", "TRACE"]
        );
        assert_eq!(
            names(Ecosystem::RubyGems, "ENV['SECRET_KEY_BASE']\nENV.fetch(\"RAILS_ENV\", \"dev\")"),
            vec!["RAILS_ENV", "SECRET_KEY_BASE"]
        );
        assert_eq!(names(Ecosystem::JavaMaven, "System.getenv(\"JDBC_URL\")"), vec!["JDBC_URL"]);
        // Dynamic names cannot be listed
        assert!(names(Ecosystem::PythonPip, "os.getenv(name)").is_empty());
    }

    #[test]
    fn test_scan_and_render() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.py"), "import os\nTOKEN = os.getenv('API_TOKEN')\n").unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/db.py"), "os.environ['DATABASE_URL']\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "os.getenv('NOT_CODE')\n").unwrap();

        let project = Project::new(dir.path(), "", Ecosystem::PythonPip);
        let found = scan(&project, 8);
        let file = render(&found).unwrap();
        assert_eq!(file.file_name(), ENV_TEMPLATE_NAME);
        assert_eq!(
            file.contents,
            "# Environment variables read by this project\nAPI_TOKEN=\nDATABASE_URL=\n"
        );
        assert!(render(&BTreeSet::new()).is_none());
    }
}
