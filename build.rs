// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Arguments shared by `init` and `scan`
fn workspace_args() -> Vec<Arg> {
    vec![
        Arg::new("path").required(true).help("Workspace directory"),
        Arg::new("lang")
            .long("lang")
            .value_name("LANG")
            .help("Ecosystem for a root without manifests (python, node, java, go, ruby)"),
        Arg::new("config")
            .long("config")
            .value_name("FILE")
            .help("Configuration file (default: <path>/envforge.toml, then the user config)"),
        Arg::new("offline")
            .long("offline")
            .action(ArgAction::SetTrue)
            .help("Skip registry version lookups"),
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print JSON instead of text"),
    ]
}

fn build_cli() -> Command {
    Command::new("envforge")
        .version(env!("CARGO_PKG_VERSION"))
        .author("envforge Contributors")
        .about("Infer a project's dependencies and validate them in a disposable sandbox")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Increase log verbosity (-v info, -vv debug)"),
        )
        .subcommand(
            Command::new("init")
                .about("Resolve and validate the dependencies of every project in a workspace")
                .args(workspace_args())
                .arg(
                    Arg::new("preview")
                        .long("preview")
                        .action(ArgAction::SetTrue)
                        .help("Show what would be written without writing anything"),
                )
                .arg(
                    Arg::new("auto_apply")
                        .long("auto-apply")
                        .action(ArgAction::SetTrue)
                        .help("Write files without asking for confirmation"),
                )
                .arg(
                    Arg::new("docker")
                        .long("docker")
                        .action(ArgAction::SetTrue)
                        .help("Also generate a multi-stage Dockerfile at the workspace root"),
                )
                .arg(
                    Arg::new("retry_budget")
                        .long("retry-budget")
                        .value_name("N")
                        .help("Maximum resolve/validate attempts per project"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("SECS")
                        .help("Install step timeout in seconds"),
                )
                .arg(
                    Arg::new("threshold")
                        .long("threshold")
                        .value_name("T")
                        .help("Confidence below which packages are tentative (0.0-1.0)"),
                )
                .arg(
                    Arg::new("report")
                        .long("report")
                        .value_name("FILE")
                        .help("Write the JSON report to this file"),
                ),
        )
        .subcommand(
            Command::new("scan")
                .about("Show evidence and candidate packages without resolving")
                .args(workspace_args()),
        )
        .after_help(
            "Exit status: 0 when every project was accepted cleanly, 2 when an accepted \
             project has tentative, auto-fixed or dropped optional packages, 1 on failure.",
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("envforge.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
