use std::env;
use std::process::Command;

/// Explicit overrides first, then the local checkout.
const COMMIT_SOURCES: [&str; 2] = ["GIT_COMMIT_HASH", "GITHUB_SHA"];

fn from_env() -> Option<String> {
    COMMIT_SOURCES.iter().find_map(|key| {
        env::var(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn from_git() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

fn main() {
    for key in COMMIT_SOURCES {
        println!("cargo:rerun-if-env-changed={key}");
    }
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    if let Some(sha) = from_env().or_else(from_git) {
        println!("cargo:rustc-env=GIT_COMMIT_HASH={sha}");
    }
}
