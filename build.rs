use std::process::Command;

use chrono::Utc;

/// Embeds the commit and build time reported by `/health/version`.
fn main() {
    let commit = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={commit}");
    println!("cargo:rustc-env=BUILD_TIME={}", Utc::now().format("%Y-%m-%dT%H:%M:%SZ"));
    println!("cargo:rerun-if-changed=.git/HEAD");
}
