// Build script to inject version information from git tags
//
// Falls back to the package version when git is unavailable or the tree
// carries no tags.

use std::process::Command;

fn main() {
    let version = git_version().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=LEAKWATCH_VERSION={}", version);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
    println!("cargo:rerun-if-changed=.git/refs/tags");
}

/// "v0.2.0" -> "0.2.0", "v0.2.0-5-gabc123" -> "0.2.0", "abc123-dirty" -> "0.1.0-abc123-dirty"
fn git_version() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let described = String::from_utf8(output.stdout).ok()?;
    let described = described.trim();
    if described.is_empty() {
        return None;
    }

    match described.strip_prefix('v') {
        Some(tagged) => Some(
            tagged
                .split_once('-')
                .map_or(tagged, |(release, _)| release)
                .to_string(),
        ),
        None => Some(format!("{}-{}", env!("CARGO_PKG_VERSION"), described)),
    }
}
