use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

/// Exposes `PREBUILTS_VERSION` from `git describe`; dirty or untagged trees
/// get a build timestamp appended.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let described = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().trim_start_matches('v').to_string());

    let version = match described {
        Some(v) if !v.is_empty() && !v.ends_with("-dirty") => v,
        Some(v) if !v.is_empty() => format!("{v}-{}", build_time()),
        _ => format!("0.0.0-unknown-{}", build_time()),
    };

    println!("cargo:rustc-env=PREBUILTS_VERSION={version}");
}

fn build_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
