//! Stamps build identification into the binary for its startup banner
//!
//! `GIT_HASH`, `BUILD_TIMESTAMP` and `BUILD_PROFILE` are exported as
//! compile-time environment variables. `SOURCE_DATE_EPOCH`, when set,
//! pins the timestamp for reproducible builds.

use chrono::{DateTime, SecondsFormat, Utc};
use std::env;
use std::process::Command;

const UNKNOWN: &str = "unknown";

fn git_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_owned()).filter(|h| !h.is_empty())
}

fn build_time() -> DateTime<Utc> {
    env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|secs| secs.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}

fn main() {
    let stamps = [
        ("GIT_HASH", git_hash().unwrap_or_else(|| UNKNOWN.to_owned())),
        (
            "BUILD_TIMESTAMP",
            build_time().to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        (
            "BUILD_PROFILE",
            env::var("PROFILE").unwrap_or_else(|_| UNKNOWN.to_owned()),
        ),
    ];
    for (key, value) in stamps {
        println!("cargo:rustc-env={}={}", key, value);
    }
}
