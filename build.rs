//! Stamps the crate with its build date and cargo profile.
//!
//! `SOURCE_DATE_EPOCH` pins the date for reproducible builds.

use time::macros::format_description;
use time::OffsetDateTime;

fn build_date() -> String {
    let now = std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);
    now.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "unknown".into())
}

fn main() {
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".into());
    println!("cargo:rustc-env=VOXTRACE_BUILD={} {}", build_date(), profile);
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
}
