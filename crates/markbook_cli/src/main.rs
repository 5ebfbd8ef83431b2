//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `markbook_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("markbook_core ping={}", markbook_core::ping());
    println!("markbook_core version={}", markbook_core::core_version());
}
