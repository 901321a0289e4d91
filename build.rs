//! Build script for winfw
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! shown by `winfw --version`.

fn main() {
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
