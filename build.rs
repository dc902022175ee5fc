//! Build script for vpclab
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! shown by `vpclab --version`.

fn main() {
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
