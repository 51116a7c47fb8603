//! Build-time information, captured by `build.rs`.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use crate::util::log::info;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Logs what this firmware is and how it was built.
pub fn log_fw_info(bin_name: &str) {
    info!("{} ({})", built_info::PKG_NAME, bin_name);
    info!("Author: {}", built_info::PKG_AUTHORS);
    info!("Version: {}", built_info::PKG_VERSION);
    info!(
        "GPIB-USB protocol version: {}.{}{}",
        crate::constants::VERSION_MAJOR,
        crate::constants::VERSION_MINOR_A,
        crate::constants::VERSION_MINOR_B
    );

    info!("Git commit: {}", built_info::GIT_COMMIT_HASH.unwrap_or("unknown"));
    info!("Git dirty: {}", built_info::GIT_DIRTY.unwrap_or(false));

    info!("Built: {}", built_info::BUILT_TIME_UTC);
    info!("Rust version: {}", built_info::RUSTC_VERSION);
    info!("Target triple: {}", built_info::TARGET);
    info!("Build profile: {}", built_info::PROFILE);
    info!("Enabled features: {}", built_info::FEATURES_LOWERCASE_STR);
}
