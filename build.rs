//! This build script handles:
//! - Exposing build-time information to the application.
//! - Copying `memory.x` to the output directory to allow the firmware to be
//!   created.
//!
//! ## `memory.x` file handling
//!
//! This build script copies the appropriate memory.x file from the `link/`
//! dir into a directory where the linker can find it at link time.  Host
//! builds (no `pico` or `pico2` feature) don't link firmware, and skip this.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

// memory.x handling derived from embassy-rs examples.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    // Re-run this build script if anything in git changes.
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");

    // Re-run this build script of DEFMT_LOG changes.
    println!("cargo:rerun-if-env-changed=DEFMT_LOG");

    // Get built-time information
    built::write_built_file().expect("Failed to acquire build-time information");

    if let Some(memory_x) = memory_x() {
        // Put `memory.x` in our output directory and ensure it's on the
        // linker search path.
        let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
        File::create(out.join("memory.x"))
            .unwrap()
            .write_all(memory_x)
            .unwrap();
        println!("cargo:rustc-link-search={}", out.display());

        // Set embassy linker arguments for the binary.
        println!("cargo:rustc-link-arg-bins=--nmagic");
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
        println!("cargo:rustc-link-arg-bins=-Tdevice.x");

        // Only RP2040 uses this linker file.
        #[cfg(feature = "pico")]
        println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    }
}

// RP2040 and RP235X use different memory.x files.  Neither file should be
// called memory.x, as then the linker would pick it up from our root
// directory, instead of the version we put in OUT_DIR.
fn memory_x() -> Option<&'static [u8]> {
    #[cfg(feature = "pico")]
    {
        println!("cargo:rerun-if-changed=link/memory.rp2040.x");
        return Some(include_bytes!("link/memory.rp2040.x"));
    }
    #[cfg(feature = "pico2")]
    {
        println!("cargo:rerun-if-changed=link/memory.rp235x.x");
        return Some(include_bytes!("link/memory.rp235x.x"));
    }
    #[allow(unreachable_code)]
    None
}
