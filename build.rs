//! This build script copies the `memory.x` file from the crate root into a directory where
//! the linker can always find it at build time, and embeds the build time as the initial
//! wall clock reference.

use chrono::Utc;
use std::{env, fs::File, io::Write, path::PathBuf};

fn main() {
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());

    // Memory layout and linker scripts are only needed for the firmware target.
    if env::var("CARGO_CFG_TARGET_ARCH").as_deref() == Ok("arm") {
        File::create(out.join("memory.x"))
            .unwrap()
            .write_all(include_bytes!("memory.x"))
            .unwrap();
        println!("cargo:rustc-link-search={}", out.display());
        println!("cargo:rustc-link-arg-bins=--nmagic");
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }

    // create rs file with current UTC time
    File::create(out.join("utc.rs"))
        .unwrap()
        .write_fmt(format_args!(
            "pub const BUILD_UTC_MILLIS: i64 = {:?};",
            Utc::now().timestamp_millis()
        ))
        .unwrap();

    // By default, Cargo will re-run a build script whenever any file in the project changes,
    // which keeps the embedded build time fresh.
}
