// Generates the C header with the `cbindgen` CLI when it is installed and
// falls back to the checked-in `include/cadenza.h` otherwise.
//
// Either way the header ends up in:
//   - <crate>/include/cadenza.h      (checked-in)
//   - $OUT_DIR/cadenza.h

use std::{env, error::Error, fs, path::PathBuf, process::Command};

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=include/cadenza.h");

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let header_repo = crate_dir.join("include").join("cadenza.h");
    let header_out = out_dir.join("cadenza.h");

    let cbindgen_ok = Command::new("cbindgen")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);

    if cbindgen_ok {
        let status = Command::new("cbindgen")
            .args(["--crate", "cadenza-ffi", "--lang", "C", "--output"])
            .arg(&header_out)
            .current_dir(&crate_dir)
            .status()?;
        if status.success() {
            fs::create_dir_all(crate_dir.join("include"))?;
            fs::copy(&header_out, &header_repo)?;
            return Ok(());
        }
        println!("cargo:warning=cadenza-ffi: cbindgen failed; using the checked-in header");
    }

    fs::copy(&header_repo, &header_out)?;
    Ok(())
}
