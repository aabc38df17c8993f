use minsdk::android::apk::find_android_manifest_record;
use minsdk::{min_sdk_version_from_apk, resolve_min_sdk_version};
use std::env;
use std::error::Error;
use std::fs;

// Prints the minimum supported API level of an APK, or of a binary AndroidManifest.xml
// pulled out of one with `--manifest`.

//Usage: min_sdk [--manifest] <file>
fn main() {
    let args: Vec<String> = env::args().collect();
    let (manifest_only, path) = match args.as_slice() {
        [_, flag, path] if flag == "--manifest" => (true, path),
        [_, path] => (false, path),
        _ => {
            let program = args.first().map_or("min_sdk", String::as_str);
            eprintln!("Usage: {} [--manifest] <apk-or-manifest>", program);
            std::process::exit(1);
        }
    };

    match run(path, manifest_only) {
        Ok(min_sdk) => println!("minSdkVersion: {min_sdk}"),
        Err(e) => {
            eprintln!("Aborted due to error: {e}");
            std::process::exit(2);
        }
    }
}

fn run(path: &str, manifest_only: bool) -> Result<i32, Box<dyn Error>> {
    let data = fs::read(path)?;
    if manifest_only {
        return Ok(resolve_min_sdk_version(&data)?);
    }
    let record = find_android_manifest_record(&data)?;
    println!(
        "{}: {} bytes at offset {}",
        record.name(),
        record.uncompressed_size(),
        record.local_file_header_offset()
    );
    Ok(min_sdk_version_from_apk(&data)?)
}
