use crate::android::manifest::{
    min_sdk_version_from_binary_manifest, ANDROID_MANIFEST_ZIP_ENTRY_NAME,
};
use crate::android::zip::{find_zip_sections, parse_central_directory, CentralDirectoryRecord};
use crate::error::{ApkError, ApkResult};
use log::debug;
use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// The Central Directory record of the APK's `AndroidManifest.xml`.
///
/// Fails if `apk` is not a ZIP archive, if two entries share a name, or if there is no
/// manifest entry.
pub fn find_android_manifest_record(apk: &[u8]) -> ApkResult<CentralDirectoryRecord> {
    let sections = find_zip_sections(apk).map_err(|e| match e {
        ApkError::ZipFormat(_) => ApkError::apk_format_caused_by("not a ZIP archive", e),
        other => other,
    })?;
    let records = parse_central_directory(apk, &sections)?;

    let mut names = BTreeSet::new();
    let mut manifest = None;
    for record in records {
        if !names.insert(record.name().to_string()) {
            return Err(ApkError::apk_format(format!(
                "Multiple ZIP entries with the same name: {}",
                record.name()
            )));
        }
        if record.name() == ANDROID_MANIFEST_ZIP_ENTRY_NAME {
            manifest = Some(record);
        }
    }
    manifest.ok_or_else(|| {
        ApkError::apk_format(format!("Missing {}", ANDROID_MANIFEST_ZIP_ENTRY_NAME))
    })
}

/// Uncompressed contents of the APK's `AndroidManifest.xml`.
pub fn extract_android_manifest(apk: &[u8]) -> ApkResult<Vec<u8>> {
    let record = find_android_manifest_record(apk)?;
    debug!(
        "{} at local header offset {}, {} bytes ({} compressed, method {})",
        record.name(),
        record.local_file_header_offset(),
        record.uncompressed_size(),
        record.compressed_size(),
        record.compression_method()
    );

    let mut archive = ZipArchive::new(Cursor::new(apk))
        .map_err(|e| ApkError::apk_format(format!("Cannot open archive: {}", e)))?;
    let mut entry = archive.by_name(ANDROID_MANIFEST_ZIP_ENTRY_NAME).map_err(|e| {
        ApkError::apk_format(format!(
            "Cannot read {}: {}",
            ANDROID_MANIFEST_ZIP_ENTRY_NAME, e
        ))
    })?;
    let mut manifest = Vec::new();
    entry.read_to_end(&mut manifest).map_err(|e| {
        ApkError::apk_format(format!(
            "Cannot decompress {}: {}",
            ANDROID_MANIFEST_ZIP_ENTRY_NAME, e
        ))
    })?;
    Ok(manifest)
}

/// Lowest Android API level the APK declares support for.
pub fn min_sdk_version_from_apk(apk: &[u8]) -> ApkResult<i32> {
    let manifest = extract_android_manifest(apk)?;
    min_sdk_version_from_binary_manifest(&manifest)
}
