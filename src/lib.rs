//! # minsdk
//!
//! A library for reading the minimum supported Android platform version (API level) of an
//! APK, decoding its ZIP central directory and binary `AndroidManifest.xml` defensively.
//!
//! Every offset, length and count in the input is checked before it is used, so malformed or
//! hostile files fail with an [`ApkError`] instead of panicking.
//!
#[macro_use]
pub mod error;

pub mod android;
#[cfg(test)]
mod tests;

pub use crate::android::apk::{extract_android_manifest, min_sdk_version_from_apk};
pub use crate::android::binary_xml::{BinaryXmlParser, XmlEvent};
pub use crate::android::manifest::min_sdk_version_for_codename;
pub use crate::error::{ApkError, ApkResult};

/// Resolves the effective `minSdkVersion` of a binary `AndroidManifest.xml`
///
/// The result is the largest `android:minSdkVersion` over all `<uses-sdk>` children of the
/// `<manifest>` root, or `1` when none declares one. Codenames such as `"N"` are mapped to
/// the API level of the release preceding them.
///
/// # Examples
///
/// ```no_run
///  use minsdk::{min_sdk_version_from_apk, resolve_min_sdk_version};
///
///  let apk = std::fs::read("app.apk").unwrap();
///  println!("minSdkVersion {}", min_sdk_version_from_apk(&apk).unwrap());
///
///  let manifest = std::fs::read("AndroidManifest.xml").unwrap();
///  println!("minSdkVersion {}", resolve_min_sdk_version(&manifest).unwrap());
/// ```
pub fn resolve_min_sdk_version(manifest: &[u8]) -> ApkResult<i32> {
    android::manifest::min_sdk_version_from_binary_manifest(manifest)
}
