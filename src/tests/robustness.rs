//! Feeds random and randomly corrupted input to every entry point. Any result is fine as
//! long as nothing panics.

use crate::android::apk::{find_android_manifest_record, min_sdk_version_from_apk};
use crate::android::binary_xml::{BinaryXmlParser, XmlEvent};
use crate::android::zip::{find_zip_sections, parse_central_directory};
use crate::error::ApkResult;
use crate::resolve_min_sdk_version;
use crate::tests::fixtures::{
    android_attr, manifest_with_uses_sdk, AxmlBuilder, Encoding, Method, Value, ZipBuilder,
    ANDROID_NS,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn walk(data: &[u8]) -> ApkResult<usize> {
    let mut parser = BinaryXmlParser::new(data)?;
    let mut attributes = 0;
    while parser.next()? != XmlEvent::EndDocument {
        let _ = (parser.name(), parser.namespace(), parser.depth());
        for i in 0..parser.attribute_count().unwrap_or(0) {
            let attribute = parser.attribute(i)?;
            let _ = attribute.name();
            let _ = attribute.namespace();
            let _ = attribute.name_resource_id();
            let _ = attribute.int_value();
            let _ = attribute.boolean_value();
            let _ = attribute.string_value();
            attributes += 1;
        }
    }
    Ok(attributes)
}

fn check_zip(data: &[u8]) {
    if let Ok(sections) = find_zip_sections(data) {
        let _ = parse_central_directory(data, &sections);
    }
    let _ = find_android_manifest_record(data);
}

fn corrupt(rng: &mut StdRng, data: &mut [u8]) {
    let flips = rng.random_range(1..=8);
    for _ in 0..flips {
        let at = rng.random_range(0..data.len());
        data[at] = rng.random::<u8>();
    }
}

fn sample_manifest(encoding: Encoding) -> Vec<u8> {
    let mut builder = AxmlBuilder::manifest().encoding(encoding);
    builder
        .start_namespace("android", ANDROID_NS)
        .start("manifest", &[android_attr("versionName", Value::Str("2.0"))])
        .start("uses-sdk", &[android_attr("minSdkVersion", Value::Int(21))])
        .end("uses-sdk")
        .start("application", &[android_attr("debuggable", Value::Bool(false))])
        .end("application")
        .end("manifest")
        .end_namespace("android", ANDROID_NS);
    builder.build()
}

#[test]
fn random_bytes_never_panic() {
    let mut rng = StdRng::seed_from_u64(0x5eed_0001);
    for _ in 0..500 {
        let len = rng.random_range(0..512);
        let mut data = vec![0u8; len];
        rng.fill(&mut data[..]);
        let _ = walk(&data);
        let _ = resolve_min_sdk_version(&data);
        check_zip(&data);
        let _ = min_sdk_version_from_apk(&data);
    }
}

#[test]
fn corrupted_manifests_never_panic() {
    let mut rng = StdRng::seed_from_u64(0x5eed_0002);
    for encoding in [Encoding::Utf8, Encoding::Utf16] {
        let manifest = sample_manifest(encoding);
        assert_eq!(walk(&manifest).unwrap(), 3);
        assert_eq!(resolve_min_sdk_version(&manifest).unwrap(), 21);
        for _ in 0..2000 {
            let mut data = manifest.clone();
            corrupt(&mut rng, &mut data);
            let _ = walk(&data);
            let _ = resolve_min_sdk_version(&data);
        }
    }
}

#[test]
fn every_truncation_of_a_manifest_is_handled() {
    let manifest = sample_manifest(Encoding::Utf16);
    for len in 0..manifest.len() {
        // The document chunk's declared size no longer fits, so there is nothing to parse.
        assert!(walk(&manifest[..len]).is_err());
        assert!(resolve_min_sdk_version(&manifest[..len]).is_err());
    }
}

#[test]
fn corrupted_archives_never_panic() {
    let mut rng = StdRng::seed_from_u64(0x5eed_0003);
    let manifest = manifest_with_uses_sdk(&[&[android_attr("minSdkVersion", Value::Int(19))]]);
    let apk = ZipBuilder::new()
        .entry("AndroidManifest.xml", &manifest, Method::Deflated)
        .directory("META-INF/")
        .entry("classes.dex", &[0; 128], Method::Stored)
        .comment(b"zip comment")
        .build();
    assert_eq!(min_sdk_version_from_apk(&apk).unwrap(), 19);

    for _ in 0..1000 {
        let mut data = apk.clone();
        corrupt(&mut rng, &mut data);
        check_zip(&data);
    }
    for len in 0..apk.len() {
        check_zip(&apk[..len]);
    }
}
