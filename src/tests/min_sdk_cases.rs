use crate::android::binary_xml::{BinaryXmlParser, XmlEvent};
use crate::error::ApkError;
use crate::resolve_min_sdk_version;
use crate::tests::fixtures::{
    android_attr, raw_chunk, AxmlBuilder, Attr, Encoding, Value, ANDROID_NS,
};

const CDATA_TYPE: u16 = 0x0104;

/// A manifest shaped the way `aapt2` lays one out: namespace, root attributes, application
/// tree and a `uses-sdk` after `application`.
fn realistic_manifest(encoding: Encoding, uses_sdk: &[Attr<'_>]) -> Vec<u8> {
    let mut builder = AxmlBuilder::new(&[
        ("versionCode", 0x0101_021b),
        ("versionName", 0x0101_021c),
        ("minSdkVersion", 0x0101_020c),
        ("targetSdkVersion", 0x0101_0270),
        ("label", 0x0101_0001),
        ("exported", 0x0101_0010),
        ("name", 0x0101_0003),
    ])
    .encoding(encoding);
    builder
        .start_namespace("android", ANDROID_NS)
        .start(
            "manifest",
            &[
                android_attr("versionCode", Value::Int(42)),
                android_attr("versionName", Value::Str("1.4.2")),
                Attr {
                    namespace: None,
                    name: "package",
                    value: Value::Str("com.example.app"),
                },
            ],
        )
        .start(
            "application",
            &[android_attr("label", Value::Reference(0x7f0f_0001))],
        )
        .start(
            "activity",
            &[
                android_attr("name", Value::Str(".MainActivity")),
                android_attr("exported", Value::Bool(true)),
            ],
        )
        .start("intent-filter", &[])
        .start(
            "action",
            &[android_attr("name", Value::Str("android.intent.action.MAIN"))],
        )
        .end("action")
        .end("intent-filter")
        .end("activity")
        .end("application")
        .chunk(&raw_chunk(CDATA_TYPE, &[0; 20]))
        .start("uses-sdk", uses_sdk)
        .end("uses-sdk")
        .end("manifest")
        .end_namespace("android", ANDROID_NS);
    builder.build()
}

#[test]
fn realistic_manifest_in_both_encodings() {
    let uses_sdk = [
        android_attr("minSdkVersion", Value::Int(24)),
        android_attr("targetSdkVersion", Value::Int(34)),
    ];
    for encoding in [Encoding::Utf8, Encoding::Utf16] {
        let manifest = realistic_manifest(encoding, &uses_sdk);
        assert_eq!(resolve_min_sdk_version(&manifest).unwrap(), 24);
    }
}

#[test]
fn codename_in_realistic_manifest() {
    let manifest = realistic_manifest(
        Encoding::Utf8,
        &[android_attr("minSdkVersion", Value::Str("O"))],
    );
    assert_eq!(resolve_min_sdk_version(&manifest).unwrap(), 25);

    let manifest = realistic_manifest(
        Encoding::Utf16,
        &[android_attr("minSdkVersion", Value::Str("VanillaIceCream"))],
    );
    let err = resolve_min_sdk_version(&manifest).unwrap_err();
    assert!(matches!(err, ApkError::UnsupportedCodename(_)));
    assert!(err.to_string().contains("VanillaIceCream"));
}

#[test]
fn walks_every_attribute_of_a_realistic_manifest() {
    let manifest = realistic_manifest(Encoding::Utf16, &[]);
    let mut parser = BinaryXmlParser::new(&manifest).unwrap();
    let mut rendered = Vec::new();
    while parser.next().unwrap() != XmlEvent::EndDocument {
        if parser.event() != XmlEvent::StartElement {
            continue;
        }
        let element = parser.name().to_string();
        for i in 0..parser.attribute_count().unwrap() {
            let attribute = parser.attribute(i).unwrap();
            rendered.push(format!(
                "{}@{}={}",
                element,
                attribute.name().unwrap(),
                attribute.string_value().unwrap()
            ));
        }
    }
    assert_eq!(
        rendered,
        vec![
            "manifest@versionCode=42",
            "manifest@versionName=1.4.2",
            "manifest@package=com.example.app",
            "application@label=@7f0f0001",
            "activity@name=.MainActivity",
            "activity@exported=true",
            "action@name=android.intent.action.MAIN",
        ]
    );
}

#[test]
fn uses_sdk_without_min_sdk_keeps_default() {
    let manifest = realistic_manifest(
        Encoding::Utf8,
        &[android_attr("targetSdkVersion", Value::Int(34))],
    );
    assert_eq!(resolve_min_sdk_version(&manifest).unwrap(), 1);
}

#[test]
fn negative_min_sdk_does_not_lower_the_default() {
    let manifest = realistic_manifest(
        Encoding::Utf8,
        &[android_attr("minSdkVersion", Value::Int(-5))],
    );
    assert_eq!(resolve_min_sdk_version(&manifest).unwrap(), 1);
}

#[test]
fn garbage_after_document_is_tolerated() {
    let mut manifest = realistic_manifest(
        Encoding::Utf16,
        &[android_attr("minSdkVersion", Value::Int(21))],
    );
    manifest.extend_from_slice(&[0xde, 0xad, 0xbe]);
    assert_eq!(resolve_min_sdk_version(&manifest).unwrap(), 21);
}

#[test]
fn truncated_document_has_no_xml_chunk() {
    let manifest = realistic_manifest(
        Encoding::Utf16,
        &[android_attr("minSdkVersion", Value::Int(21))],
    );
    // Declared RES_XML size now overruns the input, so the outer chunk is skipped.
    let truncated = &manifest[..manifest.len() - 4];
    assert!(matches!(
        resolve_min_sdk_version(truncated),
        Err(ApkError::MalformedChunk(_))
    ));
}
