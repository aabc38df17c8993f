use crate::android::attribute::ValueType;
use crate::android::binary_xml::{BinaryXmlParser, XmlEvent};
use crate::error::ApkResult;
use log::debug;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// Resource ID of `android:minSdkVersion`.
pub const MIN_SDK_VERSION_ATTR_ID: i32 = 0x0101_020c;

pub const ANDROID_MANIFEST_ZIP_ENTRY_NAME: &str = "AndroidManifest.xml";

/// API levels of the platform codenames, keyed by their first letter.
static CODENAME_API_LEVELS: Lazy<BTreeMap<char, i32>> = Lazy::new(|| {
    BTreeMap::from([
        ('C', 2),
        ('D', 3),
        ('E', 4),
        ('F', 7),
        ('G', 8),
        ('H', 10),
        ('I', 13),
        ('J', 15),
        ('K', 18),
        ('L', 20),
        ('M', 22),
        ('N', 23),
        ('O', 25),
    ])
});

/// Minimum SDK version implied by a development codename such as `"N"` or `"OMR1"`.
///
/// A preview build of release `X` runs apps targeting codename `X`, so the codename maps to
/// the API level of the release before it. Letters between two known codenames are
/// extrapolated from the closest known one above them.
pub fn min_sdk_version_for_codename(codename: &str) -> ApkResult<i32> {
    let first = match codename.chars().next() {
        Some(c) if c.is_ascii_uppercase() => c,
        _ => fail!(
            UnsupportedCodename,
            "Unrecognized codename: {:?}",
            codename
        ),
    };
    if first < 'C' {
        return Ok(1);
    }
    if let Some(level) = CODENAME_API_LEVELS.get(&first) {
        return Ok(*level);
    }
    match CODENAME_API_LEVELS.range(first..).next() {
        Some((letter, level)) => Ok(level + (first as i32 - *letter as i32)),
        None => fail!(
            UnsupportedCodename,
            "Codename {:?} is newer than any known platform",
            codename
        ),
    }
}

/// Effective minimum SDK version declared by a binary `AndroidManifest.xml`.
///
/// Looks at `android:minSdkVersion` of every `<manifest>/<uses-sdk>` element and returns the
/// largest value found, or `1` when none is declared.
pub fn min_sdk_version_from_binary_manifest(manifest: &[u8]) -> ApkResult<i32> {
    let mut parser = BinaryXmlParser::new(manifest)?;
    let mut result = 1;
    loop {
        match parser.next()? {
            XmlEvent::EndDocument => break,
            XmlEvent::StartElement
                if parser.depth() == 2
                    && parser.name() == "uses-sdk"
                    && parser.namespace().is_empty() =>
            {
                if let Some(min_sdk) = uses_sdk_min_version(&mut parser)? {
                    debug!("uses-sdk declares minSdkVersion {}", min_sdk);
                    result = result.max(min_sdk);
                }
            }
            _ => {}
        }
    }
    Ok(result)
}

/// Value of the element's `android:minSdkVersion`. Every attribute is checked and the last
/// one carrying the resource id wins.
fn uses_sdk_min_version(parser: &mut BinaryXmlParser<'_>) -> ApkResult<Option<i32>> {
    let count = parser.attribute_count().unwrap_or(0);
    let mut min_sdk = None;
    for i in 0..count {
        let attribute = parser.attribute(i)?;
        if attribute.name_resource_id() != MIN_SDK_VERSION_ATTR_ID {
            continue;
        }
        let value = match attribute.value_type() {
            ValueType::Int => attribute.int_value()?,
            ValueType::String => min_sdk_version_for_codename(&attribute.string_value()?)?,
            other => fail!(
                UnresolvableAttribute,
                "Unable to determine APK's minimum supported Android: unsupported value type \
                 in {}'s minSdkVersion: {:?} (0x{:02x})",
                ANDROID_MANIFEST_ZIP_ENTRY_NAME,
                other,
                attribute.raw_value_type()
            ),
        };
        min_sdk = Some(value);
    }
    Ok(min_sdk)
}
