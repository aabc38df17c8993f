//! Decoders for the containers an APK is made of: the ZIP archive and the binary XML
//! (AXML) format of `AndroidManifest.xml`.

pub mod apk;
pub mod attribute;
pub mod binary_xml;
pub mod buffer;
pub mod chunk;
pub mod manifest;
pub mod resource_map;
pub mod string_pool;
pub mod zip;
