use crate::android::attribute::{Attribute, AttributeRecord, ValueType, NO_NAMESPACE};
use crate::android::buffer::ByteView;
use crate::android::chunk::{
    Chunk, RES_STRING_POOL_TYPE, RES_XML_END_ELEMENT_TYPE, RES_XML_RESOURCE_MAP_TYPE,
    RES_XML_START_ELEMENT_TYPE, RES_XML_TYPE,
};
use crate::android::resource_map::ResourceMap;
use crate::android::string_pool::StringPool;
use crate::error::ApkResult;
use log::trace;
use serde::{Deserialize, Serialize};

/// Events reported by [`BinaryXmlParser::next`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum XmlEvent {
    StartDocument,
    EndDocument,
    StartElement,
    EndElement,
}

/// Pull parser over Android's binary XML (AXML), as stored in `AndroidManifest.xml`.
///
/// The parser starts at [`XmlEvent::StartDocument`] and moves forward with
/// [`next`](Self::next) until [`XmlEvent::EndDocument`]. Only element events are reported;
/// namespace, CDATA and unknown chunks are skipped. Attributes of the current start element
/// are decoded on first access, and the borrow checker keeps them from outliving the
/// element they belong to.
///
/// ```
/// use minsdk::android::binary_xml::{BinaryXmlParser, XmlEvent};
///
/// # fn names(manifest: &[u8]) -> Result<Vec<String>, minsdk::ApkError> {
/// let mut parser = BinaryXmlParser::new(manifest)?;
/// let mut names = Vec::new();
/// while parser.next()? != XmlEvent::EndDocument {
///     if parser.event() == XmlEvent::StartElement {
///         names.push(parser.name().to_string());
///     }
/// }
/// # Ok(names)
/// # }
/// ```
pub struct BinaryXmlParser<'a> {
    xml: ByteView<'a>,
    string_pool: Option<StringPool<'a>>,
    resource_map: Option<ResourceMap<'a>>,
    event: XmlEvent,
    depth: usize,
    element_name: String,
    element_namespace: String,
    attribute_count: usize,
    attribute_size: usize,
    attributes_contents: ByteView<'a>,
    attributes: Option<Vec<AttributeRecord>>,
}

impl<'a> BinaryXmlParser<'a> {
    /// Finds the first RES_XML chunk of `data` and prepares to walk its contents.
    pub fn new(data: &'a [u8]) -> ApkResult<Self> {
        let mut input = ByteView::new(data);
        let mut xml = None;
        while input.has_remaining() {
            match Chunk::read(&mut input)? {
                Some(chunk) if chunk.chunk_type() == RES_XML_TYPE => {
                    xml = Some(chunk.contents());
                    break;
                }
                Some(chunk) => trace!("skipping outer chunk 0x{:04x}", chunk.chunk_type()),
                None => break,
            }
        }
        let xml = xml.ok_or_else(|| err!(MalformedChunk, "No XML chunk in file"))?;

        Ok(BinaryXmlParser {
            xml,
            string_pool: None,
            resource_map: None,
            event: XmlEvent::StartDocument,
            depth: 0,
            element_name: String::new(),
            element_namespace: String::new(),
            attribute_count: 0,
            attribute_size: 0,
            attributes_contents: ByteView::empty(),
            attributes: None,
        })
    }

    pub fn event(&self) -> XmlEvent {
        self.event
    }

    /// Depth of the current element; the root element is at depth 1.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Name of the current element, empty outside element events.
    pub fn name(&self) -> &str {
        match self.event {
            XmlEvent::StartElement | XmlEvent::EndElement => &self.element_name,
            _ => "",
        }
    }

    /// Namespace URI of the current element, empty outside element events or when the
    /// element has no namespace.
    pub fn namespace(&self) -> &str {
        match self.event {
            XmlEvent::StartElement | XmlEvent::EndElement => &self.element_namespace,
            _ => "",
        }
    }

    /// Number of attributes of the current element, `None` unless at a start element.
    pub fn attribute_count(&self) -> Option<usize> {
        match self.event {
            XmlEvent::StartElement => Some(self.attribute_count),
            _ => None,
        }
    }

    /// The attribute at `index` of the current start element.
    pub fn attribute(&mut self, index: usize) -> ApkResult<Attribute<'_, 'a>> {
        if self.event != XmlEvent::StartElement {
            fail!(UnresolvableAttribute, "Current event not a START_ELEMENT");
        }
        if index >= self.attribute_count {
            fail!(
                UnresolvableAttribute,
                "index must be < attr count ({})",
                self.attribute_count
            );
        }
        self.parse_current_element_attributes()?;
        let record = self
            .attributes
            .as_ref()
            .and_then(|records| records.get(index))
            .copied()
            .ok_or_else(|| err!(UnresolvableAttribute, "Attribute #{} not decoded", index))?;
        let strings = self
            .string_pool
            .as_ref()
            .ok_or_else(|| err!(MalformedChunk, "Named element encountered before string pool"))?;
        Ok(Attribute::new(record, strings, self.resource_map.as_ref()))
    }

    pub fn attribute_name_resource_id(&mut self, index: usize) -> ApkResult<i32> {
        Ok(self.attribute(index)?.name_resource_id())
    }

    pub fn attribute_value_type(&mut self, index: usize) -> ApkResult<ValueType> {
        Ok(self.attribute(index)?.value_type())
    }

    pub fn attribute_int_value(&mut self, index: usize) -> ApkResult<i32> {
        self.attribute(index)?.int_value()
    }

    pub fn attribute_boolean_value(&mut self, index: usize) -> ApkResult<bool> {
        self.attribute(index)?.boolean_value()
    }

    pub fn attribute_string_value(&mut self, index: usize) -> ApkResult<String> {
        self.attribute(index)?.string_value()
    }

    fn parse_current_element_attributes(&mut self) -> ApkResult<()> {
        if self.attributes.is_some() {
            return Ok(());
        }
        let mut records = Vec::with_capacity(self.attribute_count);
        for i in 0..self.attribute_count {
            let start = i * self.attribute_size;
            let mut record = self
                .attributes_contents
                .slice(start, start + self.attribute_size)?;
            records.push(AttributeRecord::read(&mut record)?);
        }
        self.attributes = Some(records);
        Ok(())
    }

    /// Advances to the next element event, or to [`XmlEvent::EndDocument`].
    pub fn next(&mut self) -> ApkResult<XmlEvent> {
        // The depth of an element is left when moving past its end.
        if self.event == XmlEvent::EndElement {
            self.depth = self.depth.saturating_sub(1);
        }

        while self.xml.has_remaining() {
            let Some(chunk) = Chunk::read(&mut self.xml)? else {
                break;
            };
            match chunk.chunk_type() {
                RES_STRING_POOL_TYPE => {
                    if self.string_pool.is_some() {
                        fail!(MalformedChunk, "Multiple string pools not supported");
                    }
                    self.string_pool = Some(StringPool::new(&chunk)?);
                }
                RES_XML_START_ELEMENT_TYPE => {
                    self.start_element(&chunk)?;
                    return Ok(self.event);
                }
                RES_XML_END_ELEMENT_TYPE => {
                    self.end_element(&chunk)?;
                    return Ok(self.event);
                }
                RES_XML_RESOURCE_MAP_TYPE => {
                    if self.resource_map.is_some() {
                        fail!(MalformedChunk, "Multiple resource maps not supported");
                    }
                    self.resource_map = Some(ResourceMap::new(&chunk));
                }
                other => trace!("ignoring chunk 0x{:04x}", other),
            }
        }
        self.event = XmlEvent::EndDocument;
        Ok(self.event)
    }

    fn element_strings(&self, ns_id: u32, name_id: u32) -> ApkResult<(String, String)> {
        let pool = self
            .string_pool
            .as_ref()
            .ok_or_else(|| err!(MalformedChunk, "Named element encountered before string pool"))?;
        let name = pool.get_string(name_id)?;
        let namespace = if ns_id == NO_NAMESPACE {
            String::new()
        } else {
            pool.get_string(ns_id)?
        };
        Ok((name, namespace))
    }

    fn start_element(&mut self, chunk: &Chunk<'a>) -> ApkResult<()> {
        if self.string_pool.is_none() {
            fail!(MalformedChunk, "Named element encountered before string pool");
        }
        let mut contents = chunk.contents();
        if contents.remaining() < 20 {
            fail!(
                MalformedChunk,
                "Start element chunk too short. Need at least 20 bytes. Available: {} bytes",
                contents.remaining()
            );
        }
        let ns_id = contents.read_u32()?;
        let name_id = contents.read_u32()?;
        let attr_start = contents.read_u16()? as usize;
        let attr_size = contents.read_u16()? as usize;
        let attr_count = contents.read_u16()? as usize;
        let attr_end = attr_start + attr_count * attr_size;
        if attr_start > contents.len() {
            fail!(
                MalformedChunk,
                "Attributes start offset out of bounds: {}, max: {}",
                attr_start,
                contents.len()
            );
        }
        if attr_end > contents.len() {
            fail!(
                MalformedChunk,
                "Attributes end offset out of bounds: {}, max: {}",
                attr_end,
                contents.len()
            );
        }

        let (name, namespace) = self.element_strings(ns_id, name_id)?;
        self.element_name = name;
        self.element_namespace = namespace;
        self.attribute_count = attr_count;
        self.attribute_size = attr_size;
        self.attributes_contents = contents.slice(attr_start, attr_end)?;
        self.attributes = None;
        self.depth += 1;
        self.event = XmlEvent::StartElement;
        Ok(())
    }

    fn end_element(&mut self, chunk: &Chunk<'a>) -> ApkResult<()> {
        if self.string_pool.is_none() {
            fail!(MalformedChunk, "Named element encountered before string pool");
        }
        let mut contents = chunk.contents();
        if contents.remaining() < 8 {
            fail!(
                MalformedChunk,
                "End element chunk too short. Need at least 8 bytes. Available: {} bytes",
                contents.remaining()
            );
        }
        let ns_id = contents.read_u32()?;
        let name_id = contents.read_u32()?;
        let (name, namespace) = self.element_strings(ns_id, name_id)?;
        self.element_name = name;
        self.element_namespace = namespace;
        self.attribute_count = 0;
        self.attribute_size = 0;
        self.attributes_contents = ByteView::empty();
        self.attributes = None;
        self.event = XmlEvent::EndElement;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApkError;
    use crate::tests::fixtures::{
        android_attr, raw_chunk, string_pool_chunk, xml_document, AxmlBuilder, Encoding, Value,
        ANDROID_NS,
    };

    fn collect_events(data: &[u8]) -> ApkResult<Vec<(XmlEvent, usize, String)>> {
        let mut parser = BinaryXmlParser::new(data)?;
        let mut events = vec![(parser.event(), parser.depth(), parser.name().to_string())];
        loop {
            let event = parser.next()?;
            events.push((event, parser.depth(), parser.name().to_string()));
            if event == XmlEvent::EndDocument {
                return Ok(events);
            }
        }
    }

    #[test]
    fn reports_element_events_with_depth() {
        let mut builder = AxmlBuilder::manifest();
        builder
            .start_namespace("android", ANDROID_NS)
            .start("manifest", &[])
            .start("application", &[])
            .start("activity", &[])
            .end("activity")
            .end("application")
            .start("uses-sdk", &[])
            .end("uses-sdk")
            .end("manifest")
            .end_namespace("android", ANDROID_NS);
        let events = collect_events(&builder.build()).unwrap();
        let expected = vec![
            (XmlEvent::StartDocument, 0, ""),
            (XmlEvent::StartElement, 1, "manifest"),
            (XmlEvent::StartElement, 2, "application"),
            (XmlEvent::StartElement, 3, "activity"),
            (XmlEvent::EndElement, 3, "activity"),
            (XmlEvent::EndElement, 2, "application"),
            (XmlEvent::StartElement, 2, "uses-sdk"),
            (XmlEvent::EndElement, 2, "uses-sdk"),
            (XmlEvent::EndElement, 1, "manifest"),
            (XmlEvent::EndDocument, 0, ""),
        ];
        let actual: Vec<(XmlEvent, usize, &str)> = events
            .iter()
            .map(|(event, depth, name)| (*event, *depth, name.as_str()))
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn exposes_element_namespace_and_attributes() {
        let mut builder = AxmlBuilder::manifest().encoding(Encoding::Utf8);
        builder
            .start_with_namespace(
                Some("urn:test"),
                "uses-sdk",
                &[
                    android_attr("minSdkVersion", Value::Int(21)),
                    android_attr("label", Value::Str("hello")),
                ],
            )
            .end_with_namespace(Some("urn:test"), "uses-sdk");
        let data = builder.build();
        let mut parser = BinaryXmlParser::new(&data).unwrap();
        assert_eq!(parser.attribute_count(), None);
        assert_eq!(parser.next().unwrap(), XmlEvent::StartElement);
        assert_eq!(parser.namespace(), "urn:test");
        assert_eq!(parser.attribute_count(), Some(2));

        let min_sdk = parser.attribute(0).unwrap();
        assert_eq!(min_sdk.name().unwrap(), "minSdkVersion");
        assert_eq!(min_sdk.namespace().unwrap(), ANDROID_NS);
        assert_eq!(min_sdk.name_resource_id(), 0x0101_020c);
        assert_eq!(parser.attribute_int_value(0).unwrap(), 21);
        assert_eq!(parser.attribute_value_type(1).unwrap(), ValueType::String);
        assert_eq!(parser.attribute_string_value(1).unwrap(), "hello");
        assert_eq!(parser.attribute_name_resource_id(1).unwrap(), 0);
        assert!(matches!(
            parser.attribute(2),
            Err(ApkError::UnresolvableAttribute(_))
        ));

        assert_eq!(parser.next().unwrap(), XmlEvent::EndElement);
        assert_eq!(parser.namespace(), "urn:test");
        assert_eq!(parser.attribute_count(), None);
        assert!(matches!(
            parser.attribute_boolean_value(0),
            Err(ApkError::UnresolvableAttribute(_))
        ));
        assert_eq!(parser.next().unwrap(), XmlEvent::EndDocument);
        assert_eq!(parser.next().unwrap(), XmlEvent::EndDocument);
    }

    #[test]
    fn skips_leading_non_xml_chunks() {
        let mut builder = AxmlBuilder::manifest();
        builder.start("manifest", &[]).end("manifest");
        let mut data = raw_chunk(0x0002, &[0; 12]);
        data.extend_from_slice(&builder.build());
        let events = collect_events(&data).unwrap();
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn fails_without_xml_chunk() {
        let data = raw_chunk(0x0002, &[0; 12]);
        assert!(matches!(
            BinaryXmlParser::new(&data),
            Err(ApkError::MalformedChunk(_))
        ));
        assert!(BinaryXmlParser::new(&[]).is_err());
    }

    #[test]
    fn rejects_element_before_string_pool() {
        let mut builder = AxmlBuilder::manifest();
        builder.start("manifest", &[]).end("manifest");
        let data = xml_document(&[builder.body(), &builder.string_pool()]);
        let mut parser = BinaryXmlParser::new(&data).unwrap();
        assert!(matches!(parser.next(), Err(ApkError::MalformedChunk(_))));
    }

    #[test]
    fn rejects_second_string_pool() {
        let pool = string_pool_chunk(&["a"], Encoding::Utf16);
        let data = xml_document(&[&pool, &pool]);
        let mut parser = BinaryXmlParser::new(&data).unwrap();
        assert_eq!(
            parser.next(),
            Err(ApkError::MalformedChunk(
                "Multiple string pools not supported".to_string()
            ))
        );
    }

    #[test]
    fn rejects_second_resource_map() {
        let builder = AxmlBuilder::manifest();
        let map = builder.resource_map();
        let data = xml_document(&[&builder.string_pool(), &map, &map]);
        let mut parser = BinaryXmlParser::new(&data).unwrap();
        assert!(matches!(parser.next(), Err(ApkError::MalformedChunk(_))));
    }

    #[test]
    fn rejects_attribute_window_out_of_bounds() {
        let mut builder = AxmlBuilder::manifest();
        builder.start("manifest", &[android_attr("minSdkVersion", Value::Int(3))]);
        let mut body = builder.body().to_vec();
        // attributeCount lives after the 16 byte node header and nsId/nameId/start/size
        body[16 + 12..16 + 14].copy_from_slice(&5u16.to_le_bytes());
        let data = xml_document(&[&builder.string_pool(), &body]);
        let mut parser = BinaryXmlParser::new(&data).unwrap();
        assert!(matches!(parser.next(), Err(ApkError::MalformedChunk(_))));
    }

    #[test]
    fn short_attribute_records_underflow_instead_of_panicking() {
        let mut builder = AxmlBuilder::manifest();
        builder.start("manifest", &[android_attr("minSdkVersion", Value::Int(3))]);
        let mut body = builder.body().to_vec();
        // attributeSize 8: the window fits but each record is too short
        body[16 + 10..16 + 12].copy_from_slice(&8u16.to_le_bytes());
        let data = xml_document(&[&builder.string_pool(), &body]);
        let mut parser = BinaryXmlParser::new(&data).unwrap();
        assert_eq!(parser.next().unwrap(), XmlEvent::StartElement);
        assert!(matches!(
            parser.attribute(0),
            Err(ApkError::BufferUnderflow(_))
        ));
    }

    #[test]
    fn tolerates_truncated_trailing_chunk() {
        let mut builder = AxmlBuilder::manifest();
        builder.start("manifest", &[]).end("manifest");
        let mut body = builder.body().to_vec();
        body.extend_from_slice(&[0x02, 0x01, 0x10]);
        let data = xml_document(&[&builder.string_pool(), &body]);
        let events = collect_events(&data).unwrap();
        assert_eq!(events.last().map(|e| e.0), Some(XmlEvent::EndDocument));
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn attributes_resolve_without_resource_map() {
        let mut builder = AxmlBuilder::manifest();
        builder
            .start("uses-sdk", &[android_attr("minSdkVersion", Value::Int(9))])
            .end("uses-sdk");
        let data = xml_document(&[&builder.string_pool(), builder.body()]);
        let mut parser = BinaryXmlParser::new(&data).unwrap();
        parser.next().unwrap();
        assert_eq!(parser.attribute_name_resource_id(0).unwrap(), 0);
        assert_eq!(parser.attribute_int_value(0).unwrap(), 9);
    }
}
