use crate::android::buffer::ByteView;
use crate::android::resource_map::ResourceMap;
use crate::android::string_pool::StringPool;
use crate::error::ApkResult;
use serde::{Deserialize, Serialize};

pub const TYPE_REFERENCE: u8 = 0x01;
pub const TYPE_STRING: u8 = 0x03;
pub const TYPE_INT_DEC: u8 = 0x10;
pub const TYPE_INT_HEX: u8 = 0x11;
pub const TYPE_INT_BOOLEAN: u8 = 0x12;

/// String index meaning "no namespace".
pub const NO_NAMESPACE: u32 = 0xFFFF_FFFF;

/// Coarse classification of an attribute's raw value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// Use [`Attribute::string_value`].
    String,
    /// Decimal or hexadecimal integer. Use [`Attribute::int_value`].
    Int,
    /// Resource reference. Use [`Attribute::int_value`].
    Reference,
    /// Use [`Attribute::boolean_value`].
    Boolean,
    Unsupported,
}

impl ValueType {
    pub fn from_raw(value_type: u8) -> Self {
        match value_type {
            TYPE_STRING => ValueType::String,
            TYPE_INT_DEC | TYPE_INT_HEX => ValueType::Int,
            TYPE_REFERENCE => ValueType::Reference,
            TYPE_INT_BOOLEAN => ValueType::Boolean,
            _ => ValueType::Unsupported,
        }
    }
}

/// Undecoded fields of one attribute record of a start element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AttributeRecord {
    ns_id: u32,
    name_id: u32,
    value_type: u8,
    value_data: u32,
}

impl AttributeRecord {
    /// Reads one record: `nsId`, `nameId`, 7 ignored bytes (raw value index, value size,
    /// reserved), `valueType`, `valueData`.
    pub(crate) fn read(record: &mut ByteView<'_>) -> ApkResult<Self> {
        let ns_id = record.read_u32()?;
        let name_id = record.read_u32()?;
        record.skip(7)?;
        let value_type = record.read_u8()?;
        let value_data = record.read_u32()?;
        Ok(AttributeRecord {
            ns_id,
            name_id,
            value_type,
            value_data,
        })
    }
}

/// An attribute of the current start element, bound to its document's string pool and
/// resource map.
pub struct Attribute<'p, 'a> {
    record: AttributeRecord,
    strings: &'p StringPool<'a>,
    resources: Option<&'p ResourceMap<'a>>,
}

impl<'p, 'a> Attribute<'p, 'a> {
    pub(crate) fn new(
        record: AttributeRecord,
        strings: &'p StringPool<'a>,
        resources: Option<&'p ResourceMap<'a>>,
    ) -> Self {
        Attribute {
            record,
            strings,
            resources,
        }
    }

    /// Resource ID of the attribute's name, looked up positionally in the resource map.
    /// `0` when the document has no resource map or the name index is not mapped.
    pub fn name_resource_id(&self) -> i32 {
        self.resources
            .map(|map| map.resource_id(self.record.name_id))
            .unwrap_or(0)
    }

    pub fn name(&self) -> ApkResult<String> {
        self.strings.get_string(self.record.name_id)
    }

    pub fn namespace(&self) -> ApkResult<String> {
        if self.record.ns_id == NO_NAMESPACE {
            return Ok(String::new());
        }
        self.strings.get_string(self.record.ns_id)
    }

    /// The raw `Res_value` data type.
    pub fn raw_value_type(&self) -> u8 {
        self.record.value_type
    }

    pub fn value_type(&self) -> ValueType {
        ValueType::from_raw(self.record.value_type)
    }

    pub fn int_value(&self) -> ApkResult<i32> {
        match self.record.value_type {
            TYPE_REFERENCE | TYPE_INT_DEC | TYPE_INT_HEX | TYPE_INT_BOOLEAN => {
                Ok(self.record.value_data as i32)
            }
            other => fail!(
                UnresolvableAttribute,
                "Cannot coerce to int: value type 0x{:02x}",
                other
            ),
        }
    }

    pub fn boolean_value(&self) -> ApkResult<bool> {
        match self.record.value_type {
            TYPE_INT_BOOLEAN => Ok(self.record.value_data != 0),
            other => fail!(
                UnresolvableAttribute,
                "Cannot coerce to boolean: value type 0x{:02x}",
                other
            ),
        }
    }

    pub fn string_value(&self) -> ApkResult<String> {
        let data = self.record.value_data;
        match self.record.value_type {
            TYPE_STRING => self.strings.get_string(data),
            TYPE_INT_DEC => Ok((data as i32).to_string()),
            TYPE_INT_HEX => Ok(format!("0x{data:08x}")),
            TYPE_INT_BOOLEAN => Ok(if data != 0 { "true" } else { "false" }.to_string()),
            TYPE_REFERENCE => Ok(format!("@{data:08x}")),
            other => fail!(
                UnresolvableAttribute,
                "Cannot coerce to string: value type 0x{:02x}",
                other
            ),
        }
    }
}
