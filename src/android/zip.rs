//! ZIP container structures needed to find entries of an APK: the End of Central Directory
//! (EOCD) record and the Central Directory records it points at.
//!
//! Only the structural metadata is decoded here. Entry decompression is left to the `zip`
//! crate, see [`crate::android::apk`].

use crate::android::buffer::ByteView;
use crate::error::{ApkError, ApkResult};
use bitflags::bitflags;
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::debug;
use nom::number::complete::{le_u16, le_u32};
use nom::sequence::tuple;
use nom::IResult;
use serde::{Deserialize, Serialize};
use std::io::Write;

pub const COMPRESSION_METHOD_STORED: u16 = 0;
pub const COMPRESSION_METHOD_DEFLATED: u16 = 8;

pub const ZIP_EOCD_REC_MIN_SIZE: usize = 22;
pub const ZIP_EOCD_REC_SIG: u32 = 0x0605_4b50;
const ZIP_EOCD_CENTRAL_DIR_OFFSET_FIELD_OFFSET: usize = 16;
const ZIP_EOCD_COMMENT_LENGTH_FIELD_OFFSET: usize = 20;

/// Largest EOCD comment, the comment length field being a u16.
pub const ZIP_EOCD_MAX_COMMENT_SIZE: usize = 0xffff;

pub const CENTRAL_DIRECTORY_RECORD_SIG: u32 = 0x0201_4b50;
pub const CENTRAL_DIRECTORY_HEADER_SIZE: usize = 46;
const LOCAL_FILE_HEADER_OFFSET_OFFSET: usize = 42;
const NAME_OFFSET: usize = CENTRAL_DIRECTORY_HEADER_SIZE;

bitflags! {
    /// General purpose bit flags of a ZIP entry.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct GpFlags: u16 {
        const DATA_DESCRIPTOR = 0x0008;
        /// Entry name and comment are UTF-8 (EFS).
        const UTF8_NAME = 0x0800;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct EocdHeader {
    signature: u32,
    total_record_count: u16,
    central_directory_size: u32,
    central_directory_offset: u32,
    comment_length: u16,
}

fn eocd_header(input: &[u8]) -> IResult<&[u8], EocdHeader> {
    let (
        input,
        (
            signature,
            _disk_number,
            _central_directory_disk,
            _disk_record_count,
            total_record_count,
            central_directory_size,
            central_directory_offset,
            comment_length,
        ),
    ) = tuple((le_u32, le_u16, le_u16, le_u16, le_u16, le_u32, le_u32, le_u16))(input)?;
    Ok((
        input,
        EocdHeader {
            signature,
            total_record_count,
            central_directory_size,
            central_directory_offset,
            comment_length,
        },
    ))
}

/// The ZIP End of Central Directory record, from its signature to the end of the file.
#[derive(Clone, Copy, Debug)]
pub struct EocdRecord<'a> {
    bytes: &'a [u8],
    offset: usize,
    header: EocdHeader,
}

impl<'a> EocdRecord<'a> {
    fn parse(bytes: &'a [u8], offset: usize) -> ApkResult<Self> {
        let (_, header) = eocd_header(bytes).map_err(|_| {
            err!(
                ZipFormat,
                "End of Central Directory record too short: {} bytes",
                bytes.len()
            )
        })?;
        if header.signature != ZIP_EOCD_REC_SIG {
            fail!(
                ZipFormat,
                "Not an End of Central Directory record. Signature: 0x{:08x}",
                header.signature
            );
        }
        Ok(EocdRecord {
            bytes,
            offset,
            header,
        })
    }

    /// Offset of the record in the file.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The record including its comment.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn central_directory_offset(&self) -> u32 {
        self.header.central_directory_offset
    }

    pub fn central_directory_size(&self) -> u32 {
        self.header.central_directory_size
    }

    pub fn central_directory_total_record_count(&self) -> u16 {
        self.header.total_record_count
    }

    pub fn comment_length(&self) -> u16 {
        self.header.comment_length
    }
}

/// Finds the End of Central Directory record of `zip`, `None` if there is none.
///
/// The record is variable-length because of its trailing comment, so it is searched backwards
/// from the end for a signature whose comment length field accounts for exactly the bytes
/// left in the file. Most APKs have no comment and are resolved by looking at the last 22
/// bytes only.
pub fn find_zip_end_of_central_directory_record(zip: &[u8]) -> Option<EocdRecord<'_>> {
    if zip.len() < ZIP_EOCD_REC_MIN_SIZE {
        return None;
    }
    find_eocd_with_max_comment(zip, 0)
        .or_else(|| find_eocd_with_max_comment(zip, ZIP_EOCD_MAX_COMMENT_SIZE))
}

fn find_eocd_with_max_comment(zip: &[u8], max_comment_size: usize) -> Option<EocdRecord<'_>> {
    if zip.len() < ZIP_EOCD_REC_MIN_SIZE {
        return None;
    }
    let max_comment_size = max_comment_size.min(zip.len() - ZIP_EOCD_REC_MIN_SIZE);
    let window_offset = zip.len() - ZIP_EOCD_REC_MIN_SIZE - max_comment_size;
    let window = ByteView::new(zip).slice(window_offset, zip.len()).ok()?;
    let position = find_eocd_position(&window)?;
    let eocd = window.slice(position, window.len()).ok()?;
    EocdRecord::parse(eocd.as_slice(), window_offset + position).ok()
}

/// Position of the EOCD record within `contents`, which must end where the file ends.
fn find_eocd_position(contents: &ByteView<'_>) -> Option<usize> {
    let size = contents.len();
    if size < ZIP_EOCD_REC_MIN_SIZE {
        return None;
    }
    let max_comment_length = (size - ZIP_EOCD_REC_MIN_SIZE).min(ZIP_EOCD_MAX_COMMENT_SIZE);
    let empty_comment_start = size - ZIP_EOCD_REC_MIN_SIZE;
    (0..=max_comment_length).find_map(|expected_comment_length| {
        let start = empty_comment_start - expected_comment_length;
        if contents.u32_at(start).ok()? != ZIP_EOCD_REC_SIG {
            return None;
        }
        let actual_comment_length = contents
            .u16_at(start + ZIP_EOCD_COMMENT_LENGTH_FIELD_OFFSET)
            .ok()? as usize;
        (actual_comment_length == expected_comment_length).then_some(start)
    })
}

/// Location of the main sections of a ZIP archive, taken from its EOCD record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipSections {
    pub central_directory_offset: usize,
    pub central_directory_size: usize,
    pub central_directory_record_count: usize,
    /// The EOCD record extends from here to the end of the archive.
    pub eocd_offset: usize,
}

impl ZipSections {
    /// The EOCD record these sections were read from.
    pub fn eocd<'a>(&self, zip: &'a [u8]) -> ApkResult<EocdRecord<'a>> {
        let bytes = ByteView::new(zip).slice(self.eocd_offset, zip.len())?;
        EocdRecord::parse(bytes.as_slice(), self.eocd_offset)
    }
}

/// Locates the Central Directory and EOCD record of `zip`.
pub fn find_zip_sections(zip: &[u8]) -> ApkResult<ZipSections> {
    let eocd = find_zip_end_of_central_directory_record(zip)
        .ok_or_else(|| err!(ZipFormat, "ZIP End of Central Directory record not found"))?;
    let eocd_offset = eocd.offset();

    let cd_start = eocd.central_directory_offset() as usize;
    if cd_start > eocd_offset {
        fail!(
            ZipFormat,
            "ZIP Central Directory start offset out of range: {}. ZIP End of Central Directory offset: {}",
            cd_start,
            eocd_offset
        );
    }
    let cd_size = eocd.central_directory_size() as usize;
    let cd_end = cd_start.saturating_add(cd_size);
    if cd_end > eocd_offset {
        fail!(
            ZipFormat,
            "ZIP Central Directory overlaps with End of Central Directory. CD end: {}, EoCD start: {}",
            cd_end,
            eocd_offset
        );
    }

    Ok(ZipSections {
        central_directory_offset: cd_start,
        central_directory_size: cd_size,
        central_directory_record_count: eocd.central_directory_total_record_count() as usize,
        eocd_offset,
    })
}

/// Patches the Central Directory offset of an EOCD record held in `eocd`.
pub fn set_eocd_central_directory_offset(eocd: &mut [u8], offset: u64) -> ApkResult<()> {
    let offset = checked_u32(offset)?;
    put_u32(eocd, ZIP_EOCD_CENTRAL_DIR_OFFSET_FIELD_OFFSET, offset)
}

/// Sets the comment length field of the EOCD record held in `eocd` to the number of bytes
/// following the fixed part of the record.
pub fn update_eocd_comment_length(eocd: &mut [u8]) -> ApkResult<()> {
    let comment_length = eocd.len().checked_sub(ZIP_EOCD_REC_MIN_SIZE).ok_or_else(|| {
        err!(
            ZipFormat,
            "End of Central Directory record too short: {} bytes",
            eocd.len()
        )
    })?;
    if comment_length > ZIP_EOCD_MAX_COMMENT_SIZE {
        fail!(ZipFormat, "uint16 value out of range: {}", comment_length);
    }
    put_u16(
        eocd,
        ZIP_EOCD_COMMENT_LENGTH_FIELD_OFFSET,
        comment_length as u16,
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CentralDirectoryHeader {
    signature: u32,
    gp_flags: u16,
    compression_method: u16,
    last_modification_time: u16,
    last_modification_date: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    name_size: u16,
    extra_size: u16,
    comment_size: u16,
    local_file_header_offset: u32,
}

fn central_directory_header(input: &[u8]) -> IResult<&[u8], CentralDirectoryHeader> {
    let (
        input,
        (
            signature,
            _version_made_by,
            _version_needed,
            gp_flags,
            compression_method,
            last_modification_time,
            last_modification_date,
            crc32,
            compressed_size,
            uncompressed_size,
            name_size,
            extra_size,
            comment_size,
            _disk_number,
            _internal_attributes,
            _external_attributes,
            local_file_header_offset,
        ),
    ) = tuple((
        le_u32, le_u16, le_u16, le_u16, le_u16, le_u16, le_u16, le_u32, le_u32, le_u32, le_u16,
        le_u16, le_u16, le_u16, le_u16, le_u32, le_u32,
    ))(input)?;
    Ok((
        input,
        CentralDirectoryHeader {
            signature,
            gp_flags,
            compression_method,
            last_modification_time,
            last_modification_date,
            crc32,
            compressed_size,
            uncompressed_size,
            name_size,
            extra_size,
            comment_size,
            local_file_header_offset,
        },
    ))
}

/// A ZIP Central Directory record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CentralDirectoryRecord {
    data: Vec<u8>,
    gp_flags: GpFlags,
    compression_method: u16,
    last_modification_time: u16,
    last_modification_date: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    local_file_header_offset: u32,
    name: String,
    name_size_bytes: usize,
}

impl CentralDirectoryRecord {
    /// Reads the record at the cursor of `buf` and moves the cursor past it.
    pub fn read(buf: &mut ByteView<'_>) -> ApkResult<Self> {
        if buf.remaining() < CENTRAL_DIRECTORY_HEADER_SIZE {
            fail!(
                ZipFormat,
                "Input too short. Need at least: {} bytes, available: {} bytes",
                CENTRAL_DIRECTORY_HEADER_SIZE,
                buf.remaining()
            );
        }
        let original_position = buf.position();
        let header_bytes = buf.bytes_at(original_position, CENTRAL_DIRECTORY_HEADER_SIZE)?;
        let (_, header) = central_directory_header(header_bytes).map_err(|_| {
            err!(
                ZipFormat,
                "Truncated Central Directory record at offset {}",
                buf.absolute_position()
            )
        })?;
        if header.signature != CENTRAL_DIRECTORY_RECORD_SIG {
            fail!(
                ZipFormat,
                "Not a Central Directory record. Signature: 0x{:08x}",
                header.signature
            );
        }

        let name_size = header.name_size as usize;
        let record_size = CENTRAL_DIRECTORY_HEADER_SIZE
            + name_size
            + header.extra_size as usize
            + header.comment_size as usize;
        if record_size > buf.remaining() {
            fail!(
                ZipFormat,
                "Input too short. Need: {} bytes, available: {} bytes",
                record_size,
                buf.remaining()
            );
        }
        let data = buf.read_bytes(record_size)?;
        let name_bytes = data.get(NAME_OFFSET..NAME_OFFSET + name_size).unwrap_or_default();
        let name = String::from_utf8_lossy(name_bytes).into_owned();

        Ok(CentralDirectoryRecord {
            data: data.to_vec(),
            gp_flags: GpFlags::from_bits_retain(header.gp_flags),
            compression_method: header.compression_method,
            last_modification_time: header.last_modification_time,
            last_modification_date: header.last_modification_date,
            crc32: header.crc32,
            compressed_size: header.compressed_size,
            uncompressed_size: header.uncompressed_size,
            local_file_header_offset: header.local_file_header_offset,
            name,
            name_size_bytes: name_size,
        })
    }

    /// Size of the whole record in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn copy_to(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.data);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_size_bytes(&self) -> usize {
        self.name_size_bytes
    }

    pub fn gp_flags(&self) -> GpFlags {
        self.gp_flags
    }

    pub fn compression_method(&self) -> u16 {
        self.compression_method
    }

    pub fn last_modification_time(&self) -> u16 {
        self.last_modification_time
    }

    pub fn last_modification_date(&self) -> u16 {
        self.last_modification_date
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn compressed_size(&self) -> u32 {
        self.compressed_size
    }

    pub fn uncompressed_size(&self) -> u32 {
        self.uncompressed_size
    }

    pub fn local_file_header_offset(&self) -> u32 {
        self.local_file_header_offset
    }

    /// A copy of this record pointing at a Local File Header at `local_file_header_offset`.
    pub fn create_with_modified_local_file_header_offset(
        &self,
        local_file_header_offset: u64,
    ) -> ApkResult<Self> {
        let offset = checked_u32(local_file_header_offset)?;
        let mut data = self.data.clone();
        put_u32(&mut data, LOCAL_FILE_HEADER_OFFSET_OFFSET, offset)?;
        Ok(CentralDirectoryRecord {
            data,
            local_file_header_offset: offset,
            name: self.name.clone(),
            ..*self
        })
    }

    /// A new record for a DEFLATE-compressed entry with a UTF-8 `name` and no extra field or
    /// comment.
    pub fn create_with_deflate_compressed_data(
        name: &str,
        last_modification_time: u16,
        last_modification_date: u16,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
        local_file_header_offset: u64,
    ) -> ApkResult<Self> {
        let gp_flags = GpFlags::UTF8_NAME;
        let name_size = name.len();
        if name_size > u16::MAX as usize {
            fail!(ZipFormat, "uint16 value out of range: {}", name_size);
        }
        let compressed_size = checked_u32(compressed_size)?;
        let uncompressed_size = checked_u32(uncompressed_size)?;
        let local_file_header_offset = checked_u32(local_file_header_offset)?;

        let mut data = Vec::with_capacity(CENTRAL_DIRECTORY_HEADER_SIZE + name_size);
        write_u32(&mut data, CENTRAL_DIRECTORY_RECORD_SIG);
        write_u16(&mut data, 0x14); // version made by
        write_u16(&mut data, 0x14); // version needed to extract
        write_u16(&mut data, gp_flags.bits());
        write_u16(&mut data, COMPRESSION_METHOD_DEFLATED);
        write_u16(&mut data, last_modification_time);
        write_u16(&mut data, last_modification_date);
        write_u32(&mut data, crc32);
        write_u32(&mut data, compressed_size);
        write_u32(&mut data, uncompressed_size);
        write_u16(&mut data, name_size as u16);
        write_u16(&mut data, 0); // extra field length
        write_u16(&mut data, 0); // comment length
        write_u16(&mut data, 0); // disk number
        write_u16(&mut data, 0); // internal attributes
        write_u32(&mut data, 0); // external attributes
        write_u32(&mut data, local_file_header_offset);
        data.extend_from_slice(name.as_bytes());

        Ok(CentralDirectoryRecord {
            data,
            gp_flags,
            compression_method: COMPRESSION_METHOD_DEFLATED,
            last_modification_time,
            last_modification_date,
            crc32,
            compressed_size,
            uncompressed_size,
            local_file_header_offset,
            name: name.to_string(),
            name_size_bytes: name_size,
        })
    }
}

/// Orders `records` by the offset of their Local File Header in the archive.
pub fn sort_by_local_file_header_offset(records: &mut [CentralDirectoryRecord]) {
    records.sort_by_key(|record| record.local_file_header_offset);
}

/// Decodes the Central Directory of `apk`, leaving out directory entries.
pub fn parse_central_directory(
    apk: &[u8],
    sections: &ZipSections,
) -> ApkResult<Vec<CentralDirectoryRecord>> {
    let cd_size = sections.central_directory_size;
    if cd_size > i32::MAX as usize {
        return Err(ApkError::apk_format(format!(
            "ZIP Central Directory too large: {}",
            cd_size
        )));
    }
    let cd_offset = sections.central_directory_offset;
    let mut cd = ByteView::new(apk)
        .slice(cd_offset, cd_offset.saturating_add(cd_size))
        .map_err(|e| ApkError::apk_format_caused_by("ZIP Central Directory out of bounds", e))?;

    let expected_record_count = sections.central_directory_record_count;
    let mut records = Vec::with_capacity(expected_record_count);
    for i in 0..expected_record_count {
        let offset_inside_cd = cd.position();
        let record = CentralDirectoryRecord::read(&mut cd).map_err(|e| {
            ApkError::apk_format_caused_by(
                format!(
                    "Malformed ZIP Central Directory record #{} at file offset {}",
                    i + 1,
                    cd_offset + offset_inside_cd
                ),
                e,
            )
        })?;
        if record.name().ends_with('/') {
            continue;
        }
        records.push(record);
    }
    if cd.has_remaining() {
        // Android ignores unused Central Directory data.
        debug!("ignoring {} trailing Central Directory bytes", cd.remaining());
    }
    Ok(records)
}

/// DEFLATE-compressed bytes with the CRC-32 and size of their uncompressed form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeflatedData {
    pub data: Vec<u8>,
    pub crc32: u32,
    pub uncompressed_size: u64,
}

impl DeflatedData {
    pub fn compress(input: &[u8]) -> ApkResult<Self> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(input)
            .map_err(|e| err!(ZipFormat, "DEFLATE compression failed: {}", e))?;
        let data = encoder
            .finish()
            .map_err(|e| err!(ZipFormat, "DEFLATE compression failed: {}", e))?;
        let mut crc = Crc32::new();
        crc.update(input);
        Ok(DeflatedData {
            data,
            crc32: crc.finalize(),
            uncompressed_size: input.len() as u64,
        })
    }

    /// A Central Directory record describing this data stored as `name`.
    pub fn central_directory_record(
        &self,
        name: &str,
        last_modification_time: u16,
        last_modification_date: u16,
        local_file_header_offset: u64,
    ) -> ApkResult<CentralDirectoryRecord> {
        CentralDirectoryRecord::create_with_deflate_compressed_data(
            name,
            last_modification_time,
            last_modification_date,
            self.crc32,
            self.data.len() as u64,
            self.uncompressed_size,
            local_file_header_offset,
        )
    }
}

fn checked_u32(value: u64) -> ApkResult<u32> {
    u32::try_from(value).map_err(|_| err!(ZipFormat, "uint32 value out of range: {}", value))
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) -> ApkResult<()> {
    put_bytes(buf, offset, &value.to_le_bytes())
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) -> ApkResult<()> {
    put_bytes(buf, offset, &value.to_le_bytes())
}

fn put_bytes(buf: &mut [u8], offset: usize, bytes: &[u8]) -> ApkResult<()> {
    let len = buf.len();
    match buf.get_mut(offset..offset + bytes.len()) {
        Some(target) => {
            target.copy_from_slice(bytes);
            Ok(())
        }
        None => fail!(
            BufferUnderflow,
            "Cannot write {} bytes at offset {} of {} byte buffer",
            bytes.len(),
            offset,
            len
        ),
    }
}

fn write_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}
