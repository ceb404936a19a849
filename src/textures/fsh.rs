//! FSH ("SHPI") texture container: a 16-byte header, a directory of 4-byte
//! named entries, and one chunk chain per entry.

use tracing::debug;
use winnow::Parser;
use winnow::binary::{le_i32, le_u32};
use winnow::token::take;

use crate::data::ByteCursor;
use crate::data::parser_utils::WResult;
use crate::error::{DecodeError, DecodeResult};
use crate::textures::bitmap::DecodedImage;
use crate::textures::chunk::decode_entry;

/// "SHPI" read as a little-endian u32.
pub const FSH_MAGIC: u32 = 0x49504853;

const HEADER_SIZE: usize = 0x10;
const DIR_ENTRY_SIZE: usize = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FshHeader {
    pub magic: u32,
    pub file_size: i32,
    pub entry_count: i32,
    pub directory_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FshDirEntry {
    pub name: String,
    pub offset: i32,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FshFile<'a> {
    #[cfg_attr(feature = "serde", serde(skip))]
    data: &'a [u8],
    pub header: FshHeader,
    pub directory: Vec<FshDirEntry>,
}

fn parse_header(input: &mut &[u8]) -> WResult<FshHeader> {
    (le_u32, le_i32, le_i32, le_u32)
        .map(|(magic, file_size, entry_count, directory_id)| FshHeader {
            magic,
            file_size,
            entry_count,
            directory_id,
        })
        .parse_next(input)
}

fn parse_dir_entry(input: &mut &[u8]) -> WResult<FshDirEntry> {
    (take(4usize), le_i32)
        .map(|(name, offset): (&[u8], i32)| FshDirEntry {
            name: String::from_utf8_lossy(name)
                .trim_end_matches('\0')
                .to_string(),
            offset,
        })
        .parse_next(input)
}

/// Parse the container header and directory. Entries are decoded on demand.
pub fn parse_fsh(file_data: &[u8]) -> DecodeResult<FshFile<'_>> {
    let mut cursor = ByteCursor::new(file_data);
    let header = cursor.parse(HEADER_SIZE, parse_header)?;
    if header.magic != FSH_MAGIC {
        return Err(DecodeError::MalformedHeader {
            what: "FSH magic",
            offset: 0,
            expected: FSH_MAGIC,
            found: header.magic,
        });
    }
    if header.entry_count < 0 {
        return Err(DecodeError::NegativeEntryCount {
            count: header.entry_count,
        });
    }

    let directory = (0..header.entry_count)
        .map(|_| cursor.parse(DIR_ENTRY_SIZE, parse_dir_entry))
        .collect::<DecodeResult<Vec<_>>>()?;
    debug!(
        entries = directory.len(),
        directory_id = header.directory_id,
        "parsed FSH directory"
    );

    Ok(FshFile {
        data: file_data,
        header,
        directory,
    })
}

impl<'a> FshFile<'a> {
    pub fn decode_entry(&self, entry: &FshDirEntry) -> DecodeResult<DecodedImage> {
        let offset = usize::try_from(entry.offset).map_err(|_| DecodeError::OffsetOutOfRange {
            what: "entry",
            offset: entry.offset as u32 as usize,
            len: self.data.len(),
        })?;
        debug!(name = %entry.name, offset, "decoding entry");
        decode_entry(self.data, offset)
    }

    /// Decode every entry in directory order. A failed entry does not stop
    /// the others.
    pub fn entries(&self) -> impl Iterator<Item = (&FshDirEntry, DecodeResult<DecodedImage>)> {
        self.directory
            .iter()
            .map(|entry| (entry, self.decode_entry(entry)))
    }
}

/// Decode the first entry of a container, if it has any.
pub fn load_first_image(file_data: &[u8]) -> DecodeResult<Option<DecodedImage>> {
    let fsh = parse_fsh(file_data)?;
    fsh.directory
        .first()
        .map(|entry| fsh.decode_entry(entry))
        .transpose()
}

/// Decode every entry, failing on the first entry that does not decode.
pub fn load_all_images(file_data: &[u8]) -> DecodeResult<Vec<DecodedImage>> {
    let fsh = parse_fsh(file_data)?;
    fsh.entries().map(|(_, image)| image).collect()
}

/// Builds synthetic texture containers for tests.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// `entries` are (name, chunk chain bytes).
    pub fn build_fsh(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&FSH_MAGIC.to_le_bytes());
        data.extend_from_slice(&0i32.to_le_bytes());
        data.extend_from_slice(&(entries.len() as i32).to_le_bytes());
        data.extend_from_slice(b"GIMX");

        let mut offset = HEADER_SIZE + entries.len() * DIR_ENTRY_SIZE;
        for (name, chain) in entries {
            let mut tag = [0u8; 4];
            tag[..name.len()].copy_from_slice(name.as_bytes());
            data.extend_from_slice(&tag);
            data.extend_from_slice(&(offset as i32).to_le_bytes());
            offset += chain.len();
        }
        for (_, chain) in entries {
            data.extend_from_slice(chain);
        }
        let size = data.len() as i32;
        data[4..8].copy_from_slice(&size.to_le_bytes());
        data
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::textures::chunk::ChunkKind;
    use crate::textures::chunk::test_support::*;

    fn gray_entry(index: u8) -> Vec<u8> {
        let mut chain = chunk(ChunkKind::Indexed8, &indexed8(1, 1, &[index]), false);
        chain.extend(chunk(
            ChunkKind::PaletteArgb32,
            &argb_palette(&[[0, 0, 0, 0xFF], [0x80, 0x80, 0x80, 0xFF]]),
            false,
        ));
        chain.extend(name_chunk("gray"));
        chain
    }

    #[test]
    fn parses_directory_and_decodes_entries() {
        let data = build_fsh(&[("wal0", gray_entry(1)), ("ab", gray_entry(0))]);
        let fsh = parse_fsh(&data).unwrap();
        assert_eq!(fsh.header.entry_count, 2);
        assert_eq!(fsh.header.file_size as usize, data.len());
        assert_eq!(fsh.directory[0].name, "wal0");
        assert_eq!(fsh.directory[1].name, "ab");

        let images: Vec<_> = fsh.entries().map(|(_, image)| image.unwrap()).collect();
        assert_eq!(images[0].pixels, vec![[0x80, 0x80, 0x80, 0xFF]]);
        assert_eq!(images[1].pixels, vec![[0, 0, 0, 0xFF]]);
        assert_eq!(images[0].label.as_deref(), Some("gray"));
    }

    #[test]
    fn bad_magic_is_malformed() {
        let mut data = build_fsh(&[]);
        data[0] = b'X';
        assert!(matches!(
            parse_fsh(&data),
            Err(DecodeError::MalformedHeader {
                what: "FSH magic",
                ..
            })
        ));
    }

    #[test]
    fn negative_entry_count_is_rejected() {
        let mut data = build_fsh(&[]);
        data[8..12].copy_from_slice(&(-1i32).to_le_bytes());
        assert_eq!(
            parse_fsh(&data).unwrap_err(),
            DecodeError::NegativeEntryCount { count: -1 }
        );
    }

    #[test]
    fn failed_entry_does_not_hide_the_rest() {
        let broken = chunk(ChunkKind::Rgb565, &[], true);
        let data = build_fsh(&[("bad", broken), ("good", gray_entry(1))]);
        let fsh = parse_fsh(&data).unwrap();

        let results: Vec<_> = fsh.entries().collect();
        assert!(matches!(
            results[0].1,
            Err(DecodeError::UnsupportedChunkKind { .. })
        ));
        assert!(results[1].1.is_ok());

        assert!(load_all_images(&data).is_err());
        assert!(load_first_image(&data).is_err());
    }

    #[test]
    fn empty_container_has_no_first_image() {
        assert_eq!(load_first_image(&build_fsh(&[])), Ok(None));
    }

    #[test]
    fn negative_entry_offset_is_out_of_range() {
        let mut data = build_fsh(&[("neg", gray_entry(0))]);
        data[0x14..0x18].copy_from_slice(&(-4i32).to_le_bytes());
        let fsh = parse_fsh(&data).unwrap();
        assert!(matches!(
            fsh.decode_entry(&fsh.directory[0]),
            Err(DecodeError::OffsetOutOfRange { what: "entry", .. })
        ));
    }
}
