//! `#EMB` texture containers: an indexed list of opaque blobs, usually DDS
//! images, with an optional file name table.

use crate::error::{Result, sanity, unencodable};
use crate::io::{Magic, Reader, pad_to, write_cstring, write_header_prefix};
use crate::offsets::{OffsetTable, Slot, read_table};
use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const EMB_MAGIC: Magic = *b"#EMB";
const HEADER_SIZE: u16 = 32;
const CONTENT_ENTRY_SIZE: usize = 8;
const DATA_ALIGNMENT: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbEntry {
    pub name: String,
    /// Raw blob. Left out of JSON dumps; `emb-extract` writes it to disk instead.
    #[serde(skip)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbFile {
    pub i_08: u16,
    pub i_10: u16,
    /// Whether the file carries a name table. Without one, entry names are
    /// synthesized from their position.
    pub use_file_names: bool,
    pub entries: Vec<EmbEntry>,
}

impl EmbFile {
    pub fn new(entries: Vec<EmbEntry>) -> Self {
        Self {
            i_08: 0,
            i_10: 0,
            use_file_names: true,
            entries,
        }
    }
}

pub fn synthetic_name(index: usize) -> String {
    format!("DATA{index:03}.dds")
}

/// Parses a container whose signature may sit behind a wrapper prefix; every
/// offset counts from the signature.
pub fn parse_emb(data: &[u8]) -> Result<EmbFile> {
    let base = data
        .windows(EMB_MAGIC.len())
        .position(|window| window == EMB_MAGIC)
        .unwrap_or(0);
    if base != 0 {
        debug!(base, "emb signature found behind a prefix");
    }
    let reader = Reader::new(&data[base..]);
    reader.expect_magic(EMB_MAGIC)?;
    let i_08 = reader.u16(8)?;
    let i_10 = reader.u16(10)?;
    let count = reader.u32(12)? as usize;
    let contents = reader.resolve(0, reader.u32(24)?)?;
    let names_at = reader.u32(28)?;
    debug!(entries = count, named = names_at != 0, "parsing emb");

    // two u32 per entry
    let table = read_table(&reader, contents, count.saturating_mul(2))?;
    let names = if names_at != 0 {
        read_table(&reader, reader.resolve(0, names_at)?, count)?
    } else {
        Vec::new()
    };

    let mut entries = Vec::with_capacity(count);
    for (index, pair) in table.chunks_exact(2).enumerate() {
        let entry = contents + CONTENT_ENTRY_SIZE * index;
        let start = reader.resolve(entry, pair[0])?;
        let data = reader.slice(start, pair[1] as usize)?.to_vec();
        let name = match names.get(index) {
            Some(&0) => String::new(),
            Some(&offset) => reader.cstring(reader.resolve(0, offset)?)?,
            None => synthetic_name(index),
        };
        entries.push(EmbEntry { name, data });
    }

    Ok(EmbFile {
        i_08,
        i_10,
        use_file_names: names_at != 0,
        entries,
    })
}

pub fn write_emb(emb: &EmbFile) -> Result<Vec<u8>> {
    let count = u32::try_from(emb.entries.len())
        .map_err(|_| sanity(format!("{} entries exceed u32", emb.entries.len())))?;

    let mut out = Vec::new();
    write_header_prefix(&mut out, EMB_MAGIC, HEADER_SIZE)?;
    out.write_u16::<LittleEndian>(emb.i_08)?;
    out.write_u16::<LittleEndian>(emb.i_10)?;
    out.write_u32::<LittleEndian>(count)?;
    out.write_u64::<LittleEndian>(0)?;
    let contents_slot = Slot::reserve(&mut out);
    let names_slot = Slot::reserve(&mut out);

    contents_slot.commit(&mut out, 0)?;
    let mut data_slots = Vec::with_capacity(emb.entries.len());
    for entry in &emb.entries {
        data_slots.push(Slot::reserve(&mut out));
        let size = u32::try_from(entry.data.len())
            .map_err(|_| unencodable(format!("entry {}", entry.name), "blob exceeds 4 GiB"))?;
        out.write_u32::<LittleEndian>(size)?;
    }

    if emb.use_file_names {
        names_slot.commit(&mut out, 0)?;
        let names = OffsetTable::reserve(&mut out, emb.entries.len());
        for (index, entry) in emb.entries.iter().enumerate() {
            names.commit(&mut out, index, 0)?;
            write_cstring(&mut out, &entry.name).map_err(|e| e.within(format!("entry {index}")))?;
        }
    }

    for (slot, entry) in data_slots.iter().zip(&emb.entries) {
        pad_to(&mut out, DATA_ALIGNMENT);
        slot.commit(&mut out, slot.position())?;
        out.extend_from_slice(&entry.data);
    }

    debug!(entries = count, bytes = out.len(), "wrote emb");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use pretty_assertions::assert_eq;

    fn container(use_file_names: bool) -> EmbFile {
        let mut emb = EmbFile::new(vec![
            EmbEntry {
                name: "GOK_000.dds".into(),
                data: b"DDS |first blob".to_vec(),
            },
            EmbEntry {
                name: "GOK_001.dds".into(),
                data: vec![7; 33],
            },
        ]);
        emb.use_file_names = use_file_names;
        emb
    }

    #[test]
    fn named_round_trip() {
        let emb = container(true);
        let bytes = write_emb(&emb).unwrap();
        assert_eq!(parse_emb(&bytes).unwrap(), emb);
    }

    #[test]
    fn data_pointers_are_relative_to_their_entry() {
        let bytes = write_emb(&container(true)).unwrap();
        let reader = Reader::new(&bytes);
        let contents = reader.u32(24).unwrap() as usize;
        let second = contents + 8;
        let start = second + reader.u32(second).unwrap() as usize;
        assert_eq!(start % 16, 0);
        assert_eq!(&bytes[start..start + 33], &[7; 33][..]);
    }

    #[test]
    fn unnamed_entries_get_positional_names() {
        let bytes = write_emb(&container(false)).unwrap();
        assert_eq!(Reader::new(&bytes).u32(28).unwrap(), 0);
        let decoded = parse_emb(&bytes).unwrap();
        assert!(!decoded.use_file_names);
        assert_eq!(decoded.entries[1].name, "DATA001.dds");
        assert_eq!(decoded.entries[1].data, vec![7; 33]);
    }

    #[test]
    fn oversized_entry_count_is_out_of_bounds() {
        let mut bytes = write_emb(&container(false)).unwrap();
        bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            parse_emb(&bytes),
            Err(CodecError::OffsetOutOfBounds { .. })
        ));

        let mut header = Vec::new();
        write_header_prefix(&mut header, EMB_MAGIC, HEADER_SIZE).unwrap();
        header.resize(32, 0);
        header[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        header[24..28].copy_from_slice(&32u32.to_le_bytes());
        assert!(matches!(
            parse_emb(&header),
            Err(CodecError::OffsetOutOfBounds { .. })
        ));
    }

    #[test]
    fn prefixed_container_is_read_from_its_signature() {
        let emb = container(true);
        let mut wrapped = b"#EMZ\0\0\0\0wrapper!".to_vec();
        wrapped.extend(write_emb(&emb).unwrap());
        assert_eq!(parse_emb(&wrapped).unwrap(), emb);
    }

    #[test]
    fn missing_signature_is_a_mismatch() {
        assert!(matches!(
            parse_emb(&[0u8; 40]),
            Err(CodecError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn truncated_blob_is_out_of_bounds() {
        let bytes = write_emb(&container(true)).unwrap();
        assert!(matches!(
            parse_emb(&bytes[..bytes.len() - 1]),
            Err(CodecError::OffsetOutOfBounds { .. })
        ));
    }
}
