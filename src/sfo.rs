use std::{fs, path::Path};

const MAGIC: &[u8; 4] = b"\0PSF";
const HEADER_LEN: usize = 20;
const INDEX_ENTRY_LEN: usize = 16;
const FMT_UTF8: u16 = 0x0204;
const FMT_UTF8_SPECIAL: u16 = 0x0004;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfoEntry {
    pub key: String,
    pub value: SfoValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SfoValue {
    Text(String),
    Int(u32),
}

/// Reads the `TITLE` key from a PARAM.SFO file. Any failure yields `None`.
pub fn read_title(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    parse_title(&bytes)
}

pub fn parse_title(bytes: &[u8]) -> Option<String> {
    parse_entries(bytes)?
        .into_iter()
        .find(|entry| entry.key == "TITLE")
        .and_then(|entry| match entry.value {
            SfoValue::Text(text) => {
                let text = text.trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            SfoValue::Int(_) => None,
        })
}

pub fn parse_entries(bytes: &[u8]) -> Option<Vec<SfoEntry>> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return None;
    }
    let key_table = read_u32(bytes, 8)? as usize;
    let data_table = read_u32(bytes, 12)? as usize;
    let count = read_u32(bytes, 16)? as usize;

    let mut out = Vec::with_capacity(count.min(64));
    for index in 0..count {
        let start = HEADER_LEN + index * INDEX_ENTRY_LEN;
        let entry = bytes.get(start..start + INDEX_ENTRY_LEN)?;
        let key_offset = u16::from_le_bytes([entry[0], entry[1]]) as usize;
        let fmt = u16::from_le_bytes([entry[2], entry[3]]);
        let data_len = read_u32(entry, 4)? as usize;
        let data_offset = read_u32(entry, 12)? as usize;

        let key = read_cstr(bytes, key_table.checked_add(key_offset)?)?;
        let data_start = data_table.checked_add(data_offset)?;
        let data = bytes.get(data_start..data_start.checked_add(data_len)?)?;
        let value = match fmt {
            FMT_UTF8 | FMT_UTF8_SPECIAL => {
                let end = data.iter().position(|byte| *byte == 0).unwrap_or(data.len());
                SfoValue::Text(String::from_utf8_lossy(&data[..end]).into_owned())
            }
            _ => SfoValue::Int(read_u32(data, 0)?),
        };
        out.push(SfoEntry { key, value });
    }

    Some(out)
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(raw.try_into().ok()?))
}

fn read_cstr(bytes: &[u8], offset: usize) -> Option<String> {
    let tail = bytes.get(offset..)?;
    let end = tail.iter().position(|byte| *byte == 0)?;
    Some(String::from_utf8_lossy(&tail[..end]).into_owned())
}

#[cfg(test)]
pub(crate) fn build_sfo(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut keys = Vec::new();
    let mut data = Vec::new();
    let mut index = Vec::new();
    for (key, value) in entries {
        let key_offset = keys.len() as u16;
        keys.extend_from_slice(key.as_bytes());
        keys.push(0);
        let mut raw = value.as_bytes().to_vec();
        raw.push(0);
        let data_offset = data.len() as u32;
        let len = raw.len() as u32;
        data.extend_from_slice(&raw);
        while data.len() % 4 != 0 {
            data.push(0);
        }
        index.extend_from_slice(&key_offset.to_le_bytes());
        index.extend_from_slice(&FMT_UTF8.to_le_bytes());
        index.extend_from_slice(&len.to_le_bytes());
        index.extend_from_slice(&len.to_le_bytes());
        index.extend_from_slice(&data_offset.to_le_bytes());
    }
    while keys.len() % 4 != 0 {
        keys.push(0);
    }

    let key_table = (HEADER_LEN + index.len()) as u32;
    let data_table = key_table + keys.len() as u32;
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&0x0101u32.to_le_bytes());
    out.extend_from_slice(&key_table.to_le_bytes());
    out.extend_from_slice(&data_table.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    out.extend_from_slice(&index);
    out.extend_from_slice(&keys);
    out.extend_from_slice(&data);
    out
}
