//! Naming rules shared by the scanner, packer and installer.
//!
//! A serial is the title identifier embedded in a save folder or
//! savestate name. An archive produced by [`crate::packer::Packer::pack`] carries
//! exactly one top-level entry, and that entry's name is the identity key
//! used when the archive is installed again.

use crate::{error::NameError, library::ArtifactType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerialPattern {
    /// Four uppercase letters followed by five digits, e.g. `BLES01234`.
    TitleId,
    /// Everything before the first delimiter.
    Delimited { delimiter: char },
    /// The first `len` characters, all ASCII alphanumeric.
    FixedLength { len: usize },
}

impl Default for SerialPattern {
    fn default() -> Self {
        SerialPattern::TitleId
    }
}

const TITLE_ID_LETTERS: usize = 4;
const TITLE_ID_DIGITS: usize = 5;
const LABEL_SEPARATORS: [char; 3] = ['_', '-', ' '];

impl SerialPattern {
    fn serial_len(&self, name: &str) -> Option<usize> {
        match self {
            SerialPattern::TitleId => {
                let bytes = name.as_bytes();
                let len = TITLE_ID_LETTERS + TITLE_ID_DIGITS;
                if bytes.len() < len {
                    return None;
                }
                let letters = bytes[..TITLE_ID_LETTERS]
                    .iter()
                    .all(|byte| byte.is_ascii_uppercase());
                let digits = bytes[TITLE_ID_LETTERS..len]
                    .iter()
                    .all(|byte| byte.is_ascii_digit());
                (letters && digits).then_some(len)
            }
            SerialPattern::Delimited { delimiter } => {
                let end = name.find(*delimiter)?;
                (end > 0).then_some(end)
            }
            SerialPattern::FixedLength { len } => {
                if *len == 0 || name.len() < *len || !name.is_char_boundary(*len) {
                    return None;
                }
                name[..*len]
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric())
                    .then_some(*len)
            }
        }
    }
}

pub fn serial_from_artifact_name(pattern: &SerialPattern, name: &str) -> Result<String, NameError> {
    pattern
        .serial_len(name)
        .map(|len| name[..len].to_string())
        .ok_or_else(|| NameError::UnrecognizedName(name.to_string()))
}

/// The part of `name` after its serial, or the full name when nothing follows.
pub fn artifact_label(pattern: &SerialPattern, name: &str) -> String {
    let Some(len) = pattern.serial_len(name) else {
        return name.to_string();
    };
    let rest = &name[len..];
    let rest = rest
        .strip_prefix(|ch: char| LABEL_SEPARATORS.contains(&ch))
        .unwrap_or(rest);
    if rest.is_empty() {
        name.to_string()
    } else {
        rest.to_string()
    }
}

/// Resolves the single top-level name from the entry names of an archive.
///
/// Entry names use `/` separators; `a/b.dat` and `a/` both contribute `a`.
pub fn artifact_name_from_archive_top_entry<I, S>(entries: I) -> Result<String, NameError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tops: Vec<String> = Vec::new();
    for entry in entries {
        let Some(top) = top_component(entry.as_ref()) else {
            continue;
        };
        if !tops.iter().any(|existing| existing == top) {
            tops.push(top.to_string());
        }
    }

    match tops.len() {
        0 => Err(NameError::EmptyArchive),
        1 => Ok(tops.remove(0)),
        _ => Err(NameError::AmbiguousArchive(tops)),
    }
}

fn top_component(entry: &str) -> Option<&str> {
    entry
        .split(['/', '\\'])
        .find(|part| !part.is_empty() && *part != ".")
}

/// Replaces runs of characters outside `[A-Za-z0-9_.-]` with `_`.
pub fn safe_object_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || ch == '-' {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Storage key for an uploaded archive: `<emulator>/<serial>/<type>/<millis>_<name>.zip`.
pub fn object_key(
    emulator: &str,
    serial: &str,
    artifact_type: ArtifactType,
    name: &str,
    created_millis: i64,
) -> String {
    format!(
        "{emulator}/{serial}/{}/{created_millis}_{}.zip",
        artifact_type.as_str(),
        safe_object_name(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_id_pattern_reads_ps3_names() {
        let pattern = SerialPattern::TitleId;
        assert_eq!(
            serial_from_artifact_name(&pattern, "BLES01234_save1").unwrap(),
            "BLES01234"
        );
        assert_eq!(
            serial_from_artifact_name(&pattern, "NPUB30910SAVE00").unwrap(),
            "NPUB30910"
        );
        assert_eq!(
            serial_from_artifact_name(&pattern, "BLUS30443").unwrap(),
            "BLUS30443"
        );
    }

    #[test]
    fn title_id_pattern_rejects_other_names() {
        let pattern = SerialPattern::TitleId;
        for name in ["", "bles01234_save", "BLE01234", "BLESX1234", ".DS_Store"] {
            assert_eq!(
                serial_from_artifact_name(&pattern, name),
                Err(NameError::UnrecognizedName(name.to_string())),
                "{name}"
            );
        }
    }

    #[test]
    fn delimited_and_fixed_patterns() {
        let delimited = SerialPattern::Delimited { delimiter: '_' };
        assert_eq!(
            serial_from_artifact_name(&delimited, "SLUS20062_memcard").unwrap(),
            "SLUS20062"
        );
        assert!(serial_from_artifact_name(&delimited, "_leading").is_err());
        assert!(serial_from_artifact_name(&delimited, "nodelimiter").is_err());

        let fixed = SerialPattern::FixedLength { len: 4 };
        assert_eq!(serial_from_artifact_name(&fixed, "AB12rest").unwrap(), "AB12");
        assert!(serial_from_artifact_name(&fixed, "AB-2rest").is_err());
        assert!(serial_from_artifact_name(&fixed, "AB").is_err());
    }

    #[test]
    fn label_strips_serial_and_one_separator() {
        let pattern = SerialPattern::TitleId;
        assert_eq!(artifact_label(&pattern, "BLES01234_save1"), "save1");
        assert_eq!(artifact_label(&pattern, "BLES01234_state1.sta"), "state1.sta");
        assert_eq!(artifact_label(&pattern, "NPUB30910SAVE00"), "SAVE00");
        assert_eq!(artifact_label(&pattern, "BLES01234"), "BLES01234");
        assert_eq!(artifact_label(&pattern, "unrelated"), "unrelated");
    }

    #[test]
    fn top_entry_resolution() {
        assert_eq!(
            artifact_name_from_archive_top_entry(["BLES01234_save1/", "BLES01234_save1/a.dat"])
                .unwrap(),
            "BLES01234_save1"
        );
        assert_eq!(
            artifact_name_from_archive_top_entry(["state.sta"]).unwrap(),
            "state.sta"
        );
        assert_eq!(
            artifact_name_from_archive_top_entry(Vec::<String>::new()),
            Err(NameError::EmptyArchive)
        );
        assert_eq!(
            artifact_name_from_archive_top_entry(["a/x", "b/y", "a/z"]),
            Err(NameError::AmbiguousArchive(vec![
                "a".to_string(),
                "b".to_string()
            ]))
        );
    }

    #[test]
    fn object_keys_are_sanitized() {
        assert_eq!(safe_object_name("Save #1 (copy)"), "Save_1_copy_");
        assert_eq!(
            object_key("rpcs3", "BLES01234", ArtifactType::Save, "BLES01234 save", 1700),
            "rpcs3/BLES01234/save/1700_BLES01234_save.zip"
        );
    }
}
