use std::collections::BTreeSet;

use crate::error::{Result, SplitError};

/// A client-supplied filename reduced to something safe to put on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadName {
    /// Full sanitized name, e.g. `my_song.mp3`.
    pub sanitized: String,
    /// Sanitized name without its extension.
    pub base: String,
    /// Lower-cased extension without the dot.
    pub extension: String,
}

/// Strips path components and anything outside `[A-Za-z0-9_.-]`.
///
/// Whitespace runs become a single `_`, path separators count as whitespace,
/// and leading or trailing `.`/`_` are trimmed. May return an empty string.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Lower-cased extension after the last dot, if any.
pub fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn allowed_file(name: &str, allowed: &BTreeSet<String>) -> bool {
    extension_of(name).is_some_and(|ext| allowed.contains(&ext))
}

/// Checks an upload's filename before any decoding is attempted.
pub fn validate_upload(name: &str, allowed: &BTreeSet<String>) -> Result<UploadName> {
    if name.trim().is_empty() {
        return Err(SplitError::MissingFile);
    }
    if !allowed_file(name, allowed) {
        return Err(SplitError::InvalidInput("Invalid file format".into()));
    }

    let mut sanitized = secure_filename(name);
    let extension = extension_of(&sanitized)
        .filter(|ext| allowed.contains(ext))
        .or_else(|| extension_of(name))
        .unwrap_or_default();

    let base = match sanitized.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => base.to_string(),
        _ => String::new(),
    };
    let base = if base.is_empty() {
        sanitized = format!("upload.{extension}");
        "upload".to_string()
    } else {
        base
    };

    Ok(UploadName {
        sanitized,
        base,
        extension,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ALLOWED_EXTENSIONS;

    fn allowed() -> BTreeSet<String> {
        DEFAULT_ALLOWED_EXTENSIONS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn secure_filename_strips_paths_and_symbols() {
        assert_eq!(secure_filename("My cool song.mp3"), "My_cool_song.mp3");
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("  tr@ck#1 (live).wav"), "trck1_live.wav");
        assert_eq!(secure_filename("..."), "");
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(allowed_file("a.FLAC", &allowed()));
        assert!(allowed_file("a.b.m4a", &allowed()));
        assert!(!allowed_file("noext", &allowed()));
        assert!(!allowed_file("a.exe", &allowed()));
    }

    #[test]
    fn validate_upload_splits_base_and_extension() {
        let name = validate_upload("Lead Vocals.WAV", &allowed()).unwrap();
        assert_eq!(name.sanitized, "Lead_Vocals.WAV");
        assert_eq!(name.base, "Lead_Vocals");
        assert_eq!(name.extension, "wav");
    }

    #[test]
    fn validate_upload_falls_back_when_base_is_stripped() {
        let name = validate_upload("日本語.mp3", &allowed()).unwrap();
        assert_eq!(name.base, "upload");
        assert_eq!(name.sanitized, "upload.mp3");
        assert_eq!(name.extension, "mp3");
    }

    #[test]
    fn validate_upload_rejects_bad_names() {
        assert!(matches!(
            validate_upload("", &allowed()),
            Err(SplitError::MissingFile)
        ));
        assert!(matches!(
            validate_upload("malware.exe", &allowed()),
            Err(SplitError::InvalidInput(_))
        ));
    }
}
