use std::fs;
use std::io;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// 以臨時檔案搭配 rename 實現原子寫入。 / Writes through a sibling temp file followed by rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp_livepad");
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// 將使用者名稱轉為可用於檔名的字串。 / Encodes an owner name into a file-name-safe token.
pub fn owner_token(owner: &str) -> String {
    URL_SAFE_NO_PAD.encode(owner.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_creates_parents_and_leaves_no_temp_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("prefs.json");
        write_atomic(&path, b"{}").unwrap();
        write_atomic(&path, b"{\"v\":1}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"v\":1}");
        let names: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("prefs.json")]);
    }

    #[test]
    fn owner_tokens_are_file_name_safe() {
        let token = owner_token("a/b c?");
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(owner_token("alice"), owner_token("bob"));
    }
}
