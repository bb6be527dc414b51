use crate::StoreError;

/// Longest accepted file id (hex SHA-256 is 64 chars; leave headroom for
/// externally assigned ids).
const MAX_FILE_ID_LEN: usize = 128;

/// Validates that a file id is a single safe path component.
///
/// Rejects empty ids, path separators, `.`/`..`, and anything outside
/// `[A-Za-z0-9._-]` so an id can never escape the store root.
pub fn validate_file_id(file_id: &str) -> Result<(), StoreError> {
    if file_id.is_empty() {
        return Err(StoreError::InvalidFileId("empty id".into()));
    }
    if file_id.len() > MAX_FILE_ID_LEN {
        return Err(StoreError::InvalidFileId(format!(
            "id too long: {} chars (max {MAX_FILE_ID_LEN})",
            file_id.len()
        )));
    }
    if file_id == "." || file_id == ".." {
        return Err(StoreError::InvalidFileId(format!(
            "id must not be a dot component: {file_id}"
        )));
    }
    if let Some(bad) = file_id
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '-'))
    {
        return Err(StoreError::InvalidFileId(format!(
            "illegal character {bad:?} in id: {file_id}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hex_digest_id() {
        assert!(validate_file_id(&"ab".repeat(32)).is_ok());
    }

    #[test]
    fn accepts_plain_names() {
        assert!(validate_file_id("file-1").is_ok());
        assert!(validate_file_id("data_set.v2").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(validate_file_id("").is_err());
    }

    #[test]
    fn rejects_separators() {
        assert!(validate_file_id("a/b").is_err());
        assert!(validate_file_id("a\\b").is_err());
    }

    #[test]
    fn rejects_dot_components() {
        assert!(validate_file_id(".").is_err());
        assert!(validate_file_id("..").is_err());
    }

    #[test]
    fn rejects_traversal_attempts() {
        assert!(validate_file_id("../../etc/passwd").is_err());
    }

    #[test]
    fn rejects_overlong_id() {
        assert!(validate_file_id(&"a".repeat(129)).is_err());
    }
}
