use crate::error::{UmailError, UmailResult};

/// Maximum length of a pool or session name, in bytes
pub const MAX_NAME_LEN: usize = 128;

/// Check that a pool or session name is safe to use as a file name
/// inside the keys/sessions directory.
pub fn validate_name(name: &str) -> UmailResult<()> {
    if name.is_empty() {
        return Err(UmailError::InvalidName("name is empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(UmailError::InvalidName(format!(
            "\"{name}\" is longer than {MAX_NAME_LEN} bytes"
        )));
    }
    if name.starts_with('.') {
        return Err(UmailError::InvalidName(format!(
            "\"{name}\" must not start with '.'"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(UmailError::InvalidName(format!(
            "\"{name}\" contains invalid character {c:?}"
        )));
    }
    Ok(())
}
