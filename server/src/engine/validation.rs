/// Maximum command prefix length (matches the `prefix` column width).
pub const MAX_PREFIX_LENGTH: usize = 32;

/// Maximum language code length (matches the `lang` column width).
pub const MAX_LANG_LENGTH: usize = 8;

/// Validate a command prefix. Must be 1-32 chars with no whitespace.
pub fn validate_prefix(prefix: &str) -> Result<(), String> {
    if prefix.is_empty() {
        return Err("Prefix cannot be empty".into());
    }
    if prefix.chars().count() > MAX_PREFIX_LENGTH {
        return Err(format!(
            "Prefix too long (max {} characters)",
            MAX_PREFIX_LENGTH
        ));
    }
    if prefix.chars().any(char::is_whitespace) {
        return Err("Prefix cannot contain whitespace".into());
    }
    Ok(())
}

/// Validate a language code such as `en`, `pt-BR` or `zh-TW`.
pub fn validate_lang(lang: &str) -> Result<(), String> {
    if lang.is_empty() {
        return Err("Language code cannot be empty".into());
    }
    if lang.len() > MAX_LANG_LENGTH {
        return Err(format!(
            "Language code too long (max {} characters)",
            MAX_LANG_LENGTH
        ));
    }
    if !lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err("Language code can only contain letters, digits, and hyphens".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_prefixes() {
        assert!(validate_prefix("!tr").is_ok());
        assert!(validate_prefix("?").is_ok());
        assert!(validate_prefix(&"x".repeat(32)).is_ok());
    }

    #[test]
    fn test_invalid_prefixes() {
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("! tr").is_err());
        assert!(validate_prefix(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_valid_langs() {
        assert!(validate_lang("en").is_ok());
        assert!(validate_lang("pt-BR").is_ok());
        assert!(validate_lang("zh-TW").is_ok());
    }

    #[test]
    fn test_invalid_langs() {
        assert!(validate_lang("").is_err());
        assert!(validate_lang("english!").is_err());
        assert!(validate_lang("123456789").is_err());
    }
}
