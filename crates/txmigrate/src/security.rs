//! Input checks for values that end up in SQL text or the tracking table
//!
//! The tracking table name is interpolated into statements, so it must be a
//! plain identifier. Migration ids are always bound as parameters and only
//! need to fit the tracking column.

/// Characters allowed in SQL identifiers (alphanumeric, underscore, dollar)
const ALLOWED_IDENTIFIER_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_$";

/// Length limit shared by identifiers and the `id` tracking column
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// SQL keywords that cannot be used as a table name
static SQL_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "FROM", "WHERE", "JOIN", "UNION", "DROP", "CREATE",
    "ALTER", "GRANT", "REVOKE", "TRUNCATE", "EXEC", "EXECUTE", "DECLARE", "TABLE", "INDEX",
    "PRIMARY", "KEY", "ORDER", "GROUP", "USER",
];

/// Validate that an identifier is safe to interpolate into SQL
///
/// Returns the reason on failure.
pub fn validate_identifier(identifier: &str) -> Result<(), String> {
    let first = match identifier.chars().next() {
        Some(c) => c,
        None => return Err("Identifier cannot be empty".to_string()),
    };

    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "Identifier '{}' is too long (max {} characters)",
            identifier, MAX_IDENTIFIER_LEN
        ));
    }

    if let Some(c) = identifier
        .chars()
        .find(|c| !ALLOWED_IDENTIFIER_CHARS.contains(*c))
    {
        return Err(format!(
            "Identifier '{}' contains invalid character '{}'",
            identifier, c
        ));
    }

    if first.is_ascii_digit() {
        return Err(format!(
            "Identifier '{}' cannot start with a number",
            identifier
        ));
    }

    let upper_identifier = identifier.to_uppercase();
    if SQL_KEYWORDS.contains(&upper_identifier.as_str()) {
        return Err(format!(
            "Identifier '{}' is a reserved SQL keyword",
            identifier
        ));
    }

    Ok(())
}

/// Validate that a migration id can be stored in the tracking table
pub fn validate_migration_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err("Migration id cannot be empty".to_string());
    }

    if id.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "Migration id is too long (max {} characters)",
            MAX_IDENTIFIER_LEN
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_identifier("migrations").is_ok());
        assert!(validate_identifier("schema_migrations").is_ok());
        assert!(validate_identifier("_history$1").is_ok());
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1migrations").is_err());
        assert!(validate_identifier("migrations; DROP TABLE users").is_err());
        assert!(validate_identifier("my-table").is_err());
        assert!(validate_identifier("select").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
        assert!(validate_identifier(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_migration_ids() {
        assert!(validate_migration_id("1").is_ok());
        assert!(validate_migration_id("20240101_create_courses").is_ok());
        assert!(validate_migration_id("").is_err());
        assert!(validate_migration_id("   ").is_err());
        assert!(validate_migration_id(&"9".repeat(64)).is_err());
    }
}
