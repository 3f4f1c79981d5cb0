//! Environment variable handling.

use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable as a u16 (e.g., for ports).
pub fn get_u16(name: &str) -> Option<u16> {
    get_var(name).and_then(|v| v.parse().ok())
}

/// Common environment variable names.
pub mod vars {
    /// wabridge home directory override.
    pub const WABRIDGE_HOME: &str = "WABRIDGE_HOME";

    /// wabridge config file override.
    pub const WABRIDGE_CONFIG: &str = "WABRIDGE_CONFIG";

    /// Gateway port override.
    pub const WABRIDGE_PORT: &str = "WABRIDGE_PORT";

    /// Mapping database URL override.
    pub const WABRIDGE_DATABASE_URL: &str = "WABRIDGE_DATABASE_URL";

    /// Gateway admin token.
    pub const WABRIDGE_AUTH_TOKEN: &str = "WABRIDGE_AUTH_TOKEN";

    /// Log filter.
    pub const WABRIDGE_LOG: &str = "WABRIDGE_LOG";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_unset() {
        env::set_var("WABRIDGE_TEST_EMPTY", "");
        assert_eq!(get_var("WABRIDGE_TEST_EMPTY"), None);
        assert_eq!(get_u16("WABRIDGE_TEST_EMPTY"), None);
    }

    #[test]
    fn test_get_u16() {
        env::set_var("WABRIDGE_TEST_PORT", "9191");
        env::set_var("WABRIDGE_TEST_PORT_BAD", "99999");
        assert_eq!(get_u16("WABRIDGE_TEST_PORT"), Some(9191));
        assert_eq!(get_u16("WABRIDGE_TEST_PORT_BAD"), None);
    }
}
