//! The API endpoint URIs.

/// A plain text banner, useful for checking the server is up.
pub const ROOT: &str = "/";
/// Reports whether the database is reachable and how the server is configured.
pub const HEALTH: &str = "/health";
/// Reports the state of the cached verification key set (development only).
pub const DEBUG_KEY_SET: &str = "/debug/jwks";
/// Public lookup of whether an email address is registered.
pub const AUTH_STATUS: &str = "/auth/status";
/// Creates a family and an account for the caller.
pub const REGISTER: &str = "/auth/register";
/// Creates an account for the caller in an existing family.
pub const JOIN: &str = "/auth/join";
/// The caller's account.
pub const ME: &str = "/auth/me";
/// The caller's family balances.
pub const FAMILY_SUMMARY: &str = "/family/summary";
/// List or create the caller's family's savings goals.
pub const SAVINGS_GOALS: &str = "/savings-goals";
/// List or record the caller's family's transactions.
pub const TRANSACTIONS: &str = "/transactions";

// These tests are here so that we know when we call `Uri::from_shared` it will not panic.
#[cfg(test)]
mod endpoints_tests {
    use axum::http::Uri;

    use crate::endpoints;

    fn assert_endpoint_is_valid_uri(uri: &str) {
        assert!(uri.parse::<Uri>().is_ok(), "{uri} is not a valid URI");
    }

    #[test]
    fn endpoints_are_valid_uris() {
        assert_endpoint_is_valid_uri(endpoints::ROOT);
        assert_endpoint_is_valid_uri(endpoints::HEALTH);
        assert_endpoint_is_valid_uri(endpoints::DEBUG_KEY_SET);
        assert_endpoint_is_valid_uri(endpoints::AUTH_STATUS);
        assert_endpoint_is_valid_uri(endpoints::REGISTER);
        assert_endpoint_is_valid_uri(endpoints::JOIN);
        assert_endpoint_is_valid_uri(endpoints::ME);
        assert_endpoint_is_valid_uri(endpoints::FAMILY_SUMMARY);
        assert_endpoint_is_valid_uri(endpoints::SAVINGS_GOALS);
        assert_endpoint_is_valid_uri(endpoints::TRANSACTIONS);
    }
}
