// Join address parsing
// Converts `user:secret@host:port` into the cluster address and its credentials

/// Parsed form of a `user:secret@host:port` join string
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JoinAddress {
    /// Cluster address (`host:port`), never validated here
    pub host: String,
    /// User ID presented when joining
    pub user_id: String,
    /// Secret presented when joining
    pub secret: String,
}

/// Parse a join string of the form `[user[:secret]@]host`.
///
/// Splits once on the last `@`; without one the whole input is the host.
/// The credential part is split once on the first `:`, so a user ID without a
/// secret is legal. Parsing is permissive and never fails: missing segments
/// come back as empty strings and the host syntax is left to the network
/// endpoint.
pub fn parse_join_address(s: &str) -> JoinAddress {
    match s.rsplit_once('@') {
        None => JoinAddress {
            host: s.to_string(),
            ..Default::default()
        },
        Some((credentials, host)) => {
            let (user_id, secret) = credentials.split_once(':').unwrap_or((credentials, ""));
            JoinAddress {
                host: host.to_string(),
                user_id: user_id.to_string(),
                secret: secret.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_full_join_address() {
        let parsed = parse_join_address("arief:darmawan@host:3000");
        assert_eq!(parsed.host, "host:3000");
        assert_eq!(parsed.user_id, "arief");
        assert_eq!(parsed.secret, "darmawan");
    }

    #[test]
    fn test_host_only() {
        let parsed = parse_join_address("192.168.0.110:8080");
        assert_eq!(parsed.host, "192.168.0.110:8080");
        assert!(parsed.user_id.is_empty());
        assert!(parsed.secret.is_empty());
    }

    #[test]
    fn test_user_without_secret() {
        let parsed = parse_join_address("admin@localhost:8888");
        assert_eq!(parsed.host, "localhost:8888");
        assert_eq!(parsed.user_id, "admin");
        assert!(parsed.secret.is_empty());
    }

    #[test]
    fn test_secret_keeps_extra_colons() {
        let parsed = parse_join_address("u:a:b@localhost:8888");
        assert_eq!(parsed.user_id, "u");
        assert_eq!(parsed.secret, "a:b");
    }

    #[test]
    fn test_permissive_inputs() {
        assert_eq!(parse_join_address(""), JoinAddress::default());

        let parsed = parse_join_address("u:s@");
        assert!(parsed.host.is_empty());
        assert_eq!(parsed.user_id, "u");
        assert_eq!(parsed.secret, "s");

        let parsed = parse_join_address("@localhost:1");
        assert_eq!(parsed.host, "localhost:1");
        assert!(parsed.user_id.is_empty());
    }

    #[test]
    fn test_splits_on_last_at() {
        let parsed = parse_join_address("u:p@ss@localhost:8888");
        assert_eq!(parsed.host, "localhost:8888");
        assert_eq!(parsed.user_id, "u");
        assert_eq!(parsed.secret, "p@ss");
    }

    proptest! {
        #[test]
        fn prop_components_are_recovered(
            user in "[a-zA-Z0-9_.-]{1,16}",
            secret in "[a-zA-Z0-9:_.-]{0,32}",
            host in "[a-z0-9.-]{1,24}:[0-9]{1,5}",
        ) {
            let parsed = parse_join_address(&format!("{}:{}@{}", user, secret, host));
            prop_assert_eq!(parsed.user_id, user);
            prop_assert_eq!(parsed.secret, secret);
            prop_assert_eq!(parsed.host, host);
        }

        #[test]
        fn prop_without_at_is_host(input in "[^@]{0,40}") {
            let parsed = parse_join_address(&input);
            prop_assert_eq!(parsed.host, input);
            prop_assert!(parsed.user_id.is_empty());
            prop_assert!(parsed.secret.is_empty());
        }
    }
}
