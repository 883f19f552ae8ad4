//! Wire naming: every JSON object key crossing the bridge is lower snake_case.

use serde::{Deserialize, Serialize};

/// How object keys are rewritten on their way to and from the native core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingPolicy {
    /// Rewrite every key with [`wire_name`].
    #[default]
    SnakeCase,
    /// Leave keys exactly as serde produced them.
    Preserve,
}

impl NamingPolicy {
    /// Apply the policy to a single key.
    pub fn apply(self, ident: &str) -> String {
        match self {
            NamingPolicy::SnakeCase => wire_name(ident),
            NamingPolicy::Preserve => ident.to_owned(),
        }
    }
}

/// Map an identifier in any common casing to its lower snake_case wire name.
///
/// Word boundaries are a lower-or-digit to upper transition (`peerId`, `ipv4Addr`), the last
/// capital of an acronym followed by a lowercase letter (`HTTPServer` -> `http_server`), and any
/// `-`, `_` or whitespace. Already snake_case input is returned unchanged.
pub fn wire_name(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == '_' || c.is_whitespace() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    if out.ends_with('_') && !ident.ends_with('_') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_and_camel() {
        assert_eq!(wire_name("PeerId"), "peer_id");
        assert_eq!(wire_name("peerId"), "peer_id");
        assert_eq!(wire_name("knownPeers"), "known_peers");
        assert_eq!(wire_name("AutoAccept"), "auto_accept");
    }

    #[test]
    fn acronyms_and_digits() {
        assert_eq!(wire_name("HTTPServer"), "http_server");
        assert_eq!(wire_name("peerID"), "peer_id");
        assert_eq!(wire_name("Ipv4Addr"), "ipv4_addr");
        assert_eq!(wire_name("GetSharableQrCode"), "get_sharable_qr_code");
    }

    #[test]
    fn snake_is_fixed_point() {
        for ident in ["peer_id", "auto_accept", "ok", "err", "typ", "a_b_c"] {
            assert_eq!(wire_name(ident), ident);
            assert_eq!(wire_name(&wire_name(ident)), ident);
        }
    }

    #[test]
    fn separators_collapse() {
        assert_eq!(wire_name("session-id"), "session_id");
        assert_eq!(wire_name("Session Id"), "session_id");
        assert_eq!(wire_name("Session__Id"), "session_id");
    }

    #[test]
    fn preserve_policy_is_identity() {
        assert_eq!(NamingPolicy::Preserve.apply("peerId"), "peerId");
        assert_eq!(NamingPolicy::SnakeCase.apply("peerId"), "peer_id");
    }
}
