//! Pairing code: the bootstrap string shown as a scannable code or link.
//!
//! Format:
//!   pairlink://session?s=<32 hex sessionId>&k=<base64 key>&b=<relay address>
//!
//! All values are form-urlencoded. `s` and `k` are required; `b` falls back to
//! the caller's default relay address.

use pl_crypto::{is_valid_session_id, SessionKey};
use url::{form_urlencoded, Url};

pub const PAIRING_SCHEME: &str = "pairlink";
pub const PAIRING_HOST: &str = "session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCode {
    pub session_id: String,
    pub session_key: SessionKey,
    pub relay_address: String,
}

pub fn build_pairing_code(session_id: &str, session_key: &SessionKey, relay_address: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("s", session_id)
        .append_pair("k", &session_key.encode())
        .append_pair("b", relay_address)
        .finish();
    format!("{PAIRING_SCHEME}://{PAIRING_HOST}?{query}")
}

/// Parse a pairing code. Never fails loudly: any malformed input yields `None`.
pub fn parse_pairing_code(code: &str, default_relay: &str) -> Option<PairingCode> {
    let url = Url::parse(code.trim()).ok()?;
    if url.scheme() != PAIRING_SCHEME || url.host_str() != Some(PAIRING_HOST) {
        return None;
    }

    let mut session_id = None;
    let mut key = None;
    let mut relay = None;
    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "s" => session_id = Some(value.into_owned()),
            "k" => key = Some(value.into_owned()),
            "b" => relay = Some(value.into_owned()),
            _ => {}
        }
    }

    let session_id = session_id.filter(|id| is_valid_session_id(id))?;
    let session_key = SessionKey::decode(&key?).ok()?;
    let relay_address = relay
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| default_relay.to_string());

    Some(PairingCode {
        session_id,
        session_key,
        relay_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_crypto::generate_session_key;

    const DEFAULT_RELAY: &str = "wss://default.example";

    #[test]
    fn build_then_parse_returns_same_triple() {
        let id = "a".repeat(32);
        let key = generate_session_key();
        let code = build_pairing_code(&id, &key, "wss://relay.example");
        assert!(code.starts_with("pairlink://session?s="));

        let parsed = parse_pairing_code(&code, DEFAULT_RELAY).unwrap();
        assert_eq!(parsed.session_id, id);
        assert_eq!(parsed.session_key, key);
        assert_eq!(parsed.relay_address, "wss://relay.example");
    }

    #[test]
    fn relay_with_its_own_query_survives() {
        let key = generate_session_key();
        let relay = "wss://relay.example/ws?region=eu&v=2";
        let code = build_pairing_code(&"0f".repeat(16), &key, relay);
        assert_eq!(parse_pairing_code(&code, DEFAULT_RELAY).unwrap().relay_address, relay);
    }

    #[test]
    fn missing_relay_falls_back_to_default() {
        let key = generate_session_key();
        let code = format!(
            "pairlink://session?s={}&k={}",
            "b".repeat(32),
            form_urlencoded::byte_serialize(key.encode().as_bytes()).collect::<String>()
        );
        let parsed = parse_pairing_code(&code, DEFAULT_RELAY).unwrap();
        assert_eq!(parsed.relay_address, DEFAULT_RELAY);
    }

    #[test]
    fn malformed_codes_yield_none() {
        let key = generate_session_key();
        let good = build_pairing_code(&"c".repeat(32), &key, "wss://r");
        let cases = [
            String::new(),
            "not a url".to_string(),
            good.replacen("pairlink://", "https://", 1),
            good.replacen("session?", "other?", 1),
            format!("pairlink://session?k={}", key.encode()),
            format!("pairlink://session?s={}", "c".repeat(32)),
            good.replacen(&"c".repeat(32), "xyz", 1),
            format!("pairlink://session?s={}&k=AAAA", "c".repeat(32)),
        ];
        for case in cases {
            assert!(parse_pairing_code(&case, DEFAULT_RELAY).is_none(), "{case}");
        }
    }
}
