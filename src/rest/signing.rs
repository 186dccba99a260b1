//! Request signing for BitMEX private endpoints
//!
//! signature = hex(HMAC-SHA256(secret, verb + path + expires))
//!
//! `path` includes the query string exactly as sent on the wire. The same
//! scheme authenticates the realtime websocket (`GET/realtime`).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Seconds a signed request stays valid
pub const SIGNATURE_TTL_SECS: i64 = 60;

/// Order query endpoint
pub const ORDER_PATH: &str = "/api/v1/order";

/// Path signed by the websocket auth handshake
pub const REALTIME_PATH: &str = "/realtime";

/// API credentials
///
/// Both halves are optional: without them requests are still signed (with an
/// empty key) and the exchange rejects them.
#[derive(Clone, Default)]
pub struct Credentials {
    api_key: Option<String>,
    api_secret: Option<String>,
}

impl Credentials {
    pub fn new(api_key: Option<String>, api_secret: Option<String>) -> Self {
        Self { api_key, api_secret }
    }

    /// Read `BITMEX_API_KEY` / `BITMEX_API_SECRET`
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self::new(read("BITMEX_API_KEY"), read("BITMEX_API_SECRET"))
    }

    /// Public key, empty if absent
    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Signed request descriptor, valid until `expires`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub verb: &'static str,
    /// Path with query string
    pub path: String,
    /// Unix seconds
    pub expires: i64,
    /// Lowercase hex HMAC-SHA256
    pub signature: String,
}

impl SignedRequest {
    /// Per-request auth headers
    pub fn headers(&self) -> [(&'static str, String); 2] {
        [
            ("api-expires", self.expires.to_string()),
            ("api-signature", self.signature.clone()),
        ]
    }
}

/// Signs requests with the configured secret
#[derive(Debug, Clone, Default)]
pub struct RequestSigner {
    credentials: Credentials,
}

impl RequestSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Hex signature of `verb + path + expires`
    pub fn sign(&self, verb: &str, path: &str, expires: i64) -> String {
        let secret = self.credentials.api_secret.as_deref().unwrap_or_default();
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            unreachable!("HMAC accepts keys of any length");
        };
        mac.update(verb.as_bytes());
        mac.update(path.as_bytes());
        mac.update(expires.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Sign an arbitrary request expiring at `expires`
    pub fn sign_request(&self, verb: &'static str, path: String, expires: i64) -> SignedRequest {
        let signature = self.sign(verb, &path, expires);
        SignedRequest {
            verb,
            path,
            expires,
            signature,
        }
    }

    /// Open orders query, expiring at `expires`
    pub fn open_orders_at(&self, expires: i64) -> SignedRequest {
        self.sign_request("GET", open_orders_path(), expires)
    }

    /// Open orders query, expiring `SIGNATURE_TTL_SECS` from now
    pub fn open_orders(&self) -> SignedRequest {
        self.open_orders_at(expires_from_now())
    }

    /// Arguments for the websocket `authKeyExpires` operation
    pub fn realtime_auth(&self, expires: i64) -> (String, i64, String) {
        let signature = self.sign("GET", REALTIME_PATH, expires);
        (self.credentials.api_key().to_string(), expires, signature)
    }
}

/// `/api/v1/order?filter=<urlencoded {"open":"true"}>`
pub fn open_orders_path() -> String {
    let filter = serde_json::json!({ "open": "true" }).to_string();
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("filter", &filter)
        .finish();
    format!("{}?{}", ORDER_PATH, query)
}

/// Current unix time plus the signature TTL
pub fn expires_from_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp() + SIGNATURE_TTL_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(secret: &str) -> RequestSigner {
        RequestSigner::new(Credentials::new(
            Some("key".to_string()),
            Some(secret.to_string()),
        ))
    }

    #[test]
    fn test_open_orders_path() {
        assert_eq!(
            open_orders_path(),
            "/api/v1/order?filter=%7B%22open%22%3A%22true%22%7D"
        );
    }

    #[test]
    fn test_open_orders_signature_vector() {
        let request = signer("abc").open_orders_at(1000);
        assert_eq!(request.verb, "GET");
        assert_eq!(request.expires, 1000);
        assert_eq!(
            request.signature,
            "a9c4f61a0e0b30db443eedbf15f7904c4054fc14821e3c118fe992896cfa141d"
        );
    }

    #[test]
    fn test_exchange_documented_vector() {
        let signer = signer("chNOOS4KvNXR_Xq4k4c9qsfoKWvnDecLATCRlcBwyKDYnWgO");
        assert_eq!(
            signer.sign("GET", "/api/v1/instrument", 1518064236),
            "c7682d435d0cfe87c16098df34ef2eb5a549d4c5a3c2b1f0f77b8af73423bf00"
        );
    }

    #[test]
    fn test_missing_secret_still_signs() {
        let signer = RequestSigner::default();
        assert_eq!(
            signer.sign("GET", "/realtime", 1000),
            "0d7a12119eafc2fdb031ff668b559eed29c4f3f434fc74945f2425cb654c0399"
        );
        assert!(!signer.credentials().is_complete());
        assert_eq!(signer.credentials().api_key(), "");
    }

    #[test]
    fn test_realtime_auth_args() {
        let (key, expires, signature) = signer("abc").realtime_auth(1000);
        assert_eq!(key, "key");
        assert_eq!(expires, 1000);
        assert_eq!(
            signature,
            "279c2d34e5a2896c65793e9156913a11e2fa1f49aa924e3f587cc85c722f64ab"
        );
    }

    #[test]
    fn test_headers_carry_expiry_and_signature() {
        let request = signer("abc").open_orders_at(1000);
        let headers = request.headers();
        assert_eq!(headers[0], ("api-expires", "1000".to_string()));
        assert_eq!(headers[1].0, "api-signature");
        assert_eq!(headers[1].1, request.signature);
    }

    #[test]
    fn test_expiry_is_in_the_future() {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let request = signer("abc").open_orders();
        assert!(request.expires >= now + SIGNATURE_TTL_SECS);
        assert!(request.expires <= now + SIGNATURE_TTL_SECS + 2);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", signer("super-secret"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
