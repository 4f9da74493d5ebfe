//! Secret redaction for key material and endpoint credentials.
//!
//! [`Redacted`] hides a value entirely in `Debug`, `Display` and `Serialize`.
//! [`redact_url`] keeps the scheme and host of an RPC/LCD endpoint but drops
//! anything that commonly carries an API key (userinfo, path, query).

use std::fmt::{self, Debug, Display};
use url::Url;

const REDACTED: &str = "<redacted>";

/// Wrapper that redacts its inner value when formatted or serialized.
///
/// ```ignore
/// use dualchain_rs::redact::Redacted;
///
/// let key = Redacted("0xac09...".to_string());
/// tracing::info!(private_key = %key, "Loaded operator key");
/// // Logs: private_key = <redacted>
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Redacted<T>(pub T);

impl<T> Redacted<T> {
    /// Access the secret. Call sites are the only places key material leaves the wrapper.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> serde::Serialize for Redacted<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        REDACTED.serialize(serializer)
    }
}

/// Render an endpoint URL safe for logs.
///
/// `https://user:pw@rpc.example.org/v3/abcdef?key=1` becomes
/// `https://rpc.example.org/<redacted>`. Unparseable input is fully redacted.
pub fn redact_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return REDACTED.to_string();
    };

    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => return REDACTED.to_string(),
    };

    let hidden_path = !matches!(url.path(), "" | "/") || url.query().is_some();
    if hidden_path {
        format!("{}://{}/{}", url.scheme(), host, REDACTED)
    } else {
        format!("{}://{}", url.scheme(), host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_hides_value() {
        let secret = Redacted("super-secret");
        assert_eq!(format!("{}", secret), "<redacted>");
        assert_eq!(format!("{:?}", secret), "<redacted>");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"<redacted>\"");
        assert_eq!(*secret.expose(), "super-secret");
    }

    #[test]
    fn test_redact_url_plain_host() {
        assert_eq!(redact_url("http://localhost:8545"), "http://localhost:8545");
        assert_eq!(redact_url("https://lcd.example.org/"), "https://lcd.example.org");
    }

    #[test]
    fn test_redact_url_hides_credentials() {
        let redacted = redact_url("https://user:pw@rpc.example.org/v3/abcdef?key=1");
        assert_eq!(redacted, "https://rpc.example.org/<redacted>");
        assert!(!redacted.contains("abcdef"));
        assert!(!redacted.contains("pw"));
    }

    #[test]
    fn test_redact_url_garbage() {
        assert_eq!(redact_url("not a url"), "<redacted>");
    }
}
