// Connection target for the local device API.
//
// The meeting application only listens on loopback; identification travels
// in the query string of the upgrade request.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::protocol::PROTOCOL_VERSION;

/// Port the meeting application listens on when none is configured.
pub const DEFAULT_PORT: u16 = 8124;

const LOOPBACK_HOST: &str = "127.0.0.1";

/// How this integration identifies itself to the meeting application.
///
/// Values are plain text; percent-encoding happens when the URL is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub device: String,
    pub app: String,
    pub app_version: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            manufacturer: "teamslink".into(),
            device: "teamslink".into(),
            app: "teamslink".into(),
            app_version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Port `0` means "use the default".
pub fn effective_port(port: u16) -> u16 {
    if port == 0 { DEFAULT_PORT } else { port }
}

/// Build `ws://127.0.0.1:<port>/?protocol-version=...` for one attempt.
///
/// The token is appended only when present and non-empty; without it the
/// meeting application prompts the user to allow the pairing.
pub fn endpoint_url(identity: &DeviceIdentity, port: u16, token: Option<&str>) -> Result<Url, Error> {
    let mut url = Url::parse(&format!("ws://{LOOPBACK_HOST}:{}/", effective_port(port)))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("protocol-version", PROTOCOL_VERSION)
            .append_pair("manufacturer", &identity.manufacturer)
            .append_pair("device", &identity.device)
            .append_pair("app", &identity.app)
            .append_pair("app-version", &identity.app_version);
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            query.append_pair("token", token);
        }
    }
    Ok(url)
}

/// Render a URL for logs with the token value masked.
pub fn redacted(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "token") {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "token" { "***".to_owned() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
