//! Opaque pagination cursor: URL-encoded JSON `{"id": <last id on the page>}`.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct LastKey {
    id: i64,
}

pub fn encode(last_id: i64) -> String {
    let json = serde_json::json!({ "id": last_id }).to_string();
    form_urlencoded::byte_serialize(json.as_bytes()).collect()
}

/// Accepts the cursor either still encoded or already decoded by the
/// query-string parser.
pub fn decode(raw: &str) -> anyhow::Result<i64> {
    let raw = raw.trim();
    let parsed = match serde_json::from_str::<LastKey>(raw) {
        Ok(k) => k,
        Err(_) => {
            let decoded = form_urlencoded::parse(raw.as_bytes())
                .next()
                .map(|(k, _)| k.into_owned())
                .ok_or_else(|| anyhow::anyhow!("empty cursor"))?;
            serde_json::from_str::<LastKey>(&decoded)?
        }
    };
    anyhow::ensure!(parsed.id > 0, "cursor id must be positive");
    Ok(parsed.id)
}
