use anyhow::{anyhow, Result};

/// Schema and table names end up inside channel topics and REST paths.
pub fn validate_identifier(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("identifier is empty"));
    }
    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(anyhow!("'{}' must be [a-z0-9_]", value));
    }
    Ok(())
}

pub fn validate_ws_url(value: &str) -> Result<()> {
    let value = value.trim();
    if !(value.starts_with("ws://") || value.starts_with("wss://")) {
        return Err(anyhow!("realtime_url must start with ws:// or wss://"));
    }
    Ok(())
}
