// Phoenix channel frames as spoken by the BaaS realtime endpoint

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use activity_domain::ResourceWatch;

pub const PROTOCOL_VSN: &str = "1.0.0";
pub const PHOENIX_TOPIC: &str = "phoenix";

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixFrame {
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A row change carried by a channel push.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub table: Option<String>,
    pub event_type: String,
    pub record: Value,
}

pub fn socket_url(realtime_url: &str, api_key: Option<&str>) -> String {
    let base = realtime_url.trim().trim_end_matches('/');
    let base = if base.ends_with("/websocket") {
        base.to_string()
    } else {
        format!("{}/websocket", base)
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    match api_key.filter(|key| !key.trim().is_empty()) {
        Some(key) => format!("{}{}apikey={}&vsn={}", base, separator, key.trim(), PROTOCOL_VSN),
        None => format!("{}{}vsn={}", base, separator, PROTOCOL_VSN),
    }
}

pub fn join_frame(
    topic: &str,
    watch: &ResourceWatch,
    access_token: Option<&str>,
    reference: &str,
) -> PhoenixFrame {
    let mut payload = json!({
        "config": {
            "broadcast": {"self": false},
            "presence": {"key": ""},
            "postgres_changes": [{
                "event": watch.event.as_str(),
                "schema": watch.schema,
                "table": watch.table,
            }],
        }
    });
    if let Some(token) = access_token.filter(|token| !token.trim().is_empty()) {
        payload["access_token"] = Value::String(token.trim().to_string());
    }
    PhoenixFrame {
        topic: topic.to_string(),
        event: EVENT_JOIN.to_string(),
        payload,
        reference: Some(reference.to_string()),
    }
}

pub fn leave_frame(topic: &str, reference: &str) -> PhoenixFrame {
    PhoenixFrame {
        topic: topic.to_string(),
        event: EVENT_LEAVE.to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

pub fn heartbeat_frame(reference: &str) -> PhoenixFrame {
    PhoenixFrame {
        topic: PHOENIX_TOPIC.to_string(),
        event: EVENT_HEARTBEAT.to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

pub fn parse_frame(raw_text: &str) -> Option<PhoenixFrame> {
    serde_json::from_str(raw_text).ok()
}

/// `Some(Ok)` for an ok reply, `Some(Err(reason))` for an error reply.
pub fn reply_status(frame: &PhoenixFrame) -> Option<Result<(), String>> {
    if frame.event != EVENT_REPLY {
        return None;
    }
    let status = frame
        .payload
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("");
    if status.eq_ignore_ascii_case("ok") {
        return Some(Ok(()));
    }
    let reason = frame
        .payload
        .get("response")
        .and_then(|response| {
            response
                .get("reason")
                .or_else(|| response.get("message"))
                .and_then(Value::as_str)
        })
        .unwrap_or(status);
    Some(Err(if reason.is_empty() {
        "unknown reply status".to_string()
    } else {
        reason.to_string()
    }))
}

pub fn extract_change(frame: &PhoenixFrame) -> Option<ChangeNotification> {
    if frame.event == EVENT_POSTGRES_CHANGES {
        let data = frame.payload.get("data")?;
        return change_from_object(data);
    }
    // Older servers push the change under the event type itself.
    if matches!(frame.event.as_str(), "INSERT" | "UPDATE" | "DELETE") {
        let mut change = change_from_object(&frame.payload)?;
        if change.event_type.is_empty() {
            change.event_type = frame.event.clone();
        }
        return Some(change);
    }
    None
}

fn change_from_object(data: &Value) -> Option<ChangeNotification> {
    let record = data.get("record").filter(|value| value.is_object())?.clone();
    let event_type = data
        .get("type")
        .or_else(|| data.get("eventType"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let table = data
        .get("table")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    Some(ChangeNotification {
        table,
        event_type,
        record,
    })
}

pub fn system_error(frame: &PhoenixFrame) -> Option<String> {
    if frame.event != EVENT_SYSTEM {
        return None;
    }
    let status = frame.payload.get("status").and_then(Value::as_str)?;
    if status.eq_ignore_ascii_case("error") {
        Some(
            frame
                .payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("system error")
                .to_string(),
        )
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_appends_key_and_version() {
        assert_eq!(
            socket_url("wss://demo.supabase.co/realtime/v1/", Some("anon")),
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
        assert_eq!(
            socket_url("ws://127.0.0.1:4000/socket/websocket", None),
            "ws://127.0.0.1:4000/socket/websocket?vsn=1.0.0"
        );
    }

    #[test]
    fn join_frame_requests_insert_changes() {
        let watch = ResourceWatch::inserts("orders");
        let frame = join_frame("realtime:public:orders", &watch, Some("anon"), "3");
        let value: Value = serde_json::from_str(&frame.to_text()).expect("json frame");
        assert_eq!(value["event"], "phx_join");
        assert_eq!(value["ref"], "3");
        assert_eq!(value["payload"]["access_token"], "anon");
        let change = &value["payload"]["config"]["postgres_changes"][0];
        assert_eq!(change["event"], "INSERT");
        assert_eq!(change["schema"], "public");
        assert_eq!(change["table"], "orders");
    }

    #[test]
    fn reply_status_reads_error_reason() {
        let ok = parse_frame(
            r#"{"topic":"realtime:public:orders","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"1"}"#,
        )
        .expect("frame");
        assert_eq!(reply_status(&ok), Some(Ok(())));

        let rejected = parse_frame(
            r#"{"topic":"realtime:public:orders","event":"phx_reply","payload":{"status":"error","response":{"reason":"Invalid JWT"}},"ref":"2"}"#,
        )
        .expect("frame");
        assert_eq!(reply_status(&rejected), Some(Err("Invalid JWT".to_string())));
    }

    #[test]
    fn postgres_changes_push_yields_record() {
        let frame = parse_frame(
            r#"{"topic":"realtime:public:orders","event":"postgres_changes","payload":{"ids":[1],"data":{"schema":"public","table":"orders","commit_timestamp":"2024-06-01T12:00:00Z","type":"INSERT","record":{"id":9,"total_amount":42},"columns":[],"errors":null}},"ref":null}"#,
        )
        .expect("frame");
        let change = extract_change(&frame).expect("change");
        assert_eq!(change.table.as_deref(), Some("orders"));
        assert_eq!(change.event_type, "INSERT");
        assert_eq!(change.record["total_amount"], 42);
    }

    #[test]
    fn legacy_insert_push_is_accepted() {
        let frame = parse_frame(
            r#"{"topic":"realtime:public:loot_box_opens","event":"INSERT","payload":{"table":"loot_box_opens","record":{"id":"c1","box_name":"Golden Crate"}},"ref":null}"#,
        )
        .expect("frame");
        let change = extract_change(&frame).expect("change");
        assert_eq!(change.event_type, "INSERT");
        assert_eq!(change.record["box_name"], "Golden Crate");
    }

    #[test]
    fn non_change_frames_are_ignored() {
        let heartbeat = heartbeat_frame("7");
        assert!(extract_change(&heartbeat).is_none());
        assert!(reply_status(&heartbeat).is_none());
        assert!(parse_frame("not json").is_none());
    }

    #[test]
    fn system_error_is_surfaced() {
        let frame = parse_frame(
            r#"{"topic":"realtime:public:orders","event":"system","payload":{"status":"error","message":"table not in publication","extension":"postgres_changes"},"ref":null}"#,
        )
        .expect("frame");
        assert_eq!(system_error(&frame).as_deref(), Some("table not in publication"));
    }
}
