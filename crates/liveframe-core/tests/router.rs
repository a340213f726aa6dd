//! Connection router scenarios over an in-memory transport.

use liveframe_core::{
    html, Capabilities, Component, ComponentError, ComponentResult, ConnectionRouter, Html, JwtSessionCodec,
    MountParams, Params, RouteTable, RouterConfig, RouterError, SessionData, Socket,
};
use liveframe_protocol::{Kind, Message, ProtocolError};
use liveframe_transport::{ChannelTransport, ConnectionId, Outbound};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const SECRET: &str = "my signing string";
const TOPIC: &str = "lv:phx-AAAAAAAA";

struct Echo;

#[derive(Default)]
struct EchoContext {
    last_event: String,
    csrf: String,
    query: String,
}

impl Component for Echo {
    type Context = EchoContext;
    type Info = String;

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with_events().with_info()
    }

    fn mount(
        &self,
        params: &MountParams,
        session: &SessionData,
        _: &Socket<String>,
    ) -> ComponentResult<EchoContext> {
        Ok(EchoContext {
            last_event: String::new(),
            csrf: session.csrf_token().unwrap_or_default().to_string(),
            query: params
                .get("q")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    fn render(&self, context: &EchoContext) -> Html {
        html!(
            "<div>test {} {} {}</div>",
            &context.last_event,
            &context.csrf,
            &context.query
        )
    }

    fn handle_event(
        &self,
        event: &str,
        params: &Params,
        mut context: EchoContext,
        socket: &Socket<String>,
    ) -> ComponentResult<EchoContext> {
        match event {
            "defer" => socket.send_info_after(Duration::from_millis(100), "deferred".to_string()),
            "defer-fail" => socket.send_info_after(Duration::from_millis(100), "fail".to_string()),
            _ => {}
        }
        context.last_event = match params.get("value").and_then(Value::as_str) {
            Some(value) => format!("{event}={value}"),
            None => event.to_string(),
        };
        Ok(context)
    }

    fn handle_info(
        &self,
        info: String,
        mut context: EchoContext,
        _: &Socket<String>,
    ) -> ComponentResult<EchoContext> {
        if info == "fail" {
            return Err(ComponentError::new("deferred work failed"));
        }
        context.last_event = info;
        Ok(context)
    }
}

struct Harness {
    router: ConnectionRouter,
    routes: RouteTable,
    connection_id: ConnectionId,
    outbound: Outbound,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    fn with_config(config: RouterConfig) -> Self {
        let transport = Arc::new(ChannelTransport::new());
        let connection_id = ConnectionId::new("1234");
        let outbound = transport.register(connection_id.clone());
        Self {
            router: ConnectionRouter::with_config(transport, Arc::new(JwtSessionCodec::new()), config),
            routes: RouteTable::new().route("/test", Echo),
            connection_id,
            outbound,
        }
    }

    fn send(&self, message: Value) -> Result<(), RouterError> {
        let data = serde_json::to_vec(&message).unwrap();
        self.router
            .on_message(&data, &self.routes, &self.connection_id, SECRET)
    }

    fn sent(&mut self) -> Vec<Value> {
        let mut sent = Vec::new();
        while let Ok(bytes) = self.outbound.try_recv() {
            sent.push(serde_json::from_slice(&bytes).unwrap());
        }
        sent
    }
}

fn join(target: Value) -> Value {
    let codec = JwtSessionCodec::new();
    let session = codec
        .sign(&json!({"_csrf_token": "my csrf token"}), SECRET)
        .unwrap();
    let statics = codec.sign(&json!([]), SECRET).unwrap();

    let mut payload = json!({
        "params": {"_csrf_token": "my csrf token", "_mounts": 0},
        "session": session,
        "static": statics,
    });
    if let (Value::Object(payload), Value::Object(target)) = (&mut payload, target) {
        payload.extend(target);
    }
    json!(["4", "4", TOPIC, "phx_join", payload])
}

fn click() -> Value {
    json!(["4", "6", TOPIC, "event", {
        "type": "click",
        "event": "eventName",
        "value": {"value": "eventValue"}
    }])
}

fn heartbeat() -> Value {
    json!([null, "5", "phoenix", "heartbeat", {}])
}

#[test]
fn test_unknown_message_shape() {
    let h = Harness::new();
    let err = h.send(json!([])).unwrap_err();
    assert!(err.to_string().contains("unknown message type"));
}

#[test]
fn test_join_with_url() {
    let mut h = Harness::new();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0][0], json!("4"));
    assert_eq!(sent[0][1], json!("4"));
    assert_eq!(sent[0][2], json!(TOPIC));
    assert_eq!(sent[0][3], json!("phx_reply"));
    assert_eq!(sent[0][4]["status"], json!("ok"));
    assert_eq!(
        sent[0][4]["response"],
        json!({"0": "", "1": "my csrf token", "2": "", "s": ["<div>test ", " ", " ", "</div>"]})
    );
    assert_eq!(h.router.topics(), vec![TOPIC.to_string()]);
}

#[test]
fn test_join_with_redirect() {
    let mut h = Harness::new();
    h.send(join(json!({"redirect": "http://localhost:4444/test"}))).unwrap();
    assert_eq!(h.sent().len(), 1);
}

#[test]
fn test_join_relative_url_with_query() {
    let mut h = Harness::new();
    h.send(join(json!({"url": "/test?q=shoes"}))).unwrap();
    let sent = h.sent();
    assert_eq!(sent[0][4]["response"]["2"], json!("shoes"));
}

#[test]
fn test_join_missing_url_or_redirect() {
    let mut h = Harness::new();
    let err = h.send(join(json!({}))).unwrap_err();
    assert!(matches!(err, RouterError::JoinValidation(_)));
    assert!(err.to_string().contains("no url or redirect in join message"));
    assert!(h.sent().is_empty());
}

#[test]
fn test_join_unrouted_url() {
    let mut h = Harness::new();
    let err = h
        .send(join(json!({"url": "http://localhost:4444/noroute"})))
        .unwrap_err();
    assert!(matches!(err, RouterError::RouteNotFound(ref path) if path == "/noroute"));
    assert!(err.to_string().contains("no component found for"));
    assert!(h.sent().is_empty());
    assert!(h.router.is_empty());
}

#[test]
fn test_join_with_bad_session() {
    let mut h = Harness::new();
    let mut message = join(json!({"url": "http://localhost:4444/test"}));
    message[4]["session"] = json!("forged");
    assert!(matches!(h.send(message), Err(RouterError::Session(_))));
    assert!(h.sent().is_empty());
}

#[test]
fn test_heartbeat_after_join() {
    let mut h = Harness::new();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();
    assert_eq!(h.sent().len(), 1);

    h.send(heartbeat()).unwrap();
    assert_eq!(
        h.sent(),
        vec![json!([null, "5", "phoenix", "phx_reply", {"response": {}, "status": "ok"}])]
    );
}

#[test]
fn test_heartbeat_without_join() {
    let mut h = Harness::new();
    h.send(heartbeat()).unwrap();
    assert_eq!(h.sent().len(), 1);
}

#[test]
fn test_click_after_join() {
    let mut h = Harness::new();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();
    h.sent();

    h.send(click()).unwrap();
    assert_eq!(
        h.sent(),
        vec![json!(["4", "6", TOPIC, "phx_reply", {
            "status": "ok",
            "response": {"0": "eventName=eventValue"}
        }])]
    );
}

#[test]
fn test_click_without_join_sends_nothing() {
    let mut h = Harness::new();
    h.send(click()).unwrap();
    assert!(h.sent().is_empty());
}

#[test]
fn test_live_patch_without_join_sends_nothing() {
    let mut h = Harness::new();
    h.send(json!(["4", "7", TOPIC, "live_patch", {"url": "http://localhost:4444/test?id=1"}]))
        .unwrap();
    assert!(h.sent().is_empty());
}

#[test]
fn test_live_patch_after_join() {
    let mut h = Harness::new();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();
    h.sent();

    h.send(json!(["4", "7", TOPIC, "live_patch", {"url": "http://localhost:4444/test?id=1"}]))
        .unwrap();
    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0][4], json!({"status": "ok", "response": {}}));
}

#[test]
fn test_leave_after_join() {
    let mut h = Harness::new();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();
    assert_eq!(h.sent().len(), 1);

    h.send(json!(["4", "8", TOPIC, "phx_leave", {}])).unwrap();
    assert!(h.sent().is_empty());
    assert!(h.router.get(TOPIC).is_none());

    h.send(click()).unwrap();
    assert!(h.sent().is_empty());
}

#[test]
fn test_leave_without_join() {
    let mut h = Harness::new();
    h.send(json!(["4", "8", TOPIC, "phx_leave", {}])).unwrap();
    assert!(h.sent().is_empty());
}

#[test]
fn test_unknown_event_kind() {
    let h = Harness::new();
    let err = h.send(json!(["4", "8", TOPIC, "blahblah", {}])).unwrap_err();
    assert!(matches!(
        err,
        RouterError::Protocol(ProtocolError::UnknownEvent(ref kind)) if kind == "blahblah"
    ));
    assert!(err.to_string().contains("unexpected protocol event"));
}

#[test]
fn test_reply_kind_has_no_dispatch_rule() {
    let h = Harness::new();
    let reply = Message::new(None, None, TOPIC, Kind::Reply, json!({}));
    let err = h
        .router
        .dispatch(&reply, &h.routes, &h.connection_id, SECRET)
        .unwrap_err();
    assert!(matches!(err, RouterError::UnknownEvent(_)));
}

#[test]
fn test_shutdown_manager_then_heartbeat() {
    let mut h = Harness::new();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();
    assert_eq!(h.sent().len(), 1);

    let manager = h.router.get(TOPIC).unwrap();
    if manager.is_healthy() {
        manager.shutdown();
    }
    manager.shutdown();

    h.send(heartbeat()).unwrap();
    assert_eq!(h.sent().len(), 1);

    h.send(click()).unwrap();
    assert!(h.sent().is_empty());
    assert!(h.router.get(TOPIC).is_none());
    assert!(h.router.is_empty());
}

#[test]
fn test_rejoin_replaces_session() {
    let mut h = Harness::new();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();
    let first = h.router.get(TOPIC).unwrap();

    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();
    let second = h.router.get(TOPIC).unwrap();

    assert!(!first.is_healthy());
    assert!(second.is_healthy());
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(h.router.len(), 1);
    assert_eq!(h.sent().len(), 2);
}

#[test]
fn test_topic_limit() {
    let h = Harness::with_config(RouterConfig { max_topics: 1 });
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();

    let mut second = join(json!({"url": "http://localhost:4444/test"}));
    second[2] = json!("lv:other");
    assert!(matches!(h.send(second), Err(RouterError::TooManyTopics(1))));
    assert_eq!(h.router.len(), 1);
}

#[test]
fn test_shutdown_frees_topic_slot() {
    let h = Harness::with_config(RouterConfig { max_topics: 1 });
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();

    h.router.get(TOPIC).unwrap().shutdown();
    assert!(h.router.topics().is_empty());
    assert_eq!(h.router.len(), 0);

    let mut second = join(json!({"url": "http://localhost:4444/test"}));
    second[2] = json!("lv:other");
    h.send(second).unwrap();
    assert_eq!(h.router.topics(), vec!["lv:other".to_string()]);
}

#[test]
fn test_replaced_session_shutdown_keeps_replacement() {
    let h = Harness::new();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();
    let first = h.router.get(TOPIC).unwrap();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();

    first.shutdown();
    assert!(h.router.get(TOPIC).is_some());
    assert_eq!(h.router.len(), 1);
}

#[test]
fn test_close_shuts_down_every_session() {
    let h = Harness::new();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();
    let manager = h.router.get(TOPIC).unwrap();

    h.router.close();
    assert!(h.router.is_empty());
    assert!(!manager.is_healthy());
}

#[tokio::test(start_paused = true)]
async fn test_deferred_info_pushes_diff() {
    let mut h = Harness::new();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();
    h.sent();

    h.send(json!(["4", "9", TOPIC, "event", {"type": "click", "event": "defer"}]))
        .unwrap();
    assert_eq!(h.sent()[0][4]["response"], json!({"0": "defer"}));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        h.sent(),
        vec![json!(["4", null, TOPIC, "diff", {"0": "deferred"}])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_deferred_info_dropped_after_leave() {
    let mut h = Harness::new();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();
    h.send(json!(["4", "9", TOPIC, "event", {"type": "click", "event": "defer"}]))
        .unwrap();
    h.send(json!(["4", "10", TOPIC, "phx_leave", {}])).unwrap();
    assert_eq!(h.sent().len(), 2);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(h.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_deferred_info_leaves_topic_map() {
    let mut h = Harness::new();
    h.send(join(json!({"url": "http://localhost:4444/test"}))).unwrap();
    h.send(json!(["4", "9", TOPIC, "event", {"type": "click", "event": "defer-fail"}]))
        .unwrap();
    assert_eq!(h.sent().len(), 2);
    assert_eq!(h.router.len(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(h.sent().is_empty());
    assert!(h.router.topics().is_empty());
}
