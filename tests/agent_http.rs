use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{json, Value};

use simrelay::agent::{AgentReply, AgentRequest};
use simrelay::error::TransportError;
use simrelay::{AgentBridge, AgentClient, HttpAgentClient, SharedSimulationState, StatusCode};

/// What the fake agent saw.
#[derive(Debug)]
struct Captured {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Value,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Serves one canned HTTP response and returns the request it received.
fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/graphql", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        handle_connection(stream, status, &body)
    });
    (url, handle)
}

fn handle_connection(mut stream: TcpStream, status: &str, body: &str) -> Captured {
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let (k, v) = line.split_once(':').unwrap();
        headers.push((k.trim().to_string(), v.trim().to_string()));
    }

    let len: usize = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .map_or(0, |(_, v)| v.parse().unwrap());
    let mut raw = vec![0_u8; len];
    reader.read_exact(&mut raw).unwrap();

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).unwrap();
    stream.flush().unwrap();

    Captured {
        request_line: request_line.trim_end().to_string(),
        headers,
        body: serde_json::from_slice(&raw).unwrap_or(Value::Null),
    }
}

fn request() -> AgentRequest {
    AgentRequest {
        query: "{ onReset }".to_string(),
        variables: Value::Null,
    }
}

#[test]
fn posts_json_with_bearer_token() {
    let (url, server) = serve_once("200 OK", json!({ "data": { "onReset": "ctx" } }).to_string());
    let client = HttpAgentClient::new(&url, Some("s3cret".to_string()), Duration::from_secs(5)).unwrap();

    let reply = client.execute(&request()).unwrap();
    assert_eq!(reply, AgentReply::data(json!({ "onReset": "ctx" })));

    let seen = server.join().unwrap();
    assert!(seen.request_line.starts_with("POST /graphql"));
    assert_eq!(seen.header("authorization"), Some("Bearer s3cret"));
    assert!(seen.header("content-type").unwrap().starts_with("application/json"));
    assert_eq!(seen.body["query"], "{ onReset }");
}

#[test]
fn no_token_sends_no_authorization_header() {
    let (url, server) = serve_once("200 OK", json!({ "data": { "onReset": null } }).to_string());
    let client = HttpAgentClient::new(&url, None, Duration::from_secs(5)).unwrap();
    client.execute(&request()).unwrap();
    assert_eq!(server.join().unwrap().header("authorization"), None);
}

#[test]
fn error_list_is_returned_as_reply() {
    let (url, server) = serve_once(
        "200 OK",
        json!({ "data": null, "errors": [{ "message": "boom", "path": ["onStep"] }] }).to_string(),
    );
    let client = HttpAgentClient::new(&url, None, Duration::from_secs(5)).unwrap();

    let reply = client.execute(&request()).unwrap();
    assert_eq!(reply.errors.unwrap()[0].message, "boom");
    server.join().unwrap();
}

#[test]
fn http_failure_status_is_a_transport_error() {
    let (url, server) = serve_once("500 Internal Server Error", "{\"oops\":true}".to_string());
    let client = HttpAgentClient::new(&url, None, Duration::from_secs(5)).unwrap();

    let err = client.execute(&request()).unwrap_err();
    assert!(matches!(err, TransportError::HttpStatus { status: 500, .. }), "{err:?}");
    server.join().unwrap();
}

#[test]
fn non_json_body_is_malformed() {
    let (url, server) = serve_once("200 OK", "not json".to_string());
    let client = HttpAgentClient::new(&url, None, Duration::from_secs(5)).unwrap();

    let err = client.execute(&request()).unwrap_err();
    assert!(matches!(err, TransportError::MalformedReply { .. }), "{err:?}");
    server.join().unwrap();
}

#[test]
fn unreachable_agent_is_a_connection_failure() {
    // Bind then drop to get a port with nothing listening.
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let client =
        HttpAgentClient::new(&format!("http://127.0.0.1:{port}/"), None, Duration::from_secs(2)).unwrap();

    let err = client.execute(&request()).unwrap_err();
    assert!(matches!(err, TransportError::ConnectionFailed { .. }), "{err:?}");
}

#[test]
fn bridge_over_http_records_protocol_errors() {
    let (url, server) = serve_once(
        "200 OK",
        json!({ "errors": [{ "message": "boom" }, { "message": "bang" }] }).to_string(),
    );
    let client: Arc<dyn AgentClient> =
        Arc::new(HttpAgentClient::new(&url, None, Duration::from_secs(5)).unwrap());

    let state = Arc::new(SharedSimulationState::new());
    state.set_status(StatusCode::Starting, Vec::new()).unwrap();
    state.set_status(StatusCode::Running, Vec::new()).unwrap();
    state.attach_handles(Some(client), None, None);

    let bridge = AgentBridge::new(Arc::clone(&state));
    assert!(bridge.on_step(&[0.0, 1.0], 0.5, 1, false, Some("c")).is_none());

    let status = state.status();
    assert_eq!(status.code, StatusCode::Error);
    assert_eq!(status.errors, vec!["boom".to_string(), "bang".to_string()]);

    let seen = server.join().unwrap();
    assert_eq!(seen.body["variables"]["state"], json!([0.0, 1.0]));
    assert_eq!(seen.body["variables"]["lastAction"], 1);
    assert_eq!(seen.body["variables"]["context"], "c");
}
