//! Real localhost round trips against the selector server.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::tempdir;

use wrfsel_core::{Catalog, ScenarioId, VariableDescriptor, DEFAULT_SCENARIO};
use wrfsel_notify::{ExportOptions, MailError, MailTransport, OutboundMessage};
use wrfsel_server::{SelectorServer, SessionContext};

/// Keeps every message plus the attachment contents seen during send.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(OutboundMessage, Vec<String>)>>,
}

impl MailTransport for RecordingTransport {
    fn send(&self, message: &OutboundMessage) -> Result<(), MailError> {
        let contents = message
            .attachments
            .iter()
            .map(|p| fs::read_to_string(p).map_err(|e| MailError::Io(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        self.sent.lock().unwrap().push((message.clone(), contents));
        Ok(())
    }
}

fn start(export_dir: &Path, transport: Arc<RecordingTransport>) -> (SelectorServer, SocketAddr) {
    let context = SessionContext {
        catalog: Arc::new(Catalog::new(vec![
            VariableDescriptor::new("T2", "2-meter temperature", "2", "K"),
            VariableDescriptor::new("PCPT", "Total precipitation", "2", "mm"),
            VariableDescriptor::new("SNOW", "Snow water equivalent", "2", "kg m-2"),
        ])),
        scenarios: ScenarioId::known(),
        default_scenario: ScenarioId::new(DEFAULT_SCENARIO),
        export: ExportOptions {
            export_dir: export_dir.to_path_buf(),
            include_empty_scenarios: false,
            sender: "wrf@example.org".to_string(),
            operator: "ops@example.org".to_string(),
            subject: "WRF variable selection".to_string(),
            max_attempts: 1,
            retry_delay: Duration::ZERO,
        },
        transport,
    };

    let mut server = SelectorServer::new();
    let addr = server.start("127.0.0.1:0", context).unwrap();
    (server, addr)
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self { stream, reader }
    }

    fn send_raw(&mut self, line: &str) {
        writeln!(self.stream, "{}", line).unwrap();
    }

    fn send(&mut self, msg: Value) {
        self.send_raw(&msg.to_string());
    }

    fn recv(&mut self) -> Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    fn request(&mut self, msg: Value) -> Value {
        self.send(msg);
        self.recv()
    }

    /// True once the server has closed its side.
    fn closed(&mut self) -> bool {
        let mut line = String::new();
        matches!(self.reader.read_line(&mut line), Ok(0))
    }

    fn hello(&mut self) -> Value {
        self.request(json!({"type": "hello", "id": "0", "client": "test", "version": "1.0.0"}))
    }
}

fn leftover_files(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect()
}

#[test]
fn test_full_form_session() {
    let export_dir = tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (mut server, addr) = start(export_dir.path(), Arc::clone(&transport));
    let mut client = Client::connect(addr);

    let welcome = client.hello();
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["protocol_version"], 1);
    assert_eq!(welcome["catalog"].as_array().unwrap().len(), 3);
    assert_eq!(welcome["catalog"][0]["id"], "T2");
    assert_eq!(welcome["scenarios"][0], "ERA-Interim");
    assert_eq!(welcome["aggregations"], json!(["hourly", "daily", "monthly"]));
    assert_eq!(welcome["view"]["scenario"], "GFDL-CM3 Historical");
    assert_eq!(welcome["view"]["aggregation"], "daily");

    // Pick ERA-Interim daily {0, 2}
    let patch = client.request(json!({"type": "set_scenario", "id": "1", "scenario": "ERA-Interim"}));
    assert_eq!(patch["type"], "view_patch");
    assert_eq!(patch["patch"]["selected_indices"], json!([]));

    let patch = client.request(json!({
        "type": "select_rows", "id": "2",
        "scenario": "ERA-Interim", "aggregation": "daily", "indices": [2, 0]
    }));
    assert_eq!(patch["id"], "2");
    assert_eq!(patch["patch"]["stored"], true);
    let rows = &patch["patch"]["selection_rows"];
    assert_eq!(rows[0], json!({"variable_id": "T2", "hourly": false, "daily": true, "monthly": false}));
    assert_eq!(rows[1]["daily"], false);
    assert_eq!(rows[2]["daily"], true);

    // hourly then back to daily redisplays the saved indices
    let patch = client.request(json!({"type": "set_aggregation", "id": "3", "aggregation": "hourly"}));
    assert_eq!(patch["patch"]["selected_indices"], json!([]));
    let patch = client.request(json!({"type": "set_aggregation", "id": "4", "aggregation": "daily"}));
    assert_eq!(patch["patch"]["selected_indices"], json!([0, 2]));

    // Second scenario, monthly {1}
    client.request(json!({
        "type": "select_rows", "id": "5",
        "scenario": "NCAR-CCSM4 RCP85", "aggregation": "monthly", "indices": [1]
    }));

    let patch = client.request(json!({"type": "set_email", "id": "6", "email": "user@example.org"}));
    assert_eq!(patch["patch"], json!({}));

    let view = client.request(json!({"type": "inspect", "id": "7"}));
    assert_eq!(view["type"], "view");
    assert_eq!(view["view"]["email"], "user@example.org");
    assert_eq!(view["view"]["selected_indices"], json!([0, 2]));

    let result = client.request(json!({"type": "submit", "id": "8"}));
    assert_eq!(result["type"], "export_result", "{result}");
    assert_eq!(result["recipients"], json!(["user@example.org", "ops@example.org"]));
    assert_eq!(
        result["files"],
        json!([
            "temp-selection-output_ERA-Interim_user@example.org.csv",
            "temp-selection-output_NCAR-CCSM4_RCP85_user@example.org.csv"
        ])
    );
    assert_eq!(result["attempts"], 1);

    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1[0], "Variable,hourly,daily,monthly\nT2,,X,\nPCPT,,,\nSNOW,,X,\n");
    assert_eq!(sent[0].1[1], "Variable,hourly,daily,monthly\nT2,,,\nPCPT,,,X\nSNOW,,,\n");
    drop(sent);

    assert!(leftover_files(export_dir.path()).is_empty());

    server.stop();
}

#[test]
fn test_sessions_do_not_share_selections() {
    let export_dir = tempdir().unwrap();
    let (mut server, addr) = start(export_dir.path(), Arc::new(RecordingTransport::default()));

    let mut a = Client::connect(addr);
    let mut b = Client::connect(addr);
    let session_a = a.hello()["session_id"].clone();
    let session_b = b.hello()["session_id"].clone();
    assert_ne!(session_a, session_b);

    a.request(json!({
        "type": "select_rows", "id": "1",
        "scenario": "GFDL-CM3 Historical", "aggregation": "daily", "indices": [1]
    }));

    let view_a = a.request(json!({"type": "inspect", "id": "2"}));
    let view_b = b.request(json!({"type": "inspect", "id": "2"}));
    assert_eq!(view_a["view"]["selected_indices"], json!([1]));
    assert_eq!(view_b["view"]["selected_indices"], json!([]));

    server.stop();
}

#[test]
fn test_submit_with_empty_email_sends_nothing() {
    let export_dir = tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (mut server, addr) = start(export_dir.path(), Arc::clone(&transport));
    let mut client = Client::connect(addr);
    client.hello();

    client.request(json!({
        "type": "select_rows", "id": "1",
        "scenario": "ERA-Interim", "aggregation": "hourly", "indices": [0]
    }));
    let err = client.request(json!({"type": "submit", "id": "2", "email": "  "}));

    assert_eq!(err["type"], "error");
    assert_eq!(err["id"], "2");
    assert_eq!(err["code"], "validation_error");
    assert!(transport.sent.lock().unwrap().is_empty());
    assert!(leftover_files(export_dir.path()).is_empty());

    server.stop();
}

#[test]
fn test_unknown_scenario_errors() {
    let export_dir = tempdir().unwrap();
    let (mut server, addr) = start(export_dir.path(), Arc::new(RecordingTransport::default()));
    let mut client = Client::connect(addr);
    client.hello();

    let err = client.request(json!({"type": "set_scenario", "id": "1", "scenario": "CESM2 SSP585"}));
    assert_eq!(err["code"], "unknown_scenario");

    // Selection against an unknown scenario is answered but not kept
    let patch = client.request(json!({
        "type": "select_rows", "id": "2",
        "scenario": "CESM2 SSP585", "aggregation": "daily", "indices": [0]
    }));
    assert_eq!(patch["patch"]["stored"], false);

    let view = client.request(json!({"type": "inspect", "id": "3"}));
    assert_eq!(view["view"]["scenario"], "GFDL-CM3 Historical");

    server.stop();
}

#[test]
fn test_handshake_required() {
    let export_dir = tempdir().unwrap();
    let (mut server, addr) = start(export_dir.path(), Arc::new(RecordingTransport::default()));
    let mut client = Client::connect(addr);

    let err = client.request(json!({"type": "ping", "id": "1"}));
    assert_eq!(err["code"], "handshake_required");
    assert!(client.closed());

    server.stop();
}

#[test]
fn test_protocol_mismatch() {
    let export_dir = tempdir().unwrap();
    let (mut server, addr) = start(export_dir.path(), Arc::new(RecordingTransport::default()));
    let mut client = Client::connect(addr);

    let err = client.request(json!({
        "type": "hello", "id": "0", "client": "test", "version": "9.0.0", "protocol_version": 99
    }));
    assert_eq!(err["code"], "protocol_mismatch");
    assert!(client.closed());

    server.stop();
}

#[test]
fn test_malformed_messages_disconnect_after_three() {
    let export_dir = tempdir().unwrap();
    let (mut server, addr) = start(export_dir.path(), Arc::new(RecordingTransport::default()));
    let mut client = Client::connect(addr);
    client.hello();

    for _ in 0..2 {
        client.send_raw("{not json");
        assert_eq!(client.recv()["code"], "malformed_message");
    }

    // A good message resets the counter
    assert_eq!(client.request(json!({"type": "ping", "id": "p"}))["type"], "pong");

    for _ in 0..3 {
        client.send_raw(r#"{"type":"set_aggregation","id":"x","aggregation":"weekly"}"#);
        assert_eq!(client.recv()["code"], "malformed_message");
    }
    assert!(client.closed());

    server.stop();
}
