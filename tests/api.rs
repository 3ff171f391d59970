use actix_cors::Cors;
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use capscope::analysis::Analyzer;
use capscope::api::routes;
use capscope::models::config::{AnalysisConfig, EngineConfig};
use capscope::testing::{
    ethernet_ipv4, tcp_segment, udp_datagram, PcapBuilder, MAC_A, MAC_B, PROTO_TCP, PROTO_UDP, TCP_ACK,
    TCP_PSH_ACK, TCP_SYN,
};

const BOUNDARY: &str = "----capscope-test-boundary";

const CLIENT: [u8; 4] = [192, 168, 1, 10];
const SERVER: [u8; 4] = [203, 0, 113, 80];

/// 6 Ethernet/IPv4/TCP frames of one connection and 4 payload-less UDP frames
fn ten_packet_capture() -> Vec<u8> {
    let mut builder = PcapBuilder::new(1);
    let tcp = |src, dst, sport, dport, seq, flags, payload: &[u8]| {
        ethernet_ipv4(MAC_A, MAC_B, src, dst, PROTO_TCP, &tcp_segment(sport, dport, seq, flags, payload))
    };

    builder.push(1_700_000_000, 0, &tcp(CLIENT, SERVER, 50000, 8080, 100, TCP_SYN, b""));
    builder.push(1_700_000_000, 1_000, &tcp(SERVER, CLIENT, 8080, 50000, 900, TCP_SYN | TCP_ACK, b""));
    builder.push(1_700_000_000, 2_000, &tcp(CLIENT, SERVER, 50000, 8080, 101, TCP_ACK, b""));
    builder.push(1_700_000_000, 3_000, &tcp(CLIENT, SERVER, 50000, 8080, 101, TCP_PSH_ACK, b"hello "));
    builder.push(1_700_000_000, 4_000, &tcp(SERVER, CLIENT, 8080, 50000, 901, TCP_PSH_ACK, b"world"));
    builder.push(1_700_000_000, 5_000, &tcp(CLIENT, SERVER, 50000, 8080, 107, TCP_ACK, b""));

    for i in 0..4u16 {
        let udp = udp_datagram(40000 + i, 9999, b"");
        builder.push(1_700_000_001, u32::from(i) * 250_000, &ethernet_ipv4(MAC_A, MAC_B, CLIENT, SERVER, PROTO_UDP, &udp));
    }

    builder.build()
}

fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            field, file_name, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(path: &str, file_name: &str, content_type: &str, data: &[u8]) -> test::TestRequest {
    test::TestRequest::post()
        .uri(path)
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(multipart_body("file", file_name, content_type, data))
}

fn analysis_config(work_dir: &Path, engine: EngineConfig) -> AnalysisConfig {
    AnalysisConfig {
        work_dir: Some(work_dir.to_path_buf()),
        engine,
        ..AnalysisConfig::default()
    }
}

fn no_engine() -> EngineConfig {
    EngineConfig {
        enabled: false,
        ..EngineConfig::default()
    }
}

macro_rules! service {
    ($config:expr) => {
        test::init_service(
            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(Analyzer::new($config)))
                .configure(routes::configure),
        )
        .await
    };
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[actix_web::test]
async fn test_ten_packet_capture() {
    let work = TempDir::new().unwrap();
    let app = service!(analysis_config(work.path(), no_engine()));

    let resp = test::call_service(&app, upload_request("/api/analyze", "mixed.pcap", "application/vnd.tcpdump.pcap", &ten_packet_capture()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;

    assert_eq!(body["capture_info"]["total_packets"], 10);
    assert_eq!(body["capture_info"]["format"], "pcap");
    assert!((body["capture_info"]["duration"].as_f64().unwrap() - 1.75).abs() < 1e-9);

    let roots = body["protocol_hierarchy"].as_array().unwrap();
    let root_frames: u64 = roots.iter().map(|n| n["frames"].as_u64().unwrap()).sum();
    assert_eq!(root_frames, 10);

    let ipv4 = &roots[0]["children"][0];
    assert_eq!(ipv4["protocol"], "IPv4");
    let children = ipv4["children"].as_array().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!((children[0]["protocol"].as_str(), children[0]["frames"].as_u64()), (Some("TCP"), Some(6)));
    assert_eq!((children[1]["protocol"].as_str(), children[1]["frames"].as_u64()), (Some("UDP"), Some(4)));

    let tcp_streams = body["tcp_streams"].as_array().unwrap();
    assert_eq!(tcp_streams.len(), 1);
    assert_eq!(tcp_streams[0]["ip_src"], "192.168.1.10");
    assert_eq!(tcp_streams[0]["dport"], 8080);
    assert_eq!(tcp_streams[0]["text"], "hello world");
    assert!(body["udp_streams"].as_array().unwrap().is_empty());
    assert_eq!(body["stream_ordering"], "capture");

    let ips = body["ip_addresses"].as_array().unwrap();
    assert_eq!(ips.len(), 2);
    assert_eq!(ips[0]["ip"], "192.168.1.10");
    assert_eq!(ips[0]["is_private"], true);
    assert_eq!(ips[1]["is_private"], false);
    assert_eq!(body["external_resources"]["external_ips"][0], "203.0.113.80");

    assert!(dir_is_empty(work.path()));
}

#[actix_web::test]
async fn test_text_file_is_rejected() {
    let work = TempDir::new().unwrap();
    let app = service!(analysis_config(work.path(), no_engine()));

    let resp = test::call_service(&app, upload_request("/api/analyze", "capture.txt", "text/plain", b"not a capture").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_kind"], "InvalidUpload");
    assert!(body["message"].is_string());
}

#[actix_web::test]
async fn test_truncated_global_header() {
    let work = TempDir::new().unwrap();
    let app = service!(analysis_config(work.path(), no_engine()));
    let header = PcapBuilder::new(1).build();

    let resp = test::call_service(&app, upload_request("/api/analyze", "short.pcap", "application/octet-stream", &header[..20]).to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_kind"], "MalformedCapture");
    assert!(dir_is_empty(work.path()));
}

#[actix_web::test]
async fn test_unknown_format() {
    let work = TempDir::new().unwrap();
    let app = service!(analysis_config(work.path(), no_engine()));

    let resp = test::call_service(&app, upload_request("/api/analyze", "fake.pcap", "application/octet-stream", b"PK\x03\x04 zip archive").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_kind"], "UnsupportedFormat");
}

#[actix_web::test]
async fn test_missing_engine_returns_partial_result() {
    let work = TempDir::new().unwrap();
    let engine = EngineConfig {
        binary: PathBuf::from("/nonexistent/bin/suricata"),
        ..EngineConfig::default()
    };
    let app = service!(analysis_config(work.path(), engine));

    let resp = test::call_service(&app, upload_request("/api/analyze", "mixed.pcap", "application/octet-stream", &ten_packet_capture()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;

    for log in ["eve", "fast", "stats", "suricata"] {
        assert!(body["suricata"][log].is_null(), "{} should be null", log);
    }
    assert!(body["suricata"]["error"].as_str().unwrap().starts_with("SecurityEngineFailed"));
    assert_eq!(body["capture_info"]["total_packets"], 10);
    assert!(!body["protocol_hierarchy"].as_array().unwrap().is_empty());
    assert!(dir_is_empty(work.path()));
}

#[actix_web::test]
async fn test_upload_limits() {
    let work = TempDir::new().unwrap();
    let config = AnalysisConfig {
        max_capture_bytes: 100,
        ..analysis_config(work.path(), no_engine())
    };
    let app = service!(config);

    let resp = test::call_service(&app, upload_request("/api/analyze", "big.pcap", "application/octet-stream", &ten_packet_capture()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_kind"], "InvalidUpload");
    assert!(body["message"].as_str().unwrap().contains("size limit"));

    let resp = test::call_service(&app, upload_request("/api/analyze", "empty.pcap", "application/octet-stream", b"").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/analyze")
        .insert_header((header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY)))
        .set_payload(multipart_body("other", "x.pcap", "application/octet-stream", b"abc"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_kind"], "InvalidUpload");
}

#[actix_web::test]
async fn test_alias_and_determinism() {
    let work = TempDir::new().unwrap();
    let app = service!(analysis_config(work.path(), no_engine()));
    let capture = ten_packet_capture();

    let first: Value = test::read_body_json(
        test::call_service(&app, upload_request("/api/analyze", "a.pcap", "application/octet-stream", &capture).to_request()).await,
    )
    .await;
    let second: Value = test::read_body_json(
        test::call_service(&app, upload_request("/analyze", "a.pcap", "application/octet-stream", &capture).to_request()).await,
    )
    .await;

    assert_ne!(first["analysis_id"], second["analysis_id"]);
    for section in [
        "capture_info",
        "protocol_hierarchy",
        "mac_addresses",
        "ip_addresses",
        "tcp_streams",
        "udp_streams",
    ] {
        assert_eq!(first[section], second[section], "{} differs between runs", section);
    }
    assert!(dir_is_empty(work.path()));
}

#[actix_web::test]
async fn test_health_index_and_cors() {
    let work = TempDir::new().unwrap();
    let app = service!(analysis_config(work.path(), no_engine()));

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine_enabled"], false);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["stream_ordering"]["value"], "capture");
    assert_eq!(body["limits"]["max_upload_bytes"], 50 * 1024 * 1024);

    let preflight = test::TestRequest::default()
        .method(actix_web::http::Method::OPTIONS)
        .uri("/api/analyze")
        .insert_header((header::ORIGIN, "http://localhost:5173"))
        .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "POST"))
        .to_request();
    let resp = test::call_service(&app, preflight).await;
    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[cfg(unix)]
#[actix_web::test]
async fn test_engine_logs_are_normalized() {
    use std::os::unix::fs::PermissionsExt;

    let scripts = TempDir::new().unwrap();
    let binary = scripts.path().join("suricata");
    let script = r#"#!/bin/sh
while [ $# -gt 0 ]; do if [ "$1" = "-l" ]; then dir="$2"; fi; shift; done
cat > "$dir/eve.json" <<'EOF'
{"flow_id":1,"event_type":"dns","src_ip":"192.168.1.10","dest_ip":"8.8.8.8","dns":{"type":"query","id":7,"rrname":"example.com","rrtype":"A"}}
{"flow_id":1,"event_type":"alert","alert":{"signature_id":2013028,"severity":2}}
{"flow_id":1,"event_type":"fl
EOF
echo '10/05/2023-14:02:11.123456  [**] [1:2013028:7] ET POLICY test [**] [Classification: Misc] [Priority: 2] {TCP} 192.168.1.10:50000 -> 203.0.113.80:8080' > "$dir/fast.log"
printf 'decoder.pkts | Total | 10\n' > "$dir/stats.log"
echo '5/10/2023 -- 14:02:11 - <Notice> - This is Suricata version 7.0.2 RELEASE' > "$dir/suricata.log"
exit 0
"#;
    std::fs::write(&binary, script).unwrap();
    std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

    let work = TempDir::new().unwrap();
    let engine = EngineConfig {
        binary,
        timeout_secs: 20,
        ..EngineConfig::default()
    };
    let app = service!(analysis_config(work.path(), engine));

    let resp = test::call_service(&app, upload_request("/api/analyze", "mixed.pcap", "application/octet-stream", &ten_packet_capture()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let suricata = &body["suricata"];

    assert!(suricata["error"].is_null());
    assert!(suricata["eve"].as_str().unwrap().contains("example.com"));
    assert_eq!(suricata["events"]["dns"][0]["queries"][0]["rrname"], "example.com");
    assert_eq!(suricata["events"]["alert"].as_array().unwrap().len(), 1);
    assert_eq!(suricata["events"]["malformed_lines"], 1);
    assert_eq!(suricata["alerts"]["2"][0]["signature_id"], 2013028);
    assert_eq!(suricata["stats_counters"][0]["name"], "decoder.pkts");
    assert_eq!(suricata["engine_log"][0]["level"], "Notice");
    assert!(dir_is_empty(work.path()));
}
