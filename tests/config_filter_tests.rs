//! Configuration files and command lines resolved together

use clap::Parser;
use spycraft::config::{Cli, Command, LegsConfig};
use spycraft::filter::{build_filter, extract_host, extract_port};
use spycraft::*;
use std::path::PathBuf;

const SITE_CONFIG: &str = r#"
[server]
filter = "src host 172.16.4.2 and udp port 5080"
name = "edge-west"
snapshot = 2048
verbose = 1
logfile = "none"

[pipelines]
capture = 8
scan = 256

[legs]
collate_header = "x-bridge-id"
linger = 60
"#;

fn write_config(dir: &tempfile::TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("spycraft.conf");
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_site_config_drives_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, SITE_CONFIG);

    let cli = Cli::try_parse_from([
        "spycraft",
        "-C",
        path.to_str().unwrap(),
        "trace",
        "calls.pcap",
    ])
    .unwrap();
    let (config_path, required) = cli.config_path();
    assert!(required);
    let config = Config::load(&config_path, required).unwrap();

    assert_eq!(config.server.snapshot, 2048);
    assert_eq!(config.pipelines.capture, 8);
    assert_eq!(config.pipelines.message, 128);
    assert_eq!(
        config.legs,
        LegsConfig {
            collate_header: "x-bridge-id".to_string(),
            linger: 60,
        }
    );

    let logging = cli.logging(&config.server);
    assert_eq!(logging.verbose, 1);
    assert_eq!(logging.logfile, None);

    let Command::Trace(args) = &cli.command else {
        panic!("expected trace");
    };
    let endpoint = Endpoint::resolve(args, &config.server).unwrap();
    assert_eq!(endpoint.host, "172.16.4.2".parse::<std::net::IpAddr>().unwrap());
    assert_eq!(endpoint.port, 5080);
    assert_eq!(endpoint.name, "edge-west");
    assert_eq!(endpoint.filter, "src host 172.16.4.2 and udp port 5080");
}

#[test]
fn test_command_line_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, SITE_CONFIG);
    let config = Config::load(&path, true).unwrap();

    let cli = Cli::try_parse_from([
        "spycraft",
        "-vvvv",
        "--logfile",
        "/var/log/spycraft.log",
        "dump",
        "--host",
        "172.16.4.9",
        "--port",
        "5060",
        "-n",
        "edge-east",
        "calls.pcap",
    ])
    .unwrap();
    let logging = cli.logging(&config.server);
    assert_eq!(logging.verbose, 4);
    assert_eq!(logging.logfile, Some(PathBuf::from("/var/log/spycraft.log")));

    let Command::Dump(args) = &cli.command else {
        panic!("expected dump");
    };
    let endpoint = Endpoint::resolve(args, &config.server).unwrap();
    assert_eq!(endpoint.name, "edge-east");
    assert_eq!(endpoint.filter, "host 172.16.4.9 and port 5060");
}

#[test]
fn test_collate_header_reaches_parser() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&write_config(&dir, SITE_CONFIG), true).unwrap();
    let parser = SipParser::new(config.legs.collate_header.as_str());

    let message = b"SIP/2.0 180 Ringing\r\nCall-ID: leg-b\r\nX-Bridge-ID: leg-a\r\n\r\n";
    let parsed = parser.parse(message).unwrap();
    assert_eq!(parsed.collation(), "leg-a");

    // the default hint header is no longer recognised
    let message = b"SIP/2.0 180 Ringing\r\nCall-ID: leg-b\r\nX-CollateID: leg-a\r\n\r\n";
    assert_eq!(parser.parse(message).unwrap().collation(), "leg-b");
}

#[test]
fn test_broken_config_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[pipelines]\nmessage = 0\n");
    let err = Config::load(&path, true).unwrap_err();
    assert_eq!(err.category(), "config");
    assert!(err.to_string().contains("message"));

    let path = write_config(&dir, "[legs]\nlinger = \"soon\"\n");
    assert!(Config::load(&path, true).is_err());
}

#[test]
fn test_filter_round_trip_through_endpoint() {
    for (ip, port) in [("192.0.2.7", 5060u16), ("2001:db8::7", 5070)] {
        let ip = ip.parse().unwrap();
        let filter = build_filter(ip, port);
        assert_eq!(extract_host(&filter), Some(ip));
        assert_eq!(extract_port(&filter), Some(port));
    }
    assert_eq!(extract_port("udp port 70000"), None);
    assert_eq!(extract_host("udp port 5060"), None);
}
