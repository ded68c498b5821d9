//! Decoder link through the public API, with `cat` standing in for the
//! decoder so every command comes straight back as a status line.

#![cfg(unix)]

use std::sync::mpsc;
use std::time::Duration;

use playdeck::config::DecoderConfig;
use playdeck::decoder::{DecoderProcess, MAX_PACKET_LEN};
use playdeck::link::{spawn_decoder_thread, LinkEvent};

fn cat_decoder() -> DecoderConfig {
    DecoderConfig {
        program: "cat".to_string(),
        args: Vec::new(),
        redundant_prefix: "@@".to_string(),
    }
}

fn next_event(rx: &mpsc::Receiver<LinkEvent>) -> LinkEvent {
    rx.recv_timeout(Duration::from_secs(5))
        .expect("no event from decoder thread")
}

#[test]
fn echoed_commands_arrive_as_packets() {
    let (mut process, channel) = DecoderProcess::spawn(&cat_decoder()).unwrap();
    let (packets, mut commands) = channel.split();
    let (tx, rx) = mpsc::channel();
    let reader = spawn_decoder_thread(packets, tx);

    commands.send_command("@R MPG123 (ThOr) v10").unwrap();
    commands.send_command("@@ frame noise").unwrap();
    commands.send_command("@P 2").unwrap();

    match next_event(&rx) {
        LinkEvent::Packet(p) => assert_eq!(p.as_str(), "@R MPG123 (ThOr) v10"),
        other => panic!("unexpected event {:?}", other),
    }
    match next_event(&rx) {
        LinkEvent::Packet(p) => {
            assert_eq!(p.tag(), "@P");
            assert_eq!(p.body(), "2");
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Closing stdin makes cat exit, which the reader sees as end of stream.
    drop(commands);
    assert!(matches!(next_event(&rx), LinkEvent::DecoderClosed));
    reader.join().unwrap();
    assert!(process.wait().unwrap().success());
}

#[test]
fn long_lines_are_capped() {
    let (_process, mut channel) = DecoderProcess::spawn(&cat_decoder()).unwrap();

    let long = format!("@I {}", "x".repeat(3000));
    channel.send_command(&long).unwrap();
    channel.send_command("@P 1").unwrap();

    let packet = channel.read_packet().unwrap();
    assert_eq!(packet.as_str().len(), MAX_PACKET_LEN);
    assert!(packet.was_truncated());
    // The rest of the long line is discarded, not read as a new packet.
    assert_eq!(channel.read_packet().unwrap().as_str(), "@P 1");
}

#[test]
fn commands_with_newlines_are_rejected() {
    let (_process, mut channel) = DecoderProcess::spawn(&cat_decoder()).unwrap();
    assert!(channel.send_command("LOAD a\nQUIT").is_err());
    channel.send_command("STOP").unwrap();
    assert_eq!(channel.read_packet().unwrap().as_str(), "STOP");
}
