//! End-to-end tests: wire bytes through the framer, the state machine and the
//! dispatch loop

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::{BufMut, BytesMut};
use craft_protocol::config::ClientConfig;
use craft_protocol::core::codec::WriteExt;
use craft_protocol::core::frame::FrameCodec;
use craft_protocol::core::packet::RawPacket;
use craft_protocol::protocol::palette::palette_for_version;
use craft_protocol::protocol::version::MC_1_21;
use craft_protocol::protocol::{DisconnectReason, Handler, PacketWriter, PlayPacketIn, PlayPacketOut};
use craft_protocol::transport::{ConnectOptions, Connection};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::io::DuplexStream;
use tokio_util::codec::{Decoder, Framed};
use uuid::Uuid;

#[test]
fn test_compressed_keep_alive_from_raw_bytes() {
    let mut codec = FrameCodec::default();
    let mut wire = BytesMut::new();

    // Set Compression(64): length 2, id 0x03, threshold 0x40
    wire.put_slice(&[0x02, 0x03, 0x40]);
    // Keep Alive under the threshold: length 10, data length 0, id 0x26, i64
    wire.put_slice(&[0x0A, 0x00, 0x26]);
    wire.put_i64(0x0102_0304_0506_0708);

    let set_compression = codec.decode(&mut wire).unwrap().unwrap();
    assert_eq!(set_compression.id, 0x03);
    let threshold = set_compression.reader().read_varint().unwrap();
    assert_eq!(threshold, 64);
    codec.set_compression_threshold(threshold);

    let keep_alive = codec.decode(&mut wire).unwrap().unwrap();
    assert!(wire.is_empty());
    assert_eq!(keep_alive.id, 0x26);
    assert_eq!(keep_alive.reader().read_i64().unwrap(), 0x0102_0304_0506_0708);

    let palette = palette_for_version(MC_1_21, None).unwrap();
    assert_eq!(palette.play_in(keep_alive.id), PlayPacketIn::KeepAlive);
    assert_eq!(palette.play_out(PlayPacketOut::KeepAlive), Some(0x18));
}

#[derive(Default)]
struct Session {
    keep_alives: Mutex<Vec<i64>>,
    lost: Mutex<Vec<DisconnectReason>>,
}

impl Handler for Session {
    fn on_keep_alive(&self, id: i64) {
        self.keep_alives.lock().unwrap().push(id);
    }

    fn on_connection_lost(&self, reason: DisconnectReason, _message: &str) {
        self.lost.lock().unwrap().push(reason);
    }
}

async fn expect_packet(server: &mut Framed<DuplexStream, FrameCodec>, id: i32) -> RawPacket {
    let packet = server.next().await.unwrap().unwrap();
    assert_eq!(packet.id, id, "unexpected serverbound packet");
    packet
}

#[tokio::test]
async fn test_login_configuration_and_play_over_a_stream() {
    let (client, server) = tokio::io::duplex(256 * 1024);
    let session = Arc::new(Session::default());
    let config = ClientConfig::default_with_overrides(|c| {
        c.connection.protocol_version = MC_1_21;
        c.connection.username = "Tester".into();
    });

    let server_task = tokio::spawn(async move {
        let mut server = Framed::new(server, FrameCodec::default());
        expect_packet(&mut server, 0x00).await; // handshake
        expect_packet(&mut server, 0x00).await; // login start

        let mut threshold = BytesMut::new();
        threshold.put_varint(64);
        server.send(RawPacket::new(0x03, threshold)).await.unwrap();
        server.codec_mut().set_compression_threshold(64);

        let mut success = BytesMut::new();
        success.put_uuid(&Uuid::from_u128(7));
        success.put_string("Tester");
        success.put_varint(0);
        success.put_bool(true);
        server.send(RawPacket::new(0x02, success)).await.unwrap();

        expect_packet(&mut server, 0x03).await; // login acknowledged
        expect_packet(&mut server, 0x00).await; // client information

        server.send(RawPacket::new(0x03, BytesMut::new())).await.unwrap();
        expect_packet(&mut server, 0x03).await; // finish configuration ack

        // an unmapped play packet above the threshold travels compressed
        server.send(RawPacket::new(0x7C, vec![0x55u8; 1_000])).await.unwrap();

        let mut keep_alive = BytesMut::new();
        keep_alive.put_i64(42);
        server.send(RawPacket::new(0x26, keep_alive)).await.unwrap();
        let echo = expect_packet(&mut server, 0x18).await;
        assert_eq!(&echo.payload[..], &42i64.to_be_bytes());
    });

    let mut connection = Connection::run(client, &config, session.clone(), ConnectOptions::default())
        .await
        .unwrap();
    server_task.await.unwrap();

    // the server side is gone now, so the loop ends on its own
    connection.wait().await;
    assert!(connection.is_closed());

    assert_eq!(*session.keep_alives.lock().unwrap(), vec![42]);
    assert_eq!(*session.lost.lock().unwrap(), vec![DisconnectReason::ConnectionLost]);

    let snapshot = connection.metrics().snapshot();
    assert!(snapshot.compressed_frames >= 1);
    assert_eq!(snapshot.ignored_packets, 1);
    assert_eq!(snapshot.decode_failures, 0);

    let protocol = connection.protocol().lock().await;
    assert_eq!(protocol.uuid(), Some(Uuid::from_u128(7)));
}

#[tokio::test]
async fn test_outbound_frame_bytes_below_threshold() {
    // Keep Alive echo under threshold 64: length 10, data length 0, id 0x18
    let mut expected = vec![0x0A, 0x00, 0x18];
    expected.extend_from_slice(&42i64.to_be_bytes());
    let mock = tokio_test::io::Builder::new().write(&expected).build();

    let writer = PacketWriter::new(mock, FrameCodec::default());
    writer.set_compression_threshold(64).await;

    let mut payload = BytesMut::new();
    payload.put_i64(42);
    writer.send(RawPacket::new(0x18, payload)).await.unwrap();
}
