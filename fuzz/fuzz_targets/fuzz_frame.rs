#![no_main]

use bytes::BytesMut;
use craft_protocol::core::frame::FrameCodec;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Plain framing, then the same bytes with compression on
    for threshold in [-1, 0] {
        let mut codec = FrameCodec::new(1024 * 1024);
        codec.set_compression_threshold(threshold);
        let mut buf = BytesMut::from(data);

        // Decode until the buffer runs dry or a frame is rejected
        while let Ok(Some(packet)) = codec.decode(&mut buf) {
            let _ = packet.reader().read_varint();
        }
    }
});
