#![no_main]

use craft_protocol::core::nbt;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for anonymous in [false, true] {
        if let Ok(tree) = nbt::parse_nbt(data, anonymous) {
            // Anything that parses must survive a re-encode
            if let Ok(bytes) = nbt::to_bytes(&tree, anonymous) {
                let _ = nbt::parse_nbt(&bytes, anonymous);
            }
        }
    }
});
