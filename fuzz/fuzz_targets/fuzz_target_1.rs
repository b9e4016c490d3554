#![no_main]
use bp7::codec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(bndl) = codec::decode(data) {
        let _ = bndl.validate();
        let _ = bndl.id();
        // anything accepted must encode again and decode to the same bundle
        if let Ok(buf) = codec::encode(&bndl) {
            assert_eq!(codec::decode(&buf).ok(), Some(bndl));
        }
    }
});
