//! Hostile payloads must never produce a malformed ATN: decoding either
//! succeeds with every graph invariant intact or fails with an error.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let words: Vec<u32> = data
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if let Ok(atn) = llstar::atn::codec::deserialize(&words) {
        // A decoded ATN must round-trip through the serializer.
        let reencoded = llstar::atn::codec::serialize(&atn);
        let again = llstar::atn::codec::deserialize(&reencoded).expect("round trip");
        assert_eq!(again.states.len(), atn.states.len());
    }
});
