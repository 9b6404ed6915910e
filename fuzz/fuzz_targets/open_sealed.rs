//! Opening attacker-supplied bytes must fail cleanly, never panic, and
//! never succeed without the key.

#![no_main]

use crypto::RootSecret;
use libfuzzer_sys::fuzz_target;
use secure_rpc::cipher::MessageCipher;
use secure_rpc::kdf::derive_key;
use secure_rpc::SessionId;

fuzz_target!(|data: &[u8]| {
    let Some(id) = SessionId::parse("fuzz-session") else {
        return;
    };
    let key = derive_key(&RootSecret::from_bytes([7; 32]), &id, "encryption");
    assert!(MessageCipher::new(&key).open(data).is_err());
});
