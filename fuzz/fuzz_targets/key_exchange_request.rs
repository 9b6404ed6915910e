//! The responder must reject malformed key exchange requests without
//! panicking and without creating a session.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use secure_rpc::{EchoProcessor, KeyExchangeRequest, SecureRpcConfig, SecureService};

#[derive(Debug, Arbitrary)]
struct Input {
    client_id: String,
    dh_public_key: Vec<u8>,
    kem_public_key: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let Ok(service) = SecureService::new(SecureRpcConfig::default(), EchoProcessor) else {
        return;
    };
    let request = KeyExchangeRequest {
        client_id: input.client_id,
        dh_public_key: input.dh_public_key,
        kem_public_key: input.kem_public_key,
    };
    match service.key_exchange(request) {
        Ok(_) => assert_eq!(service.store().len(), 1),
        Err(_) => assert!(service.store().is_empty()),
    }
});
