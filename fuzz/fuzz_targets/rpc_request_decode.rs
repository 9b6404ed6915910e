//! Frames read by `serve_connection` come straight off the network.

#![no_main]

use bincode::Options;
use libfuzzer_sys::fuzz_target;
use secure_rpc::transport::RpcRequest;

fuzz_target!(|data: &[u8]| {
    let _ = bincode::DefaultOptions::new()
        .with_limit(data.len() as u64)
        .deserialize::<RpcRequest>(data);
});
