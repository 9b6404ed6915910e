use hybrid_crypto::dh::DhPublicKey;
use hybrid_crypto::ml_kem::{MlKemCiphertext, MlKemPublicKey, ML_KEM_CIPHERTEXT_LEN};
use hybrid_crypto::traits::KemPublicKey;
use hybrid_crypto::{CryptoError, HybridKeyPair};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn seeded_pairs_always_agree(init_seed in any::<u64>(), resp_seed in any::<u64>()) {
        let mut init_rng = ChaCha20Rng::seed_from_u64(init_seed);
        let mut resp_rng = ChaCha20Rng::seed_from_u64(resp_seed);
        let initiator = HybridKeyPair::generate_with_rng(&mut init_rng);
        let responder = HybridKeyPair::generate_with_rng(&mut resp_rng);

        // Only bytes cross the wire.
        let init_dh = DhPublicKey::from_bytes(&initiator.dh_public().to_bytes()).unwrap();
        let init_kem = MlKemPublicKey::from_bytes(&initiator.kem_public().to_bytes()).unwrap();
        let resp_dh = DhPublicKey::from_bytes(&responder.dh_public().to_bytes()).unwrap();

        let mut encap_rng = ChaCha20Rng::seed_from_u64(init_seed ^ resp_seed);
        let (ciphertext, responder_root) = responder
            .respond(&init_dh, &init_kem, &mut encap_rng)
            .unwrap();
        let ciphertext = MlKemCiphertext::from_bytes(ciphertext.as_bytes()).unwrap();
        let initiator_root = initiator.complete(&resp_dh, &ciphertext).unwrap();

        prop_assert_eq!(initiator_root, responder_root);
    }
}

#[test]
fn tampered_ciphertext_breaks_agreement_silently() {
    let initiator = HybridKeyPair::generate();
    let responder = HybridKeyPair::generate();

    let init_dh = DhPublicKey::from_bytes(&initiator.dh_public().to_bytes()).unwrap();
    let resp_dh = DhPublicKey::from_bytes(&responder.dh_public().to_bytes()).unwrap();
    let init_kem = initiator.kem_public().clone();

    let (ciphertext, responder_root) = responder
        .respond(&init_dh, &init_kem, &mut rand::rngs::OsRng)
        .unwrap();

    let mut garbled = ciphertext.to_vec();
    garbled[ML_KEM_CIPHERTEXT_LEN / 2] ^= 0x80;
    let garbled = MlKemCiphertext::from_bytes(&garbled).unwrap();

    // No error: the mismatch only shows up when the first message fails to open.
    let initiator_root = initiator.complete(&resp_dh, &garbled).unwrap();
    assert_ne!(initiator_root, responder_root);
}

#[test]
fn truncated_peer_values_are_malformed_input() {
    let keypair = HybridKeyPair::generate();
    let kem_bytes = keypair.kem_public().to_bytes();

    let err = MlKemPublicKey::from_bytes(&kem_bytes[1..]).unwrap_err();
    assert!(err.is_malformed_input());

    let err = DhPublicKey::from_bytes(&[1]).unwrap_err();
    assert!(err.is_malformed_input());

    assert!(!CryptoError::DegenerateSharedSecret.is_malformed_input());
}
