//! Property tests for the sealing layer.

use crypto::RootSecret;
use proptest::prelude::*;
use secure_rpc::cipher::{MessageCipher, MIN_SEALED_LEN, NONCE_LEN};
use secure_rpc::kdf::derive_key;
use secure_rpc::{SecureRpcError, SessionId};

fn cipher(root: [u8; 32]) -> MessageCipher {
    let id = SessionId::parse("property-session").unwrap();
    MessageCipher::new(&derive_key(&RootSecret::from_bytes(root), &id, "encryption"))
}

proptest! {
    #[test]
    fn open_inverts_seal(
        root in any::<[u8; 32]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..2048)
    ) {
        let cipher = cipher(root);
        let sealed = cipher.seal(&plaintext).unwrap();
        prop_assert_eq!(sealed.len(), plaintext.len() + MIN_SEALED_LEN);
        prop_assert_eq!(cipher.open(&sealed).unwrap(), plaintext);
    }

    #[test]
    fn any_flipped_bit_after_nonce_is_detected(
        root in any::<[u8; 32]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let cipher = cipher(root);
        let mut sealed = cipher.seal(&plaintext).unwrap();
        let index = NONCE_LEN + position.index(sealed.len() - NONCE_LEN);
        sealed[index] ^= 1 << bit;

        prop_assert!(matches!(cipher.open(&sealed), Err(SecureRpcError::Authentication)));
    }

    #[test]
    fn any_flipped_nonce_bit_is_detected(
        plaintext in prop::collection::vec(any::<u8>(), 0..64),
        index in 0..NONCE_LEN,
        bit in 0u8..8,
    ) {
        let cipher = cipher([9; 32]);
        let mut sealed = cipher.seal(&plaintext).unwrap();
        sealed[index] ^= 1 << bit;

        prop_assert!(matches!(cipher.open(&sealed), Err(SecureRpcError::Authentication)));
    }

    #[test]
    fn undersized_input_is_format_error(
        bytes in prop::collection::vec(any::<u8>(), 0..MIN_SEALED_LEN)
    ) {
        let len = bytes.len();
        let is_format_error = matches!(
            cipher([1; 32]).open(&bytes),
            Err(SecureRpcError::Format { len: l }) if l == len
        );
        prop_assert!(is_format_error);
    }
}
