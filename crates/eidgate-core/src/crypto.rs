use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::RngCore;
use zeroize::Zeroizing;

/// Verify an Ed25519 signature. Malformed keys or signatures verify as false.
pub fn verify_ed25519(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    verifying_key
        .verify(message, &Signature::from_bytes(&sig_bytes))
        .is_ok()
}

/// Fill a fresh buffer from the operating system CSPRNG.
pub fn random_bytes(len: usize) -> Zeroizing<Vec<u8>> {
    let mut bytes = Zeroizing::new(vec![0u8; len]);
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Short hex rendering of a byte string for log fields.
pub fn short_hex(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(8)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn test_verify_valid_signature() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let message = b"digest bytes";
        let signature = signing_key.sign(message);
        assert!(verify_ed25519(
            signing_key.verifying_key().as_bytes(),
            message,
            &signature.to_bytes()
        ));
    }

    #[test]
    fn test_verify_wrong_message() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let signature = signing_key.sign(b"message A");
        assert!(!verify_ed25519(
            signing_key.verifying_key().as_bytes(),
            b"message B",
            &signature.to_bytes()
        ));
    }

    #[test]
    fn test_verify_malformed_inputs() {
        assert!(!verify_ed25519(&[0u8; 16], b"m", &[0u8; 64]));
        assert!(!verify_ed25519(&[0u8; 32], b"m", &[0u8; 12]));
    }

    #[test]
    fn test_random_bytes_length_and_freshness() {
        let a = random_bytes(20);
        let b = random_bytes(20);
        assert_eq!(a.len(), 20);
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_short_hex() {
        assert_eq!(short_hex(&[0xab; 20]), "abababababababab");
        assert_eq!(short_hex(&[0x01]), "01");
    }
}
