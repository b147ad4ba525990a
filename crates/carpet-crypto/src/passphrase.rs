//! One-time transfer passphrase generation and validation.

use crate::{CryptoError, PASSPHRASE_LEN};
use rand::Rng;

/// Characters a transfer passphrase may contain.
///
/// Lookalikes are excluded so a passphrase read off one screen can be
/// typed into another without ambiguity: no `l`, `I`, or `O`.
pub const ALPHABET: &[u8] = b"0123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";

/// Generate a one-time transfer passphrase.
///
/// Four characters drawn uniformly from [`ALPHABET`] using the OS-seeded
/// thread RNG.
#[must_use]
pub fn generate_passphrase() -> String {
    let mut rng = rand::thread_rng();
    (0..PASSPHRASE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Validate a passphrase entered on the sending side.
///
/// # Errors
///
/// Returns an error if the input is not exactly [`PASSPHRASE_LEN`]
/// characters or contains a character outside [`ALPHABET`].
pub fn validate_passphrase(input: &str) -> Result<(), CryptoError> {
    let actual = input.chars().count();
    if actual != PASSPHRASE_LEN {
        return Err(CryptoError::PassphraseLength {
            expected: PASSPHRASE_LEN,
            actual,
        });
    }
    for c in input.chars() {
        if !c.is_ascii() || !ALPHABET.contains(&(c as u8)) {
            return Err(CryptoError::PassphraseCharacter(c));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_length() {
        for _ in 0..100 {
            assert_eq!(generate_passphrase().len(), PASSPHRASE_LEN);
        }
    }

    #[test]
    fn test_generated_alphabet_membership() {
        for _ in 0..100 {
            let pw = generate_passphrase();
            for c in pw.chars() {
                assert!(ALPHABET.contains(&(c as u8)), "unexpected char {c:?}");
            }
        }
    }

    #[test]
    fn test_alphabet_size() {
        assert_eq!(ALPHABET.len(), 59);
    }

    #[test]
    fn test_lookalikes_excluded() {
        for banned in [b'l', b'I', b'O'] {
            assert!(!ALPHABET.contains(&banned));
        }
        for _ in 0..200 {
            let pw = generate_passphrase();
            assert!(!pw.contains(['l', 'I', 'O']));
        }
    }

    #[test]
    fn test_validate_accepts_generated() {
        for _ in 0..100 {
            validate_passphrase(&generate_passphrase()).unwrap();
        }
    }

    #[test]
    fn test_validate_rejects_wrong_length() {
        assert!(matches!(
            validate_passphrase("abc"),
            Err(CryptoError::PassphraseLength {
                expected: 4,
                actual: 3
            })
        ));
        assert!(validate_passphrase("").is_err());
        assert!(validate_passphrase("abcde").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_characters() {
        assert!(matches!(
            validate_passphrase("abcl"),
            Err(CryptoError::PassphraseCharacter('l'))
        ));
        assert!(matches!(
            validate_passphrase("abIc"),
            Err(CryptoError::PassphraseCharacter('I'))
        ));
        assert!(validate_passphrase("ab c").is_err());
        assert!(validate_passphrase("ab-d").is_err());
        assert!(validate_passphrase("abc\u{e9}").is_err());
    }

    #[test]
    fn test_validate_accepts_capital_l() {
        validate_passphrase("abcL").unwrap();
    }
}
