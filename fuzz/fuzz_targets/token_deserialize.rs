//! Fuzz target for antiforgery token deserialization.
//!
//! Feeds arbitrary transport strings to the serializer. Anything it
//! accepts must serialize again and deserialize to the same token.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use std::sync::{Arc, OnceLock};

use armature_csrf::{
    BinaryTokenSerializer, ChaChaDataProtector, TOKEN_PURPOSE, TokenSerializer,
};

const SECRET: &[u8; 32] = b"fuzzing_secret_of_32_bytes_long!";

/// Arbitrary serializer input.
#[derive(Debug, Arbitrary)]
enum FuzzToken {
    /// Raw transport string
    Text(String),
    /// Base64url alphabet only, so input reaches the protector more often
    Alphabet(Vec<u8>),
}

fn serializer() -> &'static BinaryTokenSerializer {
    static SERIALIZER: OnceLock<BinaryTokenSerializer> = OnceLock::new();
    SERIALIZER.get_or_init(|| {
        let protector = ChaChaDataProtector::new(SECRET, TOKEN_PURPOSE)
            .expect("fixed secret is long enough");
        BinaryTokenSerializer::new(Arc::new(protector))
    })
}

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

fuzz_target!(|data: FuzzToken| {
    let input = match data {
        FuzzToken::Text(text) => text,
        FuzzToken::Alphabet(bytes) => bytes
            .iter()
            .map(|b| ALPHABET[*b as usize % ALPHABET.len()] as char)
            .collect(),
    };

    let serializer = serializer();
    let Ok(token) = serializer.deserialize(&input) else {
        return;
    };

    let again = serializer
        .serialize(&token)
        .expect("accepted token must serialize");
    let decoded = serializer
        .deserialize(&again)
        .expect("serialized token must deserialize");
    assert_eq!(decoded, token);
});
