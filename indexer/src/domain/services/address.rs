//! Bech32 account address derivation from a signer public key.
//!
//! Cosmos account addresses are `bech32(prefix, ripemd160(sha256(pubkey)))`
//! over the 33-byte compressed secp256k1 key.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bech32::{ToBase32, Variant};
use ripemd::Ripemd160;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::errors::ParseError;

/// Derive the bech32 account address for a signer public key in its JSON
/// wire form. For a legacy-amino multisig the first inner key is used.
pub fn derive_bech32_from_pubkey(
    pubkey: &Value,
    prefix: &str,
    legacy_amino_multisig: bool,
) -> Result<String, ParseError> {
    let key_field = if legacy_amino_multisig {
        pubkey
            .get("public_keys")
            .and_then(Value::as_array)
            .and_then(|keys| keys.first())
            .and_then(|k| k.get("key"))
    } else {
        pubkey.get("key")
    };

    let key_b64 = key_field.and_then(Value::as_str).ok_or_else(|| {
        ParseError::MalformedField("public key carries no key material".to_string())
    })?;

    let key_bytes = BASE64
        .decode(key_b64)
        .map_err(|e| ParseError::MalformedField(format!("public key is not base64: {}", e)))?;

    let sha = Sha256::digest(&key_bytes);
    let hash = Ripemd160::digest(sha);

    bech32::encode(prefix, hash.to_base32(), Variant::Bech32)
        .map_err(|e| ParseError::MalformedField(format!("bech32 encoding failed: {}", e)))
}

/// True when the signer mode info marks a legacy-amino multisig
pub fn is_legacy_amino_multisig(mode_info: Option<&Value>) -> bool {
    match mode_info.and_then(|m| m.get("multi")) {
        Some(multi) => multi.to_string().contains("SIGN_MODE_LEGACY_AMINO_JSON"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Compressed secp256k1 generator point, a well-formed 33 byte key
    const KEY_B64: &str = "Anm+Zn753LusVaBilc6HCwcCm/zbLc4o2VnygVsW+BeY";

    #[test]
    fn derives_a_bech32_address_with_the_prefix() {
        let pubkey = json!({
            "@type": "/cosmos.crypto.secp256k1.PubKey",
            "key": KEY_B64,
        });
        let address = derive_bech32_from_pubkey(&pubkey, "osmo", false).unwrap();
        assert!(address.starts_with("osmo1"));
        // 39 chars of data follow the prefix and separator
        assert_eq!(address.len(), "osmo".len() + 39);
    }

    #[test]
    fn multisig_unwraps_to_the_first_inner_key() {
        let multisig = json!({
            "@type": "/cosmos.crypto.multisig.LegacyAminoPubKey",
            "threshold": 2,
            "public_keys": [
                {"@type": "/cosmos.crypto.secp256k1.PubKey", "key": KEY_B64},
                {"@type": "/cosmos.crypto.secp256k1.PubKey", "key": KEY_B64},
            ],
        });
        let single = json!({"key": KEY_B64});

        let from_multi = derive_bech32_from_pubkey(&multisig, "osmo", true).unwrap();
        let from_single = derive_bech32_from_pubkey(&single, "osmo", false).unwrap();
        assert_eq!(from_multi, from_single);
    }

    #[test]
    fn detects_legacy_amino_mode() {
        let mode_info = json!({
            "multi": {
                "bitarray": {"extra_bits_stored": 2, "elems": "wA=="},
                "mode_infos": [
                    {"single": {"mode": "SIGN_MODE_LEGACY_AMINO_JSON"}},
                ],
            }
        });
        assert!(is_legacy_amino_multisig(Some(&mode_info)));

        let single = json!({"single": {"mode": "SIGN_MODE_DIRECT"}});
        assert!(!is_legacy_amino_multisig(Some(&single)));
        assert!(!is_legacy_amino_multisig(None));
    }

    #[test]
    fn missing_key_material_is_an_error() {
        let pubkey = json!({"@type": "/cosmos.crypto.secp256k1.PubKey"});
        assert!(derive_bech32_from_pubkey(&pubkey, "osmo", false).is_err());
    }
}
