//! EIP-7702 authorization tuples and their on-wire serializations.

use std::{fmt, str::FromStr};

use alloy_eips::eip7702::{Authorization, SignedAuthorization};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Field order of a serialized authorization tuple.
///
/// Bundlers disagree on where the signature parity sits, so the order is chosen per
/// endpoint instead of being hard coded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationTupleOrder {
    /// `[chainId, address, nonce, yParity, r, s]`, the EIP-7702 RLP order.
    #[default]
    ParityFirst,
    /// `[chainId, address, nonce, r, s, yParity]`
    SignatureFirst,
}

impl fmt::Display for AuthorizationTupleOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParityFirst => f.write_str("parity-first"),
            Self::SignatureFirst => f.write_str("signature-first"),
        }
    }
}

impl FromStr for AuthorizationTupleOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parity-first" | "parityfirst" => Ok(Self::ParityFirst),
            "signature-first" | "signaturefirst" => Ok(Self::SignatureFirst),
            other => Err(format!("unknown authorization tuple order {other:?}")),
        }
    }
}

/// The unsigned tuple a delegating account signs.
pub fn unsigned_authorization(chain_id: u64, delegate: Address, nonce: u64) -> Authorization {
    Authorization { chain_id: U256::from(chain_id), address: delegate, nonce }
}

/// Serializes a signed authorization as a JSON array in the requested order, every number
/// as a `0x` quantity.
pub fn authorization_tuple(
    auth: &SignedAuthorization,
    order: AuthorizationTupleOrder,
) -> Vec<serde_json::Value> {
    let quantity = |value: U256| serde_json::Value::String(format!("{value:#x}"));
    let chain_id = quantity(auth.chain_id);
    let address = serde_json::Value::String(auth.address.to_checksum(None));
    let nonce = quantity(U256::from(auth.nonce));
    let y_parity = quantity(U256::from(auth.y_parity()));
    let r = quantity(auth.r());
    let s = quantity(auth.s());
    match order {
        AuthorizationTupleOrder::ParityFirst => vec![chain_id, address, nonce, y_parity, r, s],
        AuthorizationTupleOrder::SignatureFirst => vec![chain_id, address, nonce, r, s, y_parity],
    }
}

/// True when `auth` was signed by `authority` for `chain_id`, or for any chain (chain id 0).
pub fn is_signed_by(auth: &SignedAuthorization, authority: Address, chain_id: u64) -> bool {
    let chain_matches = auth.chain_id.is_zero() || auth.chain_id == U256::from(chain_id);
    chain_matches && auth.recover_authority().is_ok_and(|recovered| recovered == authority)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    fn signed(signer: &PrivateKeySigner) -> SignedAuthorization {
        let auth = unsigned_authorization(
            8453,
            address!("e6Cae83BdE06E4c305530e199D7217f42808555B"),
            3,
        );
        let signature = signer.sign_hash_sync(&auth.signature_hash()).unwrap();
        auth.into_signed(signature)
    }

    #[test]
    fn tuple_orders_place_parity() {
        let signer = PrivateKeySigner::random();
        let auth = signed(&signer);
        let parity_first = authorization_tuple(&auth, AuthorizationTupleOrder::ParityFirst);
        let signature_first = authorization_tuple(&auth, AuthorizationTupleOrder::SignatureFirst);

        assert_eq!(parity_first.len(), 6);
        assert_eq!(parity_first[0], "0x2105");
        assert_eq!(parity_first[1], "0xe6Cae83BdE06E4c305530e199D7217f42808555B");
        assert_eq!(parity_first[2], "0x3");
        assert_eq!(parity_first[3], signature_first[5]);
        assert_eq!(parity_first[4], signature_first[3]);
        assert_eq!(parity_first[5], signature_first[4]);
    }

    #[test]
    fn recovers_signer() {
        let signer = PrivateKeySigner::random();
        let auth = signed(&signer);
        assert!(is_signed_by(&auth, signer.address(), 8453));
        assert!(!is_signed_by(&auth, signer.address(), 1));
        assert!(!is_signed_by(&auth, Address::ZERO, 8453));
    }

    #[test]
    fn order_parses_from_config() {
        assert_eq!(
            "signature-first".parse::<AuthorizationTupleOrder>(),
            Ok(AuthorizationTupleOrder::SignatureFirst)
        );
        assert_eq!(AuthorizationTupleOrder::default().to_string(), "parity-first");
        assert!("rsv".parse::<AuthorizationTupleOrder>().is_err());
    }

    #[test]
    fn serializes_as_bundler_object() {
        let signer = PrivateKeySigner::random();
        let auth = signed(&signer);
        let json = serde_json::to_value(&auth).unwrap();
        assert_eq!(json["chainId"], "0x2105");
        assert_eq!(json["nonce"], "0x3");
        assert!(json.get("yParity").is_some());
        let back: SignedAuthorization = serde_json::from_value(json).unwrap();
        assert_eq!(back, auth);
    }
}
