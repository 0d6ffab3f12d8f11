// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{coin::Coins, Bytes};
use ethereum_types::Address;
use rlp_derive::{RlpDecodable, RlpEncodable};

/// One message of a transaction. `route` selects the handler that executes
/// it, `msg_type` is the handler-specific action and `body` its payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Msg {
    pub route: String,
    pub msg_type: String,
    pub body: Bytes,
}

impl Msg {
    pub fn new(
        route: impl Into<String>, msg_type: impl Into<String>, body: Bytes,
    ) -> Self {
        Msg {
            route: route.into(),
            msg_type: msg_type.into(),
            body,
        }
    }

    /// Stateless self-consistency check.
    pub fn validate_basic(&self) -> Result<(), String> {
        if self.route.is_empty() {
            return Err("message route is empty".into());
        }
        if self.msg_type.is_empty() {
            return Err(format!("message on route {} has no type", self.route));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Transaction {
    pub nonce: u64,
    pub sender: Address,
    pub fee: Coins,
    pub gas_limit: u64,
    pub msgs: Vec<Msg>,
    /// Contract-call class transactions get their unused gas refunded.
    pub privileged: bool,
}

impl Transaction {
    pub fn rlp_bytes(&self) -> Bytes { rlp::encode(self).to_vec() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Coin;

    fn sample() -> Transaction {
        Transaction {
            nonce: 7,
            sender: Address::from_low_u64_be(42),
            fee: Coins::new(vec![Coin::new("okt", 100)]),
            gas_limit: 50_000,
            msgs: vec![Msg::new("bank", "send", vec![1, 2, 3])],
            privileged: true,
        }
    }

    #[test]
    fn test_decode_encoded() {
        let tx = sample();
        let decoded: Transaction = rlp::decode(&tx.rlp_bytes()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn test_encoding_covers_all_fields() {
        let tx = sample();
        let mut other = tx.clone();
        other.privileged = false;
        assert_ne!(tx.rlp_bytes(), other.rlp_bytes());
    }

    #[test]
    fn test_validate_basic() {
        assert!(Msg::new("bank", "send", vec![]).validate_basic().is_ok());
        assert!(Msg::new("", "send", vec![]).validate_basic().is_err());
        assert!(Msg::new("bank", "", vec![]).validate_basic().is_err());
    }
}
