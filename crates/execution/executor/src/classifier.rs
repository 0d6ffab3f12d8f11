// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{context::Application, error::ExecError};
use hash::keccak;
use pexec_primitives::{Address, Coins, Transaction, H256};

/// Fee, signer and class of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxInfo {
    pub fee: Coins,
    pub sender: Address,
    pub gas_limit: u64,
    /// Contract-call class, gets unused gas refunded.
    pub privileged: bool,
}

impl From<&Transaction> for TxInfo {
    fn from(tx: &Transaction) -> Self {
        TxInfo {
            fee: tx.fee.clone(),
            sender: tx.sender,
            gas_limit: tx.gas_limit,
            privileged: tx.privileged,
        }
    }
}

/// A decoded transaction at its position in the block.
#[derive(Debug, Clone)]
pub struct TxEnvelope {
    pub index: usize,
    /// Keccak of the raw bytes.
    pub hash: H256,
    pub tx: Transaction,
    pub info: TxInfo,
}

pub fn classify<A: Application + ?Sized>(
    app: &A, index: usize, raw: &[u8],
) -> Result<TxEnvelope, ExecError> {
    let tx = app.decode_tx(raw)?;
    let info = app.extract_tx_info(&tx);
    trace!(
        "classified tx #{} from {:?}, privileged={}",
        index,
        info.sender,
        info.privileged
    );
    Ok(TxEnvelope {
        index,
        hash: keccak(raw),
        tx,
        info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_app::{address, MockBankApp, TxBuilder};

    #[test]
    fn test_hash_is_keccak_of_raw_bytes() {
        let app = MockBankApp::new();
        let raw = TxBuilder::new(address(1), 0).incr("a").encode();
        let envelope = classify(&app, 3, &raw).unwrap();
        assert_eq!(envelope.index, 3);
        assert_eq!(envelope.hash, keccak(&raw));
        assert_eq!(envelope.info, TxInfo::from(&envelope.tx));

        let other = TxBuilder::new(address(1), 1).incr("a").encode();
        assert_ne!(classify(&app, 3, &other).unwrap().hash, envelope.hash);
    }

    #[test]
    fn test_undecodable_bytes_rejected() {
        let app = MockBankApp::new();
        match classify(&app, 0, &[0xff, 0x01]) {
            Err(ExecError::Decode(_)) => {}
            other => panic!("unexpected classification {:?}", other),
        }
    }
}
