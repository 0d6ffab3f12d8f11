// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use crate::{
    classifier::TxInfo, config::GasConfig, error::ExecError, gas::GasMeter,
    mode::ExecutionMode,
};
use pexec_primitives::{Address, Bytes, Coins, Event, Msg, Transaction};
use pexec_statedb::KvStore;
use rlp::{Decodable, Encodable};

/// Block level information visible to every transaction of the block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockEnv {
    pub height: u64,
    pub time: u64,
    pub chain_id: String,
    /// Block gas limit from the consensus parameters, 0 for unlimited.
    pub max_gas: u64,
}

/// Output of one message handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsgResult {
    pub data: Bytes,
    pub log: String,
    pub events: Vec<Event>,
}

/// The capabilities an application supplies to the engine. The engine
/// decides when and against which view they run; they never see anything
/// but their `TxContext`.
pub trait Application: Send + Sync {
    fn decode_tx(&self, raw: &[u8]) -> Result<Transaction, ExecError> {
        rlp::decode(raw).map_err(|e| ExecError::Decode(e.to_string()))
    }

    fn extract_tx_info(&self, tx: &Transaction) -> TxInfo { TxInfo::from(tx) }

    /// Signature, nonce and fee checks. Returns the gas wanted by the
    /// transaction. Writes made here are kept only if the transaction is
    /// accepted.
    fn ante(
        &self, ctx: &mut TxContext, tx: &Transaction,
    ) -> Result<u64, ExecError>;

    fn route_msg(
        &self, ctx: &mut TxContext, msg: &Msg,
    ) -> Result<MsgResult, ExecError>;

    /// Credits the refund for unused gas and returns it.
    fn refund_gas(
        &self, _ctx: &mut TxContext, _gas_wanted: u64, _gas_used: u64,
    ) -> Result<Coins, ExecError> {
        Ok(Coins::empty())
    }

    /// Credits the net fee of a whole block to the fee collector.
    fn update_fee_collector(
        &self, store: &mut dyn KvStore, net_fee: &Coins,
    ) -> Result<(), ExecError>;

    /// Keys `update_fee_collector` may write. They change once per block
    /// outside of any transaction; writes transactions make to them are
    /// still checked for conflicts.
    fn conflict_exempt_keys(&self) -> Vec<Bytes> { Vec::new() }
}

/// What application code sees while running for one transaction: block
/// env, the transaction's gas meter, a gas-charged view of the state and an
/// event sink.
pub struct TxContext<'c> {
    env: &'c BlockEnv,
    mode: ExecutionMode,
    gas_config: &'c GasConfig,
    info: &'c TxInfo,
    tx_index: usize,
    gas_meter: GasMeter,
    store: &'c mut dyn KvStore,
    events: Vec<Event>,
}

impl<'c> TxContext<'c> {
    pub fn new(
        env: &'c BlockEnv, mode: ExecutionMode, gas_config: &'c GasConfig,
        info: &'c TxInfo, tx_index: usize, gas_meter: GasMeter,
        store: &'c mut dyn KvStore,
    ) -> Self {
        TxContext {
            env,
            mode,
            gas_config,
            info,
            tx_index,
            gas_meter,
            store,
            events: Vec::new(),
        }
    }

    pub fn env(&self) -> &BlockEnv { self.env }

    pub fn mode(&self) -> ExecutionMode { self.mode }

    pub fn tx_info(&self) -> &TxInfo { self.info }

    pub fn sender(&self) -> &Address { &self.info.sender }

    pub fn tx_index(&self) -> usize { self.tx_index }

    pub fn gas_meter(&self) -> &GasMeter { &self.gas_meter }

    pub fn consume_gas(
        &mut self, amount: u64, descriptor: &str,
    ) -> Result<(), ExecError> {
        self.gas_meter.consume(amount, descriptor)
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>, ExecError> {
        self.consume_gas(self.gas_config.read_cost_flat, "ReadFlat")?;
        let value = self.store.get(key)?;
        if let Some(value) = &value {
            let per_byte = self.gas_config.read_cost(value.len())
                - self.gas_config.read_cost_flat;
            self.consume_gas(per_byte, "ReadPerByte")?;
        }
        Ok(value)
    }

    pub fn has(&mut self, key: &[u8]) -> Result<bool, ExecError> {
        self.consume_gas(self.gas_config.has_cost, "Has")?;
        Ok(self.store.has(key)?)
    }

    pub fn set(&mut self, key: Bytes, value: Bytes) -> Result<(), ExecError> {
        let cost = self.gas_config.write_cost(key.len(), value.len());
        self.consume_gas(cost, "Write")?;
        self.store.set(key, value);
        Ok(())
    }

    pub fn delete(&mut self, key: Bytes) -> Result<(), ExecError> {
        self.consume_gas(self.gas_config.delete_cost, "Delete")?;
        self.store.delete(key);
        Ok(())
    }

    pub fn get_decoded<T: Decodable>(
        &mut self, key: &[u8],
    ) -> Result<Option<T>, ExecError> {
        match self.get(key)? {
            None => Ok(None),
            Some(raw) => Ok(Some(
                rlp::decode(&raw).map_err(pexec_statedb::Error::from)?,
            )),
        }
    }

    pub fn set_encoded<T: Encodable>(
        &mut self, key: Bytes, value: &T,
    ) -> Result<(), ExecError> {
        self.set(key, rlp::encode(value).to_vec())
    }

    pub fn emit_event(&mut self, event: Event) { self.events.push(event); }

    pub fn events(&self) -> &[Event] { &self.events }

    pub(crate) fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn into_parts(self) -> (GasMeter, Vec<Event>) {
        (self.gas_meter, self.events)
    }
}
