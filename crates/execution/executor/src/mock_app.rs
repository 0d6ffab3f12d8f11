// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

//! A small bank application: accounts with a nonce and a balance, transfers,
//! named counters and a few messages that fail on purpose. Used by the tests
//! and the bench binary.

use crate::{
    context::{Application, MsgResult, TxContext},
    error::{codes, ExecError},
    router::MsgRouter,
};
use pexec_primitives::{
    account_key, Account, Address, Bytes, Coins, Event, Msg, Transaction,
    CODESPACE_ROOT,
};
use pexec_statedb::{KvStore, KvStoreExt, Snapshot, StateView, StateViewExt};
use rlp::{Decodable, Encodable};
use rlp_derive::{RlpDecodable, RlpEncodable};

pub const FEE_DENOM: &str = "okt";
pub const BANK_CODESPACE: &str = "bank";
/// Code of the `bank/fail` message.
pub const CODE_BANK_FAILED: u32 = 10;
/// Ante gas charged per message for signature verification.
pub const SIG_VERIFY_GAS: u64 = 500;
pub const COUNTER_KEY_PREFIX: &[u8] = b"ctr/";
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;
pub const DEFAULT_FEE: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct SendMsg {
    pub to: Address,
    pub amount: Coins,
}

pub struct MockBankApp {
    router: MsgRouter,
    fee_collector: Address,
}

impl Default for MockBankApp {
    fn default() -> Self { Self::new() }
}

impl MockBankApp {
    pub fn new() -> Self {
        MockBankApp {
            router: MsgRouter::new()
                .add_route("bank", handle_bank)
                .add_route("store", handle_store),
            fee_collector: Address::from_low_u64_be(0xfee),
        }
    }

    pub fn fee_collector(&self) -> Address { self.fee_collector }

    pub fn fee_collector_key(&self) -> Bytes {
        account_key(&self.fee_collector)
    }
}

impl Application for MockBankApp {
    fn ante(
        &self, ctx: &mut TxContext, tx: &Transaction,
    ) -> Result<u64, ExecError> {
        let key = account_key(ctx.sender());
        let mut account: Account = ctx.get_decoded(&key)?.unwrap_or_default();
        if account.nonce != tx.nonce {
            return Err(ExecError::app(
                CODESPACE_ROOT,
                codes::INVALID_SEQUENCE,
                format!(
                    "account sequence mismatch, expected {}, got {}",
                    account.nonce, tx.nonce
                ),
            ));
        }
        ctx.consume_gas(
            SIG_VERIFY_GAS.saturating_mul(tx.msgs.len() as u64),
            "ante verify: secp256k1",
        )?;
        account.balance = account.balance.checked_sub(&tx.fee).map_err(|e| {
            ExecError::app(
                CODESPACE_ROOT,
                codes::INSUFFICIENT_FUNDS,
                format!("insufficient funds to pay for fees; {}", e),
            )
        })?;
        account.nonce += 1;
        ctx.set_encoded(key, &account)?;
        ctx.emit_event(
            Event::new("tx").with_attribute("fee", tx.fee.to_string()),
        );
        Ok(tx.gas_limit)
    }

    fn route_msg(
        &self, ctx: &mut TxContext, msg: &Msg,
    ) -> Result<MsgResult, ExecError> {
        self.router.route(ctx, msg)
    }

    /// Returns half of the fee share of the unused gas.
    fn refund_gas(
        &self, ctx: &mut TxContext, gas_wanted: u64, gas_used: u64,
    ) -> Result<Coins, ExecError> {
        let unused = gas_wanted.saturating_sub(gas_used);
        let refund =
            ctx.tx_info().fee.mul_ratio(unused, gas_wanted).mul_ratio(1, 2);
        if refund.is_zero() {
            return Ok(refund);
        }
        let sender = *ctx.sender();
        credit(ctx, &sender, &refund)?;
        Ok(refund)
    }

    fn update_fee_collector(
        &self, store: &mut dyn KvStore, net_fee: &Coins,
    ) -> Result<(), ExecError> {
        let key = self.fee_collector_key();
        let mut collector: Account =
            store.get_decoded(&key)?.unwrap_or_default();
        collector.balance =
            collector.balance.checked_add(net_fee).map_err(|e| {
                ExecError::app(BANK_CODESPACE, codes::INTERNAL, e.to_string())
            })?;
        store.set_encoded(key, &collector);
        Ok(())
    }

    fn conflict_exempt_keys(&self) -> Vec<Bytes> {
        vec![self.fee_collector_key()]
    }
}

fn decode_body<T: Decodable>(msg: &Msg) -> Result<T, ExecError> {
    rlp::decode(&msg.body).map_err(|e| {
        ExecError::Validation(format!(
            "malformed {}/{} body: {}",
            msg.route, msg.msg_type, e
        ))
    })
}

fn handle_bank(
    ctx: &mut TxContext, msg: &Msg,
) -> Result<MsgResult, ExecError> {
    match msg.msg_type.as_str() {
        "send" => {
            let SendMsg { to, amount } = decode_body(msg)?;
            let from = *ctx.sender();
            debit(ctx, &from, &amount)?;
            credit(ctx, &to, &amount)?;
            Ok(MsgResult {
                events: vec![Event::new("transfer")
                    .with_attribute("recipient", format!("{:?}", to))
                    .with_attribute("amount", amount.to_string())],
                ..Default::default()
            })
        }
        "fail" => Err(ExecError::app(
            BANK_CODESPACE,
            CODE_BANK_FAILED,
            "bank message failed",
        )),
        "burn_gas" => {
            let amount: u64 = decode_body(msg)?;
            ctx.consume_gas(amount, "burn")?;
            Ok(MsgResult::default())
        }
        "panic" => panic!("bank message panicked"),
        other => Err(ExecError::app(
            CODESPACE_ROOT,
            codes::UNKNOWN_REQUEST,
            format!("unrecognized bank message type: {}", other),
        )),
    }
}

fn handle_store(
    ctx: &mut TxContext, msg: &Msg,
) -> Result<MsgResult, ExecError> {
    match msg.msg_type.as_str() {
        "incr" => {
            let key = counter_key(&msg.body);
            let value = ctx.get_decoded::<u64>(&key)?.unwrap_or(0) + 1;
            ctx.set_encoded(key, &value)?;
            Ok(MsgResult {
                data: rlp::encode(&value).to_vec(),
                log: format!("counter is now {}", value),
                ..Default::default()
            })
        }
        other => Err(ExecError::app(
            CODESPACE_ROOT,
            codes::UNKNOWN_REQUEST,
            format!("unrecognized store message type: {}", other),
        )),
    }
}

fn debit(
    ctx: &mut TxContext, address: &Address, amount: &Coins,
) -> Result<(), ExecError> {
    let key = account_key(address);
    let mut account: Account = ctx.get_decoded(&key)?.unwrap_or_default();
    account.balance = account.balance.checked_sub(amount).map_err(|e| {
        ExecError::app(CODESPACE_ROOT, codes::INSUFFICIENT_FUNDS, e.to_string())
    })?;
    ctx.set_encoded(key, &account)
}

fn credit(
    ctx: &mut TxContext, address: &Address, amount: &Coins,
) -> Result<(), ExecError> {
    let key = account_key(address);
    let mut account: Account = ctx.get_decoded(&key)?.unwrap_or_default();
    account.balance = account.balance.checked_add(amount).map_err(|e| {
        ExecError::app(BANK_CODESPACE, codes::INTERNAL, e.to_string())
    })?;
    ctx.set_encoded(key, &account)
}

pub fn counter_key(name: &[u8]) -> Bytes {
    let mut key = COUNTER_KEY_PREFIX.to_vec();
    key.extend_from_slice(name);
    key
}

pub fn address(seed: u64) -> Address { Address::from_low_u64_be(seed) }

/// Genesis state funding each account with `FEE_DENOM`.
pub fn genesis(accounts: &[(Address, u64)]) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for (address, amount) in accounts {
        snapshot.set_encoded(
            account_key(address),
            &Account::new(0, Coins::single(FEE_DENOM, *amount)),
        );
    }
    snapshot
}

pub fn account_of(state: &dyn StateView, address: &Address) -> Account {
    match state.get_decoded(&account_key(address)) {
        Ok(account) => account.unwrap_or_default(),
        Err(e) => panic!("corrupted account {:?}: {}", address, e),
    }
}

pub fn balance_of(state: &dyn StateView, address: &Address) -> u64 {
    account_of(state, address).balance.amount_of(FEE_DENOM)
}

pub fn counter_of(state: &dyn StateView, name: &[u8]) -> u64 {
    match state.get_decoded::<u64>(&counter_key(name)) {
        Ok(value) => value.unwrap_or(0),
        Err(e) => panic!("corrupted counter: {}", e),
    }
}

/// Builds bank transactions; defaults to a fee of `DEFAULT_FEE` and a gas
/// limit of `DEFAULT_GAS_LIMIT`.
#[derive(Debug, Clone)]
pub struct TxBuilder {
    tx: Transaction,
}

impl TxBuilder {
    pub fn new(sender: Address, nonce: u64) -> Self {
        TxBuilder {
            tx: Transaction {
                nonce,
                sender,
                fee: Coins::single(FEE_DENOM, DEFAULT_FEE),
                gas_limit: DEFAULT_GAS_LIMIT,
                msgs: Vec::new(),
                privileged: false,
            },
        }
    }

    pub fn fee(mut self, amount: u64) -> Self {
        self.tx.fee = Coins::single(FEE_DENOM, amount);
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.tx.gas_limit = gas_limit;
        self
    }

    pub fn privileged(mut self) -> Self {
        self.tx.privileged = true;
        self
    }

    pub fn msg(mut self, msg: Msg) -> Self {
        self.tx.msgs.push(msg);
        self
    }

    pub fn send(self, to: Address, amount: u64) -> Self {
        let body = SendMsg {
            to,
            amount: Coins::single(FEE_DENOM, amount),
        };
        self.msg(Msg::new("bank", "send", encode(&body)))
    }

    pub fn fail(self) -> Self {
        self.msg(Msg::new("bank", "fail", Bytes::new()))
    }

    pub fn burn_gas(self, amount: u64) -> Self {
        self.msg(Msg::new("bank", "burn_gas", encode(&amount)))
    }

    pub fn panic(self) -> Self {
        self.msg(Msg::new("bank", "panic", Bytes::new()))
    }

    pub fn incr(self, counter: &str) -> Self {
        self.msg(Msg::new("store", "incr", counter.as_bytes().to_vec()))
    }

    pub fn build(self) -> Transaction { self.tx }

    pub fn encode(self) -> Bytes { self.tx.rlp_bytes() }
}

fn encode<T: Encodable>(value: &T) -> Bytes { rlp::encode(value).to_vec() }
