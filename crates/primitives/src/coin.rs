// Copyright 2019 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoinsError {
    /// The subtrahend holds more of `denom` than the minuend.
    Insufficient { denom: String, have: u64, need: u64 },
    Overflow { denom: String },
}

impl fmt::Display for CoinsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CoinsError::Insufficient { denom, have, need } => write!(
                f,
                "insufficient {}: have {}, need {}",
                denom, have, need
            ),
            CoinsError::Overflow { denom } => {
                write!(f, "amount overflow for {}", denom)
            }
        }
    }
}

impl std::error::Error for CoinsError {}

/// A single amount of one denomination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coin {
    pub denom: String,
    pub amount: u64,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u64) -> Self {
        Coin {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl Encodable for Coin {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2).append(&self.denom).append(&self.amount);
    }
}

impl Decodable for Coin {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Coin {
            denom: rlp.val_at(0)?,
            amount: rlp.val_at(1)?,
        })
    }
}

/// A multiset of coins. Always sorted by denomination, one entry per
/// denomination, no zero amounts; every constructor normalizes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Coins(Vec<Coin>);

impl Coins {
    pub fn new(coins: Vec<Coin>) -> Self {
        let mut merged = BTreeMap::<String, u64>::new();
        for coin in coins {
            let entry = merged.entry(coin.denom).or_default();
            *entry = entry.saturating_add(coin.amount);
        }
        Coins(
            merged
                .into_iter()
                .filter(|(_, amount)| *amount != 0)
                .map(|(denom, amount)| Coin { denom, amount })
                .collect(),
        )
    }

    pub fn single(denom: impl Into<String>, amount: u64) -> Self {
        Self::new(vec![Coin::new(denom, amount)])
    }

    pub fn empty() -> Self { Coins(Vec::new()) }

    pub fn is_zero(&self) -> bool { self.0.is_empty() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> { self.0.iter() }

    pub fn amount_of(&self, denom: &str) -> u64 {
        self.0
            .binary_search_by(|c| c.denom.as_str().cmp(denom))
            .map(|i| self.0[i].amount)
            .unwrap_or(0)
    }

    pub fn checked_add(&self, other: &Coins) -> Result<Coins, CoinsError> {
        let mut merged: BTreeMap<&str, u64> =
            self.0.iter().map(|c| (c.denom.as_str(), c.amount)).collect();
        for coin in &other.0 {
            let entry = merged.entry(coin.denom.as_str()).or_default();
            *entry =
                entry
                    .checked_add(coin.amount)
                    .ok_or_else(|| CoinsError::Overflow {
                        denom: coin.denom.clone(),
                    })?;
        }
        Ok(Coins(
            merged
                .into_iter()
                .map(|(denom, amount)| Coin::new(denom, amount))
                .collect(),
        ))
    }

    pub fn checked_sub(&self, other: &Coins) -> Result<Coins, CoinsError> {
        let mut merged: BTreeMap<&str, u64> =
            self.0.iter().map(|c| (c.denom.as_str(), c.amount)).collect();
        for coin in &other.0 {
            let have = merged.get(coin.denom.as_str()).copied().unwrap_or(0);
            if have < coin.amount {
                return Err(CoinsError::Insufficient {
                    denom: coin.denom.clone(),
                    have,
                    need: coin.amount,
                });
            }
            merged.insert(coin.denom.as_str(), have - coin.amount);
        }
        Ok(Coins(
            merged
                .into_iter()
                .filter(|(_, amount)| *amount != 0)
                .map(|(denom, amount)| Coin::new(denom, amount))
                .collect(),
        ))
    }

    /// Whether every denomination of `other` is covered by `self`.
    pub fn is_all_gte(&self, other: &Coins) -> bool {
        other.0.iter().all(|c| self.amount_of(&c.denom) >= c.amount)
    }

    /// Scales every amount by `numerator / denominator`, rounding down.
    pub fn mul_ratio(&self, numerator: u64, denominator: u64) -> Coins {
        if denominator == 0 {
            return Coins::empty();
        }
        Coins::new(
            self.0
                .iter()
                .map(|c| {
                    let scaled = c.amount as u128 * numerator as u128
                        / denominator as u128;
                    let amount = scaled.min(u64::MAX as u128) as u64;
                    Coin::new(c.denom.clone(), amount)
                })
                .collect(),
        )
    }
}

impl From<Vec<Coin>> for Coins {
    fn from(coins: Vec<Coin>) -> Self { Coins::new(coins) }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rendered: Vec<String> =
            self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(","))
    }
}

impl Encodable for Coins {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append_list::<Coin, _>(&self.0);
    }
}

impl Decodable for Coins {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let coins: Vec<Coin> = rlp.as_list()?;
        let normalized = Coins::new(coins.clone());
        if normalized.0 != coins {
            return Err(DecoderError::Custom("coins are not normalized"));
        }
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let coins = Coins::new(vec![
            Coin::new("usd", 3),
            Coin::new("okt", 0),
            Coin::new("eth", 2),
            Coin::new("usd", 4),
        ]);
        assert_eq!(coins.len(), 2);
        assert_eq!(coins.amount_of("usd"), 7);
        assert_eq!(coins.amount_of("okt"), 0);
        assert_eq!(coins.to_string(), "2eth,7usd");
    }

    #[test]
    fn test_add_sub() {
        let a = Coins::new(vec![Coin::new("okt", 10), Coin::new("usd", 1)]);
        let b = Coins::single("okt", 4);
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum.amount_of("okt"), 14);
        let diff = sum.checked_sub(&a).unwrap();
        assert_eq!(diff, b);
        assert_eq!(
            b.checked_sub(&a),
            Err(CoinsError::Insufficient {
                denom: "okt".into(),
                have: 4,
                need: 10
            })
        );
        assert!(a.checked_sub(&a).unwrap().is_zero());
    }

    #[test]
    fn test_overflow() {
        let a = Coins::single("okt", u64::MAX);
        assert!(matches!(
            a.checked_add(&Coins::single("okt", 1)),
            Err(CoinsError::Overflow { .. })
        ));
    }

    #[test]
    fn test_mul_ratio() {
        let fee = Coins::single("okt", 1000);
        assert_eq!(fee.mul_ratio(1, 4), Coins::single("okt", 250));
        assert!(fee.mul_ratio(0, 4).is_zero());
        assert!(fee.mul_ratio(1, 0).is_zero());
    }

    #[test]
    fn test_rlp_rejects_unsorted() {
        let mut s = RlpStream::new_list(2);
        s.append(&Coin::new("usd", 1));
        s.append(&Coin::new("okt", 1));
        let raw = s.out();
        assert!(rlp::decode::<Coins>(&raw).is_err());

        let coins = Coins::new(vec![Coin::new("usd", 1), Coin::new("okt", 2)]);
        let raw = rlp::encode(&coins);
        assert_eq!(rlp::decode::<Coins>(&raw).unwrap(), coins);
    }
}
