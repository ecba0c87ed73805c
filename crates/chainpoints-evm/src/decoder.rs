//! Decoder for the three tracked lending-market events.
//!
//! | Event       | Participant (topic)  | Shares (data)                          | Ledger event |
//! |-------------|----------------------|----------------------------------------|--------------|
//! | `Borrow`    | `onBehalf` (topic 2) | `shares` (word 2)                      | `Deposit`    |
//! | `Repay`     | `onBehalf` (topic 3) | `shares` (word 1)                      | `Withdraw`   |
//! | `Liquidate` | `borrower` (topic 3) | `repaidShares` (1), `badDebtShares` (4) | `Seize`      |
//!
//! A log whose topic0 is none of these is *unrecognised* (`Ok(None)`). A log
//! that claims to be one of them but does not fit the ABI is *malformed*
//! (`Err`).

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, B256, U256};
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

use chainpoints_core::types::LedgerEvent;

use crate::fetcher::RawLog;

pub const BORROW_SIGNATURE: &str = "Borrow(bytes32,address,address,address,uint256,uint256)";
pub const REPAY_SIGNATURE: &str = "Repay(bytes32,address,address,uint256,uint256)";
pub const LIQUIDATE_SIGNATURE: &str =
    "Liquidate(bytes32,address,address,uint256,uint256,uint256,uint256,uint256)";

/// A recognised event whose payload does not match its ABI.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{event}: expected {expected} topics, got {got}")]
    TopicCount {
        event: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{event}: invalid hex in {field}: {reason}")]
    Hex {
        event: &'static str,
        field: &'static str,
        reason: String,
    },

    #[error("{event}: ABI decode failed: {reason}")]
    Abi { event: &'static str, reason: String },
}

/// keccak256 of a canonical event signature, as a `0x`-prefixed hex topic.
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(bytes);
    hasher.finalize(&mut output);
    output
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Borrow,
    Repay,
    Liquidate,
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Self::Borrow => "Borrow",
            Self::Repay => "Repay",
            Self::Liquidate => "Liquidate",
        }
    }

    /// Non-indexed parameters, in order.
    fn data_type(self) -> DynSolType {
        let uint = || DynSolType::Uint(256);
        match self {
            Self::Borrow => DynSolType::Tuple(vec![DynSolType::Address, uint(), uint()]),
            Self::Repay => DynSolType::Tuple(vec![uint(), uint()]),
            Self::Liquidate => DynSolType::Tuple(vec![uint(), uint(), uint(), uint(), uint()]),
        }
    }
}

/// Stateless decoder; holds the precomputed topic0 of each tracked event.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    signatures: [(B256, Kind); 3],
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        let sig = |s: &str| B256::from(keccak256(s.as_bytes()));
        Self {
            signatures: [
                (sig(BORROW_SIGNATURE), Kind::Borrow),
                (sig(REPAY_SIGNATURE), Kind::Repay),
                (sig(LIQUIDATE_SIGNATURE), Kind::Liquidate),
            ],
        }
    }

    /// topic0 values of every tracked event, for log subscriptions.
    pub fn topics(&self) -> Vec<String> {
        self.signatures
            .iter()
            .map(|(t, _)| format!("0x{}", hex::encode(t)))
            .collect()
    }

    fn kind_of(&self, log: &RawLog) -> Option<Kind> {
        let topic0 = parse_word(log.topics.first()?).ok()?;
        self.signatures
            .iter()
            .find(|(t, _)| *t == topic0)
            .map(|(_, k)| *k)
    }

    pub fn decode(&self, log: &RawLog) -> Result<Option<LedgerEvent>, DecodeError> {
        let Some(kind) = self.kind_of(log) else {
            return Ok(None);
        };
        let event = kind.name();

        if log.topics.len() != 4 {
            return Err(DecodeError::TopicCount {
                event,
                expected: 4,
                got: log.topics.len(),
            });
        }

        let data = hex::decode(log.data.strip_prefix("0x").unwrap_or(&log.data)).map_err(|e| {
            DecodeError::Hex {
                event,
                field: "data",
                reason: e.to_string(),
            }
        })?;
        let words = match kind.data_type().abi_decode(&data) {
            Ok(DynSolValue::Tuple(values)) => values,
            Ok(other) => vec![other],
            Err(e) => {
                return Err(DecodeError::Abi {
                    event,
                    reason: e.to_string(),
                })
            }
        };
        let uint_at = |i: usize| -> Result<f64, DecodeError> {
            match words.get(i) {
                Some(DynSolValue::Uint(v, _)) => Ok(u256_to_f64(v)),
                other => Err(DecodeError::Abi {
                    event,
                    reason: format!("expected uint256 at position {i}, got {other:?}"),
                }),
            }
        };
        let topic_address = |i: usize| -> Result<String, DecodeError> {
            let word = parse_word(&log.topics[i]).map_err(|reason| DecodeError::Hex {
                event,
                field: "topics",
                reason,
            })?;
            Ok(Address::from_word(word).to_checksum(None))
        };

        let decoded = match kind {
            Kind::Borrow => LedgerEvent::Deposit {
                address: topic_address(2)?,
                shares: uint_at(2)?,
            },
            Kind::Repay => LedgerEvent::Withdraw {
                address: topic_address(3)?,
                shares: uint_at(1)?,
            },
            Kind::Liquidate => LedgerEvent::Seize {
                address: topic_address(3)?,
                repaid_shares: uint_at(1)?,
                bad_debt_shares: uint_at(4)?,
            },
        };
        Ok(Some(decoded))
    }
}

fn parse_word(s: &str) -> Result<B256, String> {
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| e.to_string())?;
    if bytes.len() != 32 {
        return Err(format!("expected 32 bytes, got {}", bytes.len()));
    }
    Ok(B256::from_slice(&bytes))
}

/// Nearest `f64` to a 256-bit unsigned integer.
pub fn u256_to_f64(v: &U256) -> f64 {
    v.as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * 18_446_744_073_709_551_616.0 + limb as f64)
}
