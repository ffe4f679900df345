//! Registry of the deployable lab contracts.

pub mod abi;
pub mod artifacts;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContractKind {
    VulnerableVault,
    ReentrancyAttacker,
    Lottery,
    LotteryAttack,
    BadAccessControl,
    LogicV1,
    MaliciousLogic,
    Proxy,
}

impl ContractKind {
    pub const ALL: [ContractKind; 8] = [
        Self::VulnerableVault,
        Self::ReentrancyAttacker,
        Self::Lottery,
        Self::LotteryAttack,
        Self::BadAccessControl,
        Self::LogicV1,
        Self::MaliciousLogic,
        Self::Proxy,
    ];

    /// Contract name as emitted by the Solidity compiler (artifact file stem).
    pub fn artifact_name(self) -> &'static str {
        match self {
            Self::VulnerableVault => "VulnerableVault",
            Self::ReentrancyAttacker => "ReentrancyAttacker",
            Self::Lottery => "Lottery",
            Self::LotteryAttack => "LotteryAttack",
            Self::BadAccessControl => "BadAccessControl",
            Self::LogicV1 => "LogicV1",
            Self::MaliciousLogic => "MaliciousLogic",
            Self::Proxy => "Proxy",
        }
    }

    /// Number of `address` constructor parameters.
    pub fn constructor_arity(self) -> usize {
        match self {
            Self::ReentrancyAttacker | Self::LotteryAttack | Self::Proxy => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.artifact_name())
    }
}

impl FromStr for ContractKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.artifact_name().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| format!("unknown contract `{raw}`"))
    }
}

/// ABI-encode a list of `address` constructor arguments (static words, no head/tail split).
pub fn encode_address_args(args: &[Address]) -> Bytes {
    let mut out = Vec::with_capacity(args.len() * 32);
    for arg in args {
        out.extend_from_slice(arg.into_word().as_slice());
    }
    Bytes::from(out)
}

/// Inverse of [`encode_address_args`]; `None` when the payload is not whole, clean words.
pub fn decode_address_args(data: &[u8]) -> Option<Vec<Address>> {
    if data.len() % 32 != 0 {
        return None;
    }
    data.chunks_exact(32)
        .map(|word| {
            if word[..12].iter().any(|b| *b != 0) {
                return None;
            }
            Some(Address::from_slice(&word[12..]))
        })
        .collect()
}

/// The lottery's "random" answer: `keccak256(abi.encodePacked(timestamp, prevrandao, players))`.
///
/// Every input is readable by any contract executing in the same block.
pub fn lottery_answer(timestamp: u64, prevrandao: B256, players: usize) -> U256 {
    let mut packed = [0u8; 96];
    packed[..32].copy_from_slice(&U256::from(timestamp).to_be_bytes::<32>());
    packed[32..64].copy_from_slice(prevrandao.as_slice());
    packed[64..].copy_from_slice(&U256::from(players).to_be_bytes::<32>());
    U256::from_be_bytes(keccak256(packed).0)
}
