//! Base58Check addresses
//!
//! An address is a version byte followed by a 20-byte key hash. The version
//! tells which role the key plays: ordinary payments, cold-stake delegation
//! or lease delegation.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::data_structures::types::KeyHash;
use crate::errors::AddressError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    Standard,
    Staking,
    Leasing,
}

impl AddressKind {
    pub const fn version(self) -> u8 {
        match self {
            AddressKind::Standard => 139,
            AddressKind::Staking => 73,
            AddressKind::Leasing => 81,
        }
    }

    pub fn from_version(version: u8) -> Result<Self, AddressError> {
        match version {
            139 => Ok(AddressKind::Standard),
            73 => Ok(AddressKind::Staking),
            81 => Ok(AddressKind::Leasing),
            other => Err(AddressError::UnknownVersion(other)),
        }
    }
}

impl Display for AddressKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressKind::Standard => write!(f, "standard"),
            AddressKind::Staking => write!(f, "staking"),
            AddressKind::Leasing => write!(f, "leasing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub kind: AddressKind,
    pub hash: KeyHash,
}

impl Address {
    pub fn new(kind: AddressKind, hash: KeyHash) -> Self {
        Self { kind, hash }
    }

    pub fn standard(hash: KeyHash) -> Self {
        Self::new(AddressKind::Standard, hash)
    }

    pub fn staking(hash: KeyHash) -> Self {
        Self::new(AddressKind::Staking, hash)
    }

    pub fn leasing(hash: KeyHash) -> Self {
        Self::new(AddressKind::Leasing, hash)
    }

    pub fn to_base58(&self) -> String {
        let mut payload = Vec::with_capacity(1 + KeyHash::LEN);
        payload.push(self.kind.version());
        payload.extend_from_slice(self.hash.as_bytes());
        bs58::encode(payload).with_check().into_string()
    }

    pub fn from_base58(s: &str) -> Result<Self, AddressError> {
        let payload = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| AddressError::InvalidEncoding(e.to_string()))?;
        if payload.len() != 1 + KeyHash::LEN {
            return Err(AddressError::InvalidLength(payload.len()));
        }
        let kind = AddressKind::from_version(payload[0])?;
        let hash =
            KeyHash::from_slice(&payload[1..]).ok_or(AddressError::InvalidLength(payload.len()))?;
        Ok(Self { kind, hash })
    }

    /// Parse `s` and require it to be of `kind`
    pub fn parse_kind(s: &str, kind: AddressKind) -> Result<Self, AddressError> {
        let address = Self::from_base58(s)?;
        if address.kind != kind {
            return Err(AddressError::WrongKind {
                expected: kind.to_string(),
                address: s.to_string(),
            });
        }
        Ok(address)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base58_round_trip_keeps_kind() {
        for kind in [AddressKind::Standard, AddressKind::Staking, AddressKind::Leasing] {
            let address = Address::new(kind, KeyHash([9u8; 20]));
            let parsed: Address = address.to_string().parse().unwrap();
            assert_eq!(parsed, address);
        }
    }

    #[test]
    fn test_parse_kind_rejects_other_roles() {
        let staking = Address::staking(KeyHash([1u8; 20])).to_string();
        assert!(matches!(
            Address::parse_kind(&staking, AddressKind::Leasing),
            Err(AddressError::WrongKind { .. })
        ));
        assert!(Address::parse_kind(&staking, AddressKind::Staking).is_ok());
    }

    #[test]
    fn test_corrupted_checksum_is_rejected() {
        let mut s = Address::standard(KeyHash([4u8; 20])).to_string();
        let last = s.pop().unwrap();
        s.push(if last == '1' { '2' } else { '1' });
        assert!(matches!(
            Address::from_base58(&s),
            Err(AddressError::InvalidEncoding(_))
        ));
    }
}
