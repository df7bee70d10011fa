// Copyright (c) 2020-2024 The Nocta Foundation

//! The transaction extra field: an ordered TLV record sequence.
//!
//! Two tags are understood: the transaction public key (0x01) and the
//! staking record (0x04). Records after the first unrecognized tag carry no
//! self-describing length, so the tail is kept verbatim and re-emitted
//! byte-for-byte on serialization.

use nct_crypto_keys::{keccak256, Signature, SIGNATURE_LEN};

use crate::{codec::Reader, write_varint, CodecError, STAKING_TAG_TYPE};

/// Extra tag carrying the transaction's one-time public key.
pub const EXTRA_TAG_TX_PUBKEY: u8 = 0x01;

/// Extra tag carrying a signed staking record.
pub const EXTRA_TAG_STAKING: u8 = 0x04;

/// One record inside the extra field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExtraEntry {
    /// The transaction's one-time public key (tag 0x01).
    TxPubKey([u8; 32]),

    /// A signed staking record (tag 0x04).
    Staking(StakingRecord),

    /// Raw bytes from the first unrecognized tag to the end of the field.
    Unknown(Vec<u8>),
}

/// The parsed extra field, preserving record order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExtraField {
    /// Records in their on-wire order.
    pub entries: Vec<ExtraEntry>,
}

impl ExtraField {
    /// An extra field holding only a transaction public key.
    pub fn with_tx_pubkey(tx_pubkey: [u8; 32]) -> Self {
        Self {
            entries: vec![ExtraEntry::TxPubKey(tx_pubkey)],
        }
    }

    /// The first transaction public key record, if present.
    pub fn tx_pubkey(&self) -> Option<&[u8; 32]> {
        self.entries.iter().find_map(|entry| match entry {
            ExtraEntry::TxPubKey(key) => Some(key),
            _ => None,
        })
    }

    /// The first staking record, if present.
    pub fn staking(&self) -> Option<&StakingRecord> {
        self.entries.iter().find_map(|entry| match entry {
            ExtraEntry::Staking(record) => Some(record),
            _ => None,
        })
    }

    /// Append this field's bytes to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        for entry in &self.entries {
            match entry {
                ExtraEntry::TxPubKey(key) => {
                    out.push(EXTRA_TAG_TX_PUBKEY);
                    out.extend_from_slice(key);
                }
                ExtraEntry::Staking(record) => {
                    out.push(EXTRA_TAG_STAKING);
                    record.write(out);
                }
                ExtraEntry::Unknown(raw) => out.extend_from_slice(raw),
            }
        }
    }

    /// Serialize to owned bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write(&mut out);
        out
    }

    /// Parse an extra field from its raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes);
        let mut entries = Vec::new();
        while reader.remaining() > 0 {
            let start = reader.position();
            let tag = reader.read_byte()?;
            match tag {
                EXTRA_TAG_TX_PUBKEY => {
                    entries.push(ExtraEntry::TxPubKey(reader.read_bytes32()?));
                }
                EXTRA_TAG_STAKING => {
                    entries.push(ExtraEntry::Staking(StakingRecord::read(&mut reader)?));
                }
                _ => {
                    // No length framing past this point; keep the tail intact.
                    entries.push(ExtraEntry::Unknown(bytes[start..].to_vec()));
                    break;
                }
            }
        }
        Ok(Self { entries })
    }
}

/// The body of a staking extra record.
///
/// On the wire every integer is a varint; the inner signature covers the
/// fixed-width little-endian rendering of the same values, and verifiers
/// re-serialize fixed-width before hashing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StakingRecord {
    /// Staked amount in atomic units.
    pub amount: u64,

    /// Block height at which the stake unlocks.
    pub unlock_time: u64,

    /// Stake duration in days.
    pub lock_days: u32,

    /// Signature by the staker's spend key over [`Self::signed_message`].
    pub signature: Signature,
}

impl StakingRecord {
    /// The digest the inner signature commits to.
    pub fn signed_message(&self) -> [u8; 32] {
        Self::message_for(self.amount, self.lock_days, self.unlock_time)
    }

    /// The digest for `(amount, lock_days, unlock_time)`.
    pub fn message_for(amount: u64, lock_days: u32, unlock_time: u64) -> [u8; 32] {
        let mut buf = [0u8; 20];
        buf[..8].copy_from_slice(&amount.to_le_bytes());
        buf[8..12].copy_from_slice(&lock_days.to_le_bytes());
        buf[12..].copy_from_slice(&unlock_time.to_le_bytes());
        keccak256(&buf)
    }

    /// Append the wire encoding to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        write_varint(out, STAKING_TAG_TYPE);
        write_varint(out, self.amount);
        write_varint(out, self.unlock_time);
        write_varint(out, u64::from(self.lock_days));
        out.extend_from_slice(&self.signature.to_bytes());
    }

    /// Read a record from `reader`.
    pub fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let staking_type = reader.read_varint()?;
        if staking_type != STAKING_TAG_TYPE {
            return Err(CodecError::UnknownStakingType(staking_type));
        }
        let amount = reader.read_varint()?;
        let unlock_time = reader.read_varint()?;
        let lock_days = reader.read_varint_u32()?;
        let signature = Signature::try_from(reader.read_exact(SIGNATURE_LEN)?)?;
        Ok(Self {
            amount,
            unlock_time,
            lock_days,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nct_crypto_keys::{sign, PrivateKey, PublicKey};
    use rand::{rngs::StdRng, SeedableRng};

    fn sample_record() -> StakingRecord {
        let mut rng = StdRng::seed_from_u64(31);
        let private = PrivateKey::from_random(&mut rng);
        let public = PublicKey::from(&private);
        let message = StakingRecord::message_for(5_000_000_000, 30, 121_600);
        StakingRecord {
            amount: 5_000_000_000,
            unlock_time: 121_600,
            lock_days: 30,
            signature: sign(&mut rng, &message, &public, &private),
        }
    }

    #[test]
    fn extra_round_trip_with_tx_pubkey() {
        let field = ExtraField::with_tx_pubkey([7u8; 32]);
        let bytes = field.to_bytes();
        assert_eq!(bytes.len(), 33);
        assert_eq!(bytes[0], EXTRA_TAG_TX_PUBKEY);

        let parsed = ExtraField::parse(&bytes).unwrap();
        assert_eq!(parsed, field);
        assert_eq!(parsed.tx_pubkey(), Some(&[7u8; 32]));
    }

    #[test]
    fn extra_round_trip_with_staking_record() {
        let record = sample_record();
        let field = ExtraField {
            entries: vec![
                ExtraEntry::TxPubKey([9u8; 32]),
                ExtraEntry::Staking(record.clone()),
            ],
        };

        let parsed = ExtraField::parse(&field.to_bytes()).unwrap();
        assert_eq!(parsed, field);
        assert_eq!(parsed.staking(), Some(&record));
    }

    #[test]
    fn unknown_tail_is_preserved_verbatim() {
        let mut bytes = ExtraField::with_tx_pubkey([1u8; 32]).to_bytes();
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let parsed = ExtraField::parse(&bytes).unwrap();
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(
            parsed.entries[1],
            ExtraEntry::Unknown(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn staking_record_rejects_unknown_type() {
        let mut bytes = Vec::new();
        write_varint(&mut bytes, 99);
        let mut reader = Reader::new(&bytes);
        assert_eq!(
            StakingRecord::read(&mut reader),
            Err(CodecError::UnknownStakingType(99))
        );
    }

    #[test]
    fn truncated_staking_record_fails() {
        let record = sample_record();
        let mut bytes = Vec::new();
        record.write(&mut bytes);
        bytes.truncate(bytes.len() - 1);

        let mut reader = Reader::new(&bytes);
        assert_eq!(
            StakingRecord::read(&mut reader),
            Err(CodecError::Truncated)
        );
    }

    #[test]
    fn signed_message_uses_fixed_width_encoding() {
        let record = sample_record();
        let mut buf = Vec::new();
        buf.extend_from_slice(&5_000_000_000u64.to_le_bytes());
        buf.extend_from_slice(&30u32.to_le_bytes());
        buf.extend_from_slice(&121_600u64.to_le_bytes());
        assert_eq!(record.signed_message(), keccak256(&buf));
    }
}
