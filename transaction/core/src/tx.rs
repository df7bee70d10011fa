// Copyright (c) 2020-2024 The Nocta Foundation

//! Transaction model and prefix serialization.

use nct_crypto_keys::{keccak256, Signature, SIGNATURE_LEN};

use crate::{codec::Reader, write_varint, CodecError, ExtraField, Hash};

/// Variant tag for a coinbase (base) input.
pub const INPUT_TAG_BASE: u8 = 0xff;

/// Variant tag for a key input spending a prior output.
pub const INPUT_TAG_KEY: u8 = 0x02;

/// Variant tag for a key output target.
pub const OUTPUT_TAG_KEY: u8 = 0x02;

/// A transaction input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TxInput {
    /// Coinbase input minting the block reward at `height`.
    Base {
        /// Height of the block this coinbase belongs to.
        height: u64,
    },

    /// Spend of one prior output.
    Key {
        /// Value of the spent output in atomic units.
        amount: u64,
        /// Historical index list; always one element equal to `out_index`.
        output_indexes: Vec<u32>,
        /// Hash of the transaction that produced the spent output.
        tx_hash: Hash,
        /// Index of the spent output within that transaction.
        out_index: u32,
    },
}

impl TxInput {
    /// Build the key input spending `(tx_hash, out_index)` of `amount`.
    pub fn key(amount: u64, tx_hash: Hash, out_index: u32) -> Self {
        Self::Key {
            amount,
            output_indexes: vec![out_index],
            tx_hash,
            out_index,
        }
    }

    /// Append the tagged wire encoding to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        match self {
            Self::Base { height } => {
                out.push(INPUT_TAG_BASE);
                write_varint(out, *height);
            }
            Self::Key {
                amount,
                output_indexes,
                tx_hash,
                out_index,
            } => {
                out.push(INPUT_TAG_KEY);
                write_varint(out, *amount);
                write_varint(out, output_indexes.len() as u64);
                for index in output_indexes {
                    write_varint(out, u64::from(*index));
                }
                out.extend_from_slice(tx_hash);
                write_varint(out, u64::from(*out_index));
            }
        }
    }

    /// Read one tagged input from `reader`.
    pub fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        match reader.read_byte()? {
            INPUT_TAG_BASE => Ok(Self::Base {
                height: reader.read_varint()?,
            }),
            INPUT_TAG_KEY => {
                let amount = reader.read_varint()?;
                let count = reader.read_varint()?;
                let mut output_indexes = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    output_indexes.push(reader.read_varint_u32()?);
                }
                let tx_hash = reader.read_bytes32()?;
                let out_index = reader.read_varint_u32()?;
                Ok(Self::Key {
                    amount,
                    output_indexes,
                    tx_hash,
                    out_index,
                })
            }
            tag => Err(CodecError::UnknownTag(tag)),
        }
    }
}

/// A transaction output: an amount locked to a spend public key.
///
/// The target is a tagged variant on the wire; `KeyOutput` (0x02) is the only
/// target this protocol defines, and the recipient's spend public key appears
/// in cleartext.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TxOutput {
    /// Value in atomic units.
    pub amount: u64,
    /// The spend public key this output is locked to.
    pub key: [u8; 32],
}

impl TxOutput {
    /// Append the wire encoding to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        write_varint(out, self.amount);
        out.push(OUTPUT_TAG_KEY);
        out.extend_from_slice(&self.key);
    }

    /// Read one output from `reader`.
    pub fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let amount = reader.read_varint()?;
        match reader.read_byte()? {
            OUTPUT_TAG_KEY => Ok(Self {
                amount,
                key: reader.read_bytes32()?,
            }),
            tag => Err(CodecError::UnknownTag(tag)),
        }
    }
}

/// The signed portion of a transaction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TransactionPrefix {
    /// Transaction format version.
    pub version: u64,
    /// Height or timestamp before which outputs cannot be spent (0 = none).
    pub unlock_time: u64,
    /// Inputs in signing order.
    pub inputs: Vec<TxInput>,
    /// Outputs in destination order.
    pub outputs: Vec<TxOutput>,
    /// The extra field.
    pub extra: ExtraField,
}

impl TransactionPrefix {
    /// Append the wire encoding to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        write_varint(out, self.version);
        write_varint(out, self.unlock_time);
        write_varint(out, self.inputs.len() as u64);
        for input in &self.inputs {
            input.write(out);
        }
        write_varint(out, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(out);
        }
        let extra = self.extra.to_bytes();
        write_varint(out, extra.len() as u64);
        out.extend_from_slice(&extra);
    }

    /// Serialize to owned bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write(&mut out);
        out
    }

    /// Keccak-256 of the exact serialized prefix; the per-input signing
    /// message.
    pub fn hash(&self) -> Hash {
        keccak256(&self.to_bytes())
    }

    /// Read a prefix from `reader`.
    pub fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let version = reader.read_varint()?;
        let unlock_time = reader.read_varint()?;

        let n_inputs = reader.read_varint()?;
        let mut inputs = Vec::with_capacity(n_inputs.min(1024) as usize);
        for _ in 0..n_inputs {
            inputs.push(TxInput::read(reader)?);
        }

        let n_outputs = reader.read_varint()?;
        let mut outputs = Vec::with_capacity(n_outputs.min(1024) as usize);
        for _ in 0..n_outputs {
            outputs.push(TxOutput::read(reader)?);
        }

        let extra_len = reader.read_varint()? as usize;
        let extra_bytes = reader.read_exact(extra_len).map_err(|err| match err {
            CodecError::Truncated => CodecError::ExtraOverrun,
            other => other,
        })?;
        let extra = ExtraField::parse(extra_bytes)?;

        Ok(Self {
            version,
            unlock_time,
            inputs,
            outputs,
            extra,
        })
    }

    /// Parse a prefix from exactly `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes);
        let prefix = Self::read(&mut reader)?;
        reader.expect_end()?;
        Ok(prefix)
    }
}

/// A complete transaction: prefix plus one signature per input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    /// The signed portion.
    pub prefix: TransactionPrefix,
    /// One signature per input, in input order.
    pub signatures: Vec<Signature>,
}

impl Transaction {
    /// Assemble a transaction, checking the signature count.
    pub fn new(prefix: TransactionPrefix, signatures: Vec<Signature>) -> Result<Self, CodecError> {
        if signatures.len() != prefix.inputs.len() {
            return Err(CodecError::SignatureCountMismatch(
                signatures.len(),
                prefix.inputs.len(),
            ));
        }
        Ok(Self { prefix, signatures })
    }

    /// Serialize to owned bytes: prefix then signatures.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.prefix.to_bytes();
        for signature in &self.signatures {
            out.extend_from_slice(&signature.to_bytes());
        }
        out
    }

    /// Hex encoding of the full serialization, as submitted to a node.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// The per-input signing message.
    pub fn prefix_hash(&self) -> Hash {
        self.prefix.hash()
    }

    /// Keccak-256 over the full serialization; the transaction's identity.
    pub fn hash(&self) -> Hash {
        keccak256(&self.to_bytes())
    }

    /// Parse a transaction from exactly `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes);
        let prefix = TransactionPrefix::read(&mut reader)?;
        let mut signatures = Vec::with_capacity(prefix.inputs.len());
        for _ in 0..prefix.inputs.len() {
            signatures.push(Signature::try_from(reader.read_exact(SIGNATURE_LEN)?)?);
        }
        reader.expect_end()?;
        Ok(Self { prefix, signatures })
    }
}
