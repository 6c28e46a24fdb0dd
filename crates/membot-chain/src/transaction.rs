//! Solana transaction wire format.
//!
//! Covers what the bot signs itself: legacy messages for account
//! maintenance and signing of pre-built versioned swaps.

use thiserror::Error;

use crate::keypair::Keypair;
use crate::pubkey::Pubkey;

/// High bit set on the first message byte of a versioned (v0+) message.
const VERSION_PREFIX_MASK: u8 = 0x80;

const SIGNATURE_LEN: usize = 64;

/// Errors from encoding, decoding or signing transactions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction bytes truncated")]
    Truncated,

    #[error("compact-u16 overflow")]
    LengthOverflow,

    #[error("{0} is not a required signer")]
    NotASigner(Pubkey),

    #[error("too many accounts: {0}")]
    TooManyAccounts(usize),

    #[error("missing signature for {0}")]
    MissingSigner(Pubkey),
}

// ============================================================================
// compact-u16
// ============================================================================

/// Append `value` as a compact-u16 (7 bits per byte, high bit = continuation).
pub fn encode_compact_u16(value: u16, out: &mut Vec<u8>) {
    let mut rem = value;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// Decode a compact-u16 at the start of `bytes`, returning (value, bytes consumed).
pub fn decode_compact_u16(bytes: &[u8]) -> Result<(u16, usize), TransactionError> {
    let mut value: u32 = 0;
    for i in 0..3 {
        let byte = *bytes.get(i).ok_or(TransactionError::Truncated)?;
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return u16::try_from(value)
                .map(|v| (v, i + 1))
                .map_err(|_| TransactionError::LengthOverflow);
        }
    }
    Err(TransactionError::LengthOverflow)
}

fn compact_len(len: usize, out: &mut Vec<u8>) -> Result<(), TransactionError> {
    let len = u16::try_from(len).map_err(|_| TransactionError::TooManyAccounts(len))?;
    encode_compact_u16(len, out);
    Ok(())
}

// ============================================================================
// Instructions and legacy messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self { pubkey, is_signer, is_writable: true }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self { pubkey, is_signer, is_writable: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// A legacy (unversioned) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMessage {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

impl LegacyMessage {
    /// Compile instructions into a message paid for by `payer`.
    ///
    /// Accounts are deduplicated (flags merged) and ordered: writable
    /// signers, readonly signers, writable non-signers, readonly non-signers.
    /// The payer is always the first key. Within a group, first appearance wins.
    pub fn compile(payer: &Pubkey, instructions: &[Instruction], recent_blockhash: [u8; 32]) -> Result<Self, TransactionError> {
        let mut metas: Vec<AccountMeta> = vec![AccountMeta::writable(*payer, true)];
        let mut upsert = |meta: AccountMeta| {
            if let Some(existing) = metas.iter_mut().find(|m| m.pubkey == meta.pubkey) {
                existing.is_signer |= meta.is_signer;
                existing.is_writable |= meta.is_writable;
            } else {
                metas.push(meta);
            }
        };
        for ix in instructions {
            for meta in &ix.accounts {
                upsert(*meta);
            }
            upsert(AccountMeta::readonly(ix.program_id, false));
        }

        // Stable sort keeps the payer first among writable signers.
        let rank = |m: &AccountMeta| match (m.is_signer, m.is_writable) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        metas.sort_by_key(rank);

        if metas.len() > usize::from(u8::MAX) {
            return Err(TransactionError::TooManyAccounts(metas.len()));
        }

        let count = |signer: bool, writable: bool| {
            metas.iter().filter(|m| m.is_signer == signer && m.is_writable == writable).count() as u8
        };
        let header = MessageHeader {
            num_required_signatures: count(true, true) + count(true, false),
            num_readonly_signed: count(true, false),
            num_readonly_unsigned: count(false, false),
        };

        let account_keys: Vec<Pubkey> = metas.iter().map(|m| m.pubkey).collect();
        let index_of = |pk: &Pubkey| account_keys.iter().position(|k| k == pk).map(|i| i as u8);

        let instructions = instructions
            .iter()
            .map(|ix| CompiledInstruction {
                program_id_index: index_of(&ix.program_id).unwrap_or_default(),
                accounts: ix
                    .accounts
                    .iter()
                    .map(|m| index_of(&m.pubkey).unwrap_or_default())
                    .collect(),
                data: ix.data.clone(),
            })
            .collect();

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>, TransactionError> {
        let mut out = vec![
            self.header.num_required_signatures,
            self.header.num_readonly_signed,
            self.header.num_readonly_unsigned,
        ];
        compact_len(self.account_keys.len(), &mut out)?;
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(&self.recent_blockhash);
        compact_len(self.instructions.len(), &mut out)?;
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            compact_len(ix.accounts.len(), &mut out)?;
            out.extend_from_slice(&ix.accounts);
            compact_len(ix.data.len(), &mut out)?;
            out.extend_from_slice(&ix.data);
        }
        Ok(out)
    }

    pub fn signer_keys(&self) -> &[Pubkey] {
        &self.account_keys[..usize::from(self.header.num_required_signatures)]
    }
}

/// Sign a legacy message, returning the full wire transaction.
///
/// Every required signer must be present in `signers`.
pub fn sign_legacy(message: &LegacyMessage, signers: &[&Keypair]) -> Result<Vec<u8>, TransactionError> {
    let payload = message.serialize()?;
    let mut out = Vec::with_capacity(1 + SIGNATURE_LEN * signers.len() + payload.len());
    compact_len(message.signer_keys().len(), &mut out)?;
    for key in message.signer_keys() {
        let signer = signers
            .iter()
            .find(|kp| kp.pubkey() == *key)
            .ok_or(TransactionError::MissingSigner(*key))?;
        out.extend_from_slice(&signer.sign(&payload));
    }
    out.extend_from_slice(&payload);
    Ok(out)
}

// ============================================================================
// Pre-built (versioned) transactions
// ============================================================================

/// Layout of a serialized transaction as needed for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionLayout {
    pub num_signatures: usize,
    /// Offset of the first signature slot.
    pub signatures_offset: usize,
    /// Offset where the message begins.
    pub message_offset: usize,
    pub header: MessageHeader,
    /// Static account keys of the message.
    pub account_keys: Vec<Pubkey>,
}

impl TransactionLayout {
    pub fn parse(tx: &[u8]) -> Result<Self, TransactionError> {
        let (num_signatures, sig_len_bytes) = decode_compact_u16(tx)?;
        let num_signatures = usize::from(num_signatures);
        let signatures_offset = sig_len_bytes;
        let message_offset = signatures_offset + num_signatures * SIGNATURE_LEN;
        let message = tx.get(message_offset..).ok_or(TransactionError::Truncated)?;

        let first = *message.first().ok_or(TransactionError::Truncated)?;
        let header_start = if first & VERSION_PREFIX_MASK != 0 { 1 } else { 0 };
        let header_bytes = message
            .get(header_start..header_start + 3)
            .ok_or(TransactionError::Truncated)?;
        let header = MessageHeader {
            num_required_signatures: header_bytes[0],
            num_readonly_signed: header_bytes[1],
            num_readonly_unsigned: header_bytes[2],
        };

        let keys_start = header_start + 3;
        let (num_keys, len_bytes) = decode_compact_u16(message.get(keys_start..).ok_or(TransactionError::Truncated)?)?;
        let mut cursor = keys_start + len_bytes;
        let mut account_keys = Vec::with_capacity(usize::from(num_keys));
        for _ in 0..num_keys {
            let bytes = message.get(cursor..cursor + 32).ok_or(TransactionError::Truncated)?;
            account_keys.push(Pubkey::try_from(bytes).map_err(|_| TransactionError::Truncated)?);
            cursor += 32;
        }

        Ok(Self {
            num_signatures,
            signatures_offset,
            message_offset,
            header,
            account_keys,
        })
    }
}

/// Sign a serialized transaction built by someone else (e.g. a swap API)
/// in place of `keypair`'s signature slot.
pub fn sign_serialized(tx: &[u8], keypair: &Keypair) -> Result<Vec<u8>, TransactionError> {
    let layout = TransactionLayout::parse(tx)?;
    let owner = keypair.pubkey();
    let required = usize::from(layout.header.num_required_signatures).min(layout.account_keys.len());
    let slot = layout.account_keys[..required]
        .iter()
        .position(|k| *k == owner)
        .filter(|i| *i < layout.num_signatures)
        .ok_or(TransactionError::NotASigner(owner))?;

    let signature = keypair.sign(&tx[layout.message_offset..]);
    let mut signed = tx.to_vec();
    let start = layout.signatures_offset + slot * SIGNATURE_LEN;
    signed[start..start + SIGNATURE_LEN].copy_from_slice(&signature);
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use membot_common::{SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID};

    #[test]
    fn test_compact_u16_known_encodings() {
        let cases: [(u16, &[u8]); 6] = [
            (0, &[0x00]),
            (0x7f, &[0x7f]),
            (0x80, &[0x80, 0x01]),
            (0x3fff, &[0xff, 0x7f]),
            (0x4000, &[0x80, 0x80, 0x01]),
            (0xffff, &[0xff, 0xff, 0x03]),
        ];
        for (value, expected) in cases {
            let mut out = Vec::new();
            encode_compact_u16(value, &mut out);
            assert_eq!(out, expected, "encode {value}");
            assert_eq!(decode_compact_u16(expected).unwrap(), (value, expected.len()));
        }
    }

    #[test]
    fn test_compact_u16_errors() {
        assert_eq!(decode_compact_u16(&[0x80]), Err(TransactionError::Truncated));
        assert_eq!(decode_compact_u16(&[0xff, 0xff, 0x04]), Err(TransactionError::LengthOverflow));
    }

    #[test]
    fn test_compile_orders_and_dedupes_accounts() {
        let payer = Keypair::from_seed([1u8; 32]).pubkey();
        let ata = Pubkey::new([2u8; 32]);
        let mint = Pubkey::new([3u8; 32]);
        let token = Pubkey::from_static(TOKEN_PROGRAM_ID);
        let system = Pubkey::from_static(SYSTEM_PROGRAM_ID);

        let ix = Instruction {
            program_id: token,
            accounts: vec![
                AccountMeta::readonly(mint, false),
                AccountMeta::writable(ata, false),
                AccountMeta::readonly(payer, true),
                AccountMeta::readonly(system, false),
            ],
            data: vec![9],
        };
        let msg = LegacyMessage::compile(&payer, &[ix], [5u8; 32]).unwrap();

        assert_eq!(msg.account_keys, vec![payer, ata, mint, system, token]);
        assert_eq!(
            msg.header,
            MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed: 0,
                num_readonly_unsigned: 3,
            }
        );
        assert_eq!(msg.instructions[0].program_id_index, 4);
        assert_eq!(msg.instructions[0].accounts, vec![2, 1, 0, 3]);
    }

    #[test]
    fn test_serialize_layout() {
        let payer = Keypair::from_seed([1u8; 32]);
        let ix = Instruction {
            program_id: Pubkey::new([4u8; 32]),
            accounts: vec![AccountMeta::writable(Pubkey::new([2u8; 32]), false)],
            data: vec![1, 2, 3],
        };
        let msg = LegacyMessage::compile(&payer.pubkey(), &[ix], [9u8; 32]).unwrap();
        let bytes = msg.serialize().unwrap();

        // header(3) + len(1) + 3 keys + blockhash + ix count(1) + ix(1 + 1 + 1 + 1 + 3)
        assert_eq!(bytes.len(), 3 + 1 + 96 + 32 + 1 + 7);
        assert_eq!(&bytes[..4], &[1, 0, 1, 3]);
        assert_eq!(&bytes[100..132], &[9u8; 32]);
        assert_eq!(&bytes[133..], &[2, 1, 1, 3, 1, 2, 3]);
    }

    #[test]
    fn test_sign_legacy_then_resign_serialized() {
        let payer = Keypair::from_seed([1u8; 32]);
        let ix = Instruction {
            program_id: Pubkey::new([4u8; 32]),
            accounts: vec![AccountMeta::writable(Pubkey::new([2u8; 32]), false)],
            data: vec![],
        };
        let msg = LegacyMessage::compile(&payer.pubkey(), &[ix], [9u8; 32]).unwrap();
        let signed = sign_legacy(&msg, &[&payer]).unwrap();
        assert_eq!(signed[0], 1);
        assert_eq!(&signed[65..], msg.serialize().unwrap().as_slice());

        // Blank the signature and sign again through the serialized path.
        let mut blank = signed.clone();
        blank[1..65].fill(0);
        assert_eq!(sign_serialized(&blank, &payer).unwrap(), signed);
    }

    #[test]
    fn test_sign_legacy_missing_signer() {
        let payer = Keypair::from_seed([1u8; 32]);
        let other = Keypair::from_seed([2u8; 32]);
        let msg = LegacyMessage::compile(&payer.pubkey(), &[], [0u8; 32]).unwrap();
        assert_eq!(
            sign_legacy(&msg, &[&other]),
            Err(TransactionError::MissingSigner(payer.pubkey()))
        );
    }

    #[test]
    fn test_sign_versioned_message() {
        let payer = Keypair::from_seed([1u8; 32]);
        let msg = LegacyMessage::compile(&payer.pubkey(), &[], [0u8; 32]).unwrap();
        let mut message = vec![VERSION_PREFIX_MASK];
        message.extend(msg.serialize().unwrap());
        message.push(0); // no address table lookups

        let mut tx = vec![1];
        tx.extend_from_slice(&[0u8; 64]);
        tx.extend_from_slice(&message);

        let layout = TransactionLayout::parse(&tx).unwrap();
        assert_eq!(layout.message_offset, 65);
        assert_eq!(layout.account_keys, vec![payer.pubkey()]);

        let signed = sign_serialized(&tx, &payer).unwrap();
        assert_eq!(&signed[1..65], &payer.sign(&message));
        assert_eq!(&signed[65..], message.as_slice());

        let stranger = Keypair::from_seed([3u8; 32]);
        assert_eq!(
            sign_serialized(&tx, &stranger),
            Err(TransactionError::NotASigner(stranger.pubkey()))
        );
    }

    #[test]
    fn test_parse_truncated() {
        assert_eq!(TransactionLayout::parse(&[]), Err(TransactionError::Truncated));
        assert_eq!(TransactionLayout::parse(&[1, 0, 0]), Err(TransactionError::Truncated));
    }
}
