//! Conversion from geyser proto frames into the decoder's raw types.
//!
//! Returns `None` for frames that are structurally unusable (vote
//! transactions, failed transactions, missing message/meta); the stream loop
//! counts those as dropped frames.

use yellowstone_grpc_proto::geyser::{SubscribeUpdateAccount, SubscribeUpdateTransaction};
use yellowstone_grpc_proto::prost_types::Timestamp;

use crate::decoder::{RawAccountUpdate, RawInnerInstructions, RawInstruction, RawTransaction};

pub fn account_update_from_proto(update: SubscribeUpdateAccount) -> Option<RawAccountUpdate> {
    let info = update.account?;
    Some(RawAccountUpdate {
        address: bs58::encode(&info.pubkey).into_string(),
        owner: bs58::encode(&info.owner).into_string(),
        slot: update.slot,
        data: info.data,
    })
}

pub fn transaction_from_proto(
    update: SubscribeUpdateTransaction,
    created_at: Option<Timestamp>,
) -> Option<RawTransaction> {
    let info = update.transaction?;
    if info.is_vote {
        return None;
    }

    let meta = info.meta?;
    if meta.err.as_ref().is_some_and(|e| !e.err.is_empty()) {
        return None;
    }

    let transaction = info.transaction?;
    let message = transaction.message?;

    let signature = if !info.signature.is_empty() {
        bs58::encode(&info.signature).into_string()
    } else {
        bs58::encode(transaction.signatures.first()?).into_string()
    };

    // Static keys first, then address-table loaded keys, matching on-chain
    // index space.
    let mut account_keys: Vec<String> = message
        .account_keys
        .iter()
        .map(|raw| bs58::encode(raw).into_string())
        .collect();
    account_keys.extend(
        meta.loaded_writable_addresses
            .iter()
            .map(|raw| bs58::encode(raw).into_string()),
    );
    account_keys.extend(
        meta.loaded_readonly_addresses
            .iter()
            .map(|raw| bs58::encode(raw).into_string()),
    );

    let instructions = message
        .instructions
        .iter()
        .map(|ix| RawInstruction {
            program_index: ix.program_id_index as usize,
            account_indexes: ix.accounts.iter().map(|&idx| idx as usize).collect(),
            data: ix.data.clone(),
        })
        .collect();

    let inner_instructions = meta
        .inner_instructions
        .iter()
        .map(|group| RawInnerInstructions {
            outer_index: group.index as usize,
            instructions: group
                .instructions
                .iter()
                .map(|ix| RawInstruction {
                    program_index: ix.program_id_index as usize,
                    account_indexes: ix.accounts.iter().map(|&idx| idx as usize).collect(),
                    data: ix.data.clone(),
                })
                .collect(),
        })
        .collect();

    let block_time = created_at
        .filter(|ts| ts.nanos >= 0 && ts.nanos < 1_000_000_000)
        .map(|ts| ts.seconds);

    Some(RawTransaction {
        signature,
        slot: update.slot,
        block_time,
        account_keys,
        instructions,
        inner_instructions,
        log_lines: meta.log_messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use yellowstone_grpc_proto::geyser::SubscribeUpdateTransactionInfo;
    use yellowstone_grpc_proto::solana::storage::confirmed_block::{
        CompiledInstruction, Message, Transaction, TransactionStatusMeta,
    };

    fn make_proto_tx(is_vote: bool) -> SubscribeUpdateTransaction {
        SubscribeUpdateTransaction {
            slot: 7,
            transaction: Some(SubscribeUpdateTransactionInfo {
                signature: vec![1u8; 64],
                is_vote,
                transaction: Some(Transaction {
                    signatures: vec![vec![1u8; 64]],
                    message: Some(Message {
                        account_keys: vec![vec![2u8; 32], vec![3u8; 32]],
                        instructions: vec![CompiledInstruction {
                            program_id_index: 1,
                            accounts: vec![0],
                            data: vec![9, 9],
                        }],
                        ..Default::default()
                    }),
                }),
                meta: Some(TransactionStatusMeta {
                    log_messages: vec!["Program log: hello".to_string()],
                    ..Default::default()
                }),
                index: 0,
            }),
        }
    }

    #[test]
    fn test_transaction_conversion() {
        let raw = transaction_from_proto(make_proto_tx(false), None).unwrap();
        assert_eq!(raw.slot, 7);
        assert_eq!(raw.signature, bs58::encode(vec![1u8; 64]).into_string());
        assert_eq!(raw.account_keys.len(), 2);
        assert_eq!(raw.instructions.len(), 1);
        assert_eq!(raw.instructions[0].program_index, 1);
        assert_eq!(raw.log_lines.len(), 1);
        assert_eq!(raw.block_time, None);
    }

    #[test]
    fn test_vote_transaction_dropped() {
        assert!(transaction_from_proto(make_proto_tx(true), None).is_none());
    }

    #[test]
    fn test_created_at_becomes_block_time() {
        let ts = Timestamp { seconds: 1_700_000_123, nanos: 5 };
        let raw = transaction_from_proto(make_proto_tx(false), Some(ts)).unwrap();
        assert_eq!(raw.block_time, Some(1_700_000_123));
    }
}
