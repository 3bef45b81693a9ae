//! Subscription filter construction.
//!
//! Two logical subscriptions run against the feed: one for the tracked
//! programs' account writes, one for their transactions. Each gets its own
//! `SubscribeRequest`; the same `SubscriptionFilters` value can be re-sent
//! on an open channel to change filters without reconnecting.

use std::collections::HashMap;
use yellowstone_grpc_proto::geyser::{
    CommitmentLevel, SubscribeRequest, SubscribeRequestFilterAccounts,
    SubscribeRequestFilterTransactions,
};

use crate::decoder::{AMM_PROGRAM_ID, CURVE_PROGRAM_ID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFilters {
    /// Program ids whose owned accounts and transactions we follow.
    pub program_ids: Vec<String>,
}

impl SubscriptionFilters {
    /// The two programs this engine is scoped to.
    pub fn tracked_programs() -> Self {
        Self {
            program_ids: vec![CURVE_PROGRAM_ID.to_string(), AMM_PROGRAM_ID.to_string()],
        }
    }

    /// Request for the account-update channel: every account owned by a
    /// tracked program.
    pub fn account_request(&self, commitment: CommitmentLevel) -> SubscribeRequest {
        let mut accounts = HashMap::new();
        accounts.insert(
            "pumpflow-accounts".to_string(),
            SubscribeRequestFilterAccounts {
                account: vec![],
                owner: self.program_ids.clone(),
                filters: vec![],
                nonempty_txn_signature: None,
            },
        );

        SubscribeRequest {
            accounts,
            commitment: Some(commitment as i32),
            ..Default::default()
        }
    }

    /// Request for the transaction channel: non-vote, successful
    /// transactions that reference a tracked program.
    pub fn transaction_request(&self, commitment: CommitmentLevel) -> SubscribeRequest {
        let mut transactions = HashMap::new();
        transactions.insert(
            "pumpflow-transactions".to_string(),
            SubscribeRequestFilterTransactions {
                vote: Some(false),
                failed: Some(false),
                signature: None,
                account_include: self.program_ids.clone(),
                account_exclude: vec![],
                account_required: vec![],
            },
        );

        SubscribeRequest {
            transactions,
            commitment: Some(commitment as i32),
            ..Default::default()
        }
    }
}
