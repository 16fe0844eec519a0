use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for a multi-token collection.
#[repr(transparent)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CollectionId(pub u64);

impl CollectionId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl From<u64> for CollectionId {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<CollectionId> for u64 {
    fn from(value: CollectionId) -> Self {
        value.into_inner()
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a token within a collection.
#[repr(transparent)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TokenId(pub u64);

impl TokenId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl From<u64> for TokenId {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<TokenId> for u64 {
    fn from(value: TokenId) -> Self {
        value.into_inner()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Representation of a per-account transaction nonce.
#[repr(transparent)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Nonce(u64);

impl Nonce {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn into_inner(self) -> u64 {
        self.0
    }

    /// The nonce one past this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for Nonce {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<Nonce> for u64 {
    fn from(value: Nonce) -> Self {
        value.into_inner()
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quantity of tokens moved by a single transfer.
#[repr(transparent)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(pub u128);

impl Amount {
    /// The usual quantity for an NFT tip.
    pub const ONE: Amount = Amount(1);

    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    pub const fn into_inner(self) -> u128 {
        self.0
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self::new(value)
    }
}

impl From<Amount> for u128 {
    fn from(value: Amount) -> Self {
        value.into_inner()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chain account address in whatever encoding the node expects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key used to group queued transfers into batchable sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub collection: CollectionId,
    pub token: TokenId,
}

impl GroupKey {
    pub const fn new(collection: CollectionId, token: TokenId) -> Self {
        Self { collection, token }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.collection, self.token)
    }
}

/// One intended on-chain transfer, as handed over by a producer.
///
/// Owned by the [`TransferQueue`](crate::transfer_queue::TransferQueue) until
/// dispatched; leaves the system on terminal success or through the dead
/// letter sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub recipient: Address,
    pub collection: CollectionId,
    pub token: TokenId,
    pub amount: Amount,
    /// Human readable tag of whoever caused this transfer, for logs and the
    /// dead letter record. Not sent on chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_context: Option<String>,
    /// Failed submission attempts so far. Never decreases.
    #[serde(default)]
    pub retries: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl TransferRequest {
    pub fn new(
        recipient: impl Into<Address>,
        collection: CollectionId,
        token: TokenId,
        amount: Amount,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            collection,
            token,
            amount,
            sender_context: None,
            retries: 0,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.sender_context = Some(context.into());
        self
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(self.collection, self.token)
    }

    /// Tag used in log lines when the producer did not name anyone.
    pub fn recipient_tag(&self) -> &str {
        self.sender_context.as_deref().unwrap_or("anonymous")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_key_display() {
        let key = GroupKey::new(CollectionId::new(10), TokenId::new(5));
        assert_eq!(key.to_string(), "10-5");
    }

    #[test]
    fn test_requests_share_group_key() {
        let a = TransferRequest::new("alice", CollectionId::new(7), TokenId::new(1), Amount::ONE);
        let b = TransferRequest::new("bob", CollectionId::new(7), TokenId::new(1), Amount::ONE);
        let c = TransferRequest::new("carol", CollectionId::new(7), TokenId::new(2), Amount::ONE);

        assert_eq!(a.group_key(), b.group_key());
        assert_ne!(a.group_key(), c.group_key());
    }

    #[test]
    fn test_recipient_tag_fallback() {
        let plain = TransferRequest::new("addr", CollectionId::new(1), TokenId::new(1), Amount::ONE);
        assert_eq!(plain.recipient_tag(), "anonymous");

        let tagged = plain.clone().with_context("alice#1234");
        assert_eq!(tagged.recipient_tag(), "alice#1234");
    }

    #[test]
    fn test_nonce_next() {
        assert_eq!(Nonce::new(41).next(), Nonce::new(42));
    }

    #[test]
    fn test_request_round_trips_through_json() {
        let request = TransferRequest::new(
            "0x1a21be6b",
            CollectionId::new(2100),
            TokenId::new(3),
            Amount::new(1),
        )
        .with_context("alice#1234");

        let encoded = serde_json::to_string(&request).unwrap();
        let decoded: TransferRequest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.recipient, request.recipient);
        assert_eq!(decoded.group_key(), request.group_key());
        assert_eq!(decoded.retries, 0);
    }
}
