//! Domain layer: value objects, entities, and the collaborator interfaces
//! the relay core depends on.

pub mod entity;
pub mod error;
pub mod feed;
pub mod gamification;
pub mod store;
pub mod value_object;

pub use entity::{
    ChatGroup, ChatMessage, GroupMember, LeaderboardEntry, TypingEntry, UserProfile,
    TYPING_TIMEOUT_MS,
};
pub use error::{DomainError, StoreError};
pub use feed::{ChangeFeed, FeedClass, FeedEvent, FeedScope, FeedSubscription, SubscriptionId};
pub use store::{GamificationLedger, GroupDirectory, MessageStore, TypingStore, UserDirectory};
pub use value_object::{
    ConnectionId, ConnectionIdFactory, EncryptedContent, GroupId, GroupIdFactory, MessageId,
    MessageIdFactory, Timestamp, UserId, UserIdFactory,
};
