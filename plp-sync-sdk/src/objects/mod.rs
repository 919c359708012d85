pub mod admin;
pub mod amount;
pub mod broadcast;
pub mod status;
pub mod topic;
pub mod ws;

pub use admin::{
    ADMIN_AUTH_HEADER, DeadLetterEntry, DeadLetterList, EnqueueResponse, ReplayResponse,
};
pub use amount::Amount;
pub use broadcast::{
    BroadcastMessage, LifecycleState, MarketAction, MarketPhase, MarketResolvedPayload,
    MarketUpdatePayload, PositionSide, PositionUpdatePayload, Resolution,
};
pub use status::{FeedState, SyncStatus};
pub use topic::{Topic, TopicParseError};
pub use ws::{WsClientMessage, WsCloseCode, WsServerMessage};
