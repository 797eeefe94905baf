mod state;
mod store;
mod topic;

pub use state::{ConversationState, ConversationStateEngine};
pub use store::{ConversationTurn, StateSeries, TurnStore};
pub use topic::{TokenOverlapScorer, TopicScorer};
