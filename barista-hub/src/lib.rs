pub mod frame;
pub mod hub;
pub mod subscription;

pub use frame::{ChannelFrame, FeedFrame, Frame};
pub use hub::{ConnectionId, Hub, HubConfig, HubError, HubHandle};
pub use subscription::{Subscription, SubscriptionState};
