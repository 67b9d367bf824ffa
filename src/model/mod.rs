//! Domain model shared by every component of the control loop.

pub mod channel;
pub mod decision;
pub mod policy;
pub mod score;
pub mod weights;

pub use channel::{ChannelId, ChannelMetrics, ChannelStatus, NodeId};
pub use decision::{Decision, DecisionKind, DecisionReason, DecisionStatus};
pub use policy::{ChannelPolicy, Direction, PolicyBackup};
pub use score::{ChannelScore, SubScores};
pub use weights::{SafetyEnvelope, SafetyMode, Weights};
