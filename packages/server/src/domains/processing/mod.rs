pub mod messages;
pub mod profiles;
pub mod router;
pub mod worker;

pub use messages::ProcessingMessage;
pub use profiles::ResourceProfile;
pub use router::{tier_for_size, ProcessingQueues, QueueTier};
pub use worker::DocumentWorker;
