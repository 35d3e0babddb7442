pub mod details;
pub mod events;
pub mod ids;
pub mod job;
pub mod options;
pub mod payload;

pub use details::JobDetails;
pub use events::JobEvent;
pub use ids::JobId;
pub use job::Job;
pub use options::PushOptions;
pub use payload::JobPayload;
