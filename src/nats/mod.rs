pub mod client;
pub mod messages;

pub use client::NatsAnnouncer;
pub use messages::AnnouncementMessage;
