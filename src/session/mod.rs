mod actor;
mod error;
mod gps;
mod messages;

pub use actor::SessionActor;
pub use gps::GpsFix;
pub use messages::Outbound;
