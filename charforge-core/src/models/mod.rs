pub mod profile;
pub mod turn;
pub mod worldview;

pub use profile::{ProfileRecord, ProfileSummary};
pub use turn::{Speaker, Turn};
pub use worldview::WorldviewRecord;
