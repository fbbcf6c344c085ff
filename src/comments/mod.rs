//! Follow-up comments under relayed posts in the target's discussion group.

pub mod correlator;
pub mod poster;

pub use correlator::Correlator;
pub use poster::CommentPoster;
