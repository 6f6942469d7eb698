#![forbid(unsafe_code)]

mod engagement;
mod notice;

pub use engagement::{AppendOnlyRecordManager, NoticeReactionManager, NoticeRsvpManager};
pub use notice::{LifecycleState, NoticeIndex, NoticeManager, NoticeState, NoticeView};
