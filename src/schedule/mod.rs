//! Schedule ingestion primitives
//!
//! Pure functions over the published schedule XML: parsing into a
//! normalized tree, free-text sanitization, and the content checksum used
//! to short-circuit unchanged imports. No persistence happens here; the
//! reconciliation engine in `services::importer` consumes the tree.

pub mod checksum;
pub mod parser;
pub mod sanitize;

pub use checksum::schedule_checksum;
pub use parser::{parse_schedule, Day, EventNode, PersonNode, RoomNode, Schedule, TrackRef};
pub use sanitize::sanitize_markup;
