//! Domain services
//!
//! `importer` is the XML-to-relational reconciliation engine, `notifier`
//! fans reschedule changesets out to push-notification jobs, `snapshot`
//! builds the incremental-sync read model, `engagement` covers anonymous
//! identity, bookmarks and rates.

pub mod engagement;
pub mod importer;
pub mod notifier;
pub mod snapshot;
