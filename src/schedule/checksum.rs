//! Content checksum over the parsed schedule
//!
//! The import pipeline short-circuits when an incoming document hashes to
//! the checksum already stored on the conference. The hash is SHA-256 over
//! the serde_json serialization of the normalized tree: struct fields
//! serialize in declaration order and sequences keep document order, so
//! repeated parses of byte-identical input always hash identically.

use crate::schedule::Schedule;
use crate::{Error, Result};
use sha2::{Digest, Sha256};

/// Compute the hex-encoded content checksum of a parsed schedule.
pub fn schedule_checksum(schedule: &Schedule) -> Result<String> {
    let bytes = serde_json::to_vec(schedule)
        .map_err(|e| Error::Internal(format!("Failed to serialize schedule: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();

    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::parse_schedule;

    const DOC: &str = r#"
        <schedule>
          <conference><title>T</title><acronym>t-2024</acronym></conference>
          <tracks><track>Main track</track></tracks>
          <day date="2024-11-08">
            <room name="Room A">
              <event unique_id="e1"><title>A</title><start>09:00</start></event>
            </room>
          </day>
        </schedule>
    "#;

    #[test]
    fn repeated_parses_hash_identically() {
        let a = schedule_checksum(&parse_schedule(DOC).unwrap()).unwrap();
        let b = schedule_checksum(&parse_schedule(DOC).unwrap()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn content_change_changes_hash() {
        let a = schedule_checksum(&parse_schedule(DOC).unwrap()).unwrap();
        let b = schedule_checksum(&parse_schedule(&DOC.replace("09:00", "10:00")).unwrap()).unwrap();
        assert_ne!(a, b);
    }
}
