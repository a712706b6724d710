//! Tracking id generation.
//!
//! Ids look like `65F1A2B3-1A2B-3C4D-5E6F-7081-92A3B4C5`: the Unix timestamp
//! in seconds followed by twelve random bytes split into groups. They are
//! unique enough for tracking but are not secrets.

use chrono::Utc;
use rand::RngCore;

/// Generate a tracking id stamped with the current time.
pub fn generate_id() -> String {
    generate_id_at(Utc::now().timestamp())
}

/// Generate a tracking id stamped with `unix_secs`.
pub fn generate_id_at(unix_secs: i64) -> String {
    let mut random = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut random);

    // Truncation keeps the leading group at eight hex digits or fewer.
    let mut id = format!("{:X}", unix_secs as u32);
    for group in [&random[0..2], &random[2..4], &random[4..6], &random[6..8], &random[8..]] {
        id.push('-');
        id.push_str(&upper_hex(group));
    }
    id
}

fn upper_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}
