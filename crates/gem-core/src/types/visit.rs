use chrono::{DateTime, Utc};

/// Flags attached to a single visit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisitFlags(pub u16);

impl VisitFlags {
    /// The visit was a redirect hop; don't surface it in history UI.
    pub const TRANSIENT: u16 = 0x1;
    /// Exempt from the max-age sweep even if old.
    pub const KEPT: u16 = 0x2;

    /// True if `bit` is set.
    #[must_use]
    pub const fn has(self, bit: u16) -> bool {
        self.0 & bit != 0
    }
}

/// A single visited-URL record.
#[derive(Debug, Clone)]
pub struct VisitRecord {
    /// Canonical URL that was visited.
    pub url: String,
    /// When the visit happened (last visit wins on re-visit).
    pub when: DateTime<Utc>,
    /// Behavioral flags.
    pub flags: VisitFlags,
}
