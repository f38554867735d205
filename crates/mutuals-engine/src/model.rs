//! Member records and the writes that touch them.
//!
//! A [`Member`] carries two groups of fields:
//!
//! - **client-owned**: `identity_name`, `contact`, `crushes`. Written through
//!   [`MemberEdit`], each write bumps `revision`.
//! - **engine-owned**: `locked_crushes`, `matches`, `crush_count`. Written only
//!   through [`EngineWrite`] batches produced by a recompute.

use serde::{Deserialize, Serialize};

/// Stable member identifier, assigned once at signup.
pub type MemberId = String;

/// Milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One mutual edge as seen from one side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchEntry {
    /// Canonical name of the peer
    pub peer_name: String,

    /// Contact handle of the peer
    pub peer_contact: String,

    /// When the match was first detected (unix millis)
    pub matched_at: u64,
}

/// A signed-up roster participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Unique identifier
    pub id: MemberId,

    /// Canonical display name, empty until verified
    #[serde(default)]
    pub identity_name: String,

    /// Contact handle shared with matches
    #[serde(default)]
    pub contact: String,

    /// Free-text names this member is interested in
    #[serde(default)]
    pub crushes: Vec<String>,

    /// Crushes that became mutual; never shrinks
    #[serde(default)]
    pub locked_crushes: Vec<String>,

    /// Mutual matches known as of the last recompute
    #[serde(default)]
    pub matches: Vec<MatchEntry>,

    /// Number of other members whose crushes resolve to this member
    #[serde(default)]
    pub crush_count: u32,

    /// Bumped on every client write
    #[serde(default)]
    pub revision: u64,

    /// Signup time (unix millis)
    #[serde(default)]
    pub created_at: u64,
}

impl Member {
    /// Create a freshly signed-up member with no crushes or matches.
    pub fn new(id: MemberId, contact: String) -> Self {
        Self {
            id,
            identity_name: String::new(),
            contact,
            crushes: Vec::new(),
            locked_crushes: Vec::new(),
            matches: Vec::new(),
            crush_count: 0,
            revision: 0,
            created_at: now_millis(),
        }
    }

    /// Builder-style identity name, mostly for fixtures.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.identity_name = name.into();
        self
    }

    /// Builder-style crush list, mostly for fixtures.
    pub fn with_crushes<I, S>(mut self, crushes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.crushes = crushes.into_iter().map(Into::into).collect();
        self
    }

    /// Generate an id from the contact handle and signup time.
    pub fn generate_id(contact: &str, created_at: u64) -> MemberId {
        let hash = blake3::hash(format!("{}:{}", contact, created_at).as_bytes());
        hex::encode(&hash.as_bytes()[..16])
    }

    /// Whether the member has a canonical name yet.
    pub fn is_verified(&self) -> bool {
        !self.identity_name.trim().is_empty()
    }

    /// Apply a client edit in place, bumping the revision.
    pub fn apply(&mut self, edit: MemberEdit) {
        match edit {
            MemberEdit::SetCrushes(crushes) => self.crushes = crushes,
            MemberEdit::SetIdentityName(name) => self.identity_name = name,
            MemberEdit::SetContact(contact) => self.contact = contact,
        }
        self.revision += 1;
    }

    /// Apply an engine write in place. The revision is left untouched.
    pub fn apply_engine_write(&mut self, write: &EngineWrite) {
        if let Some(crushes) = &write.crushes {
            self.crushes = crushes.clone();
        }
        self.locked_crushes = write.locked_crushes.clone();
        self.matches = write.matches.clone();
        self.crush_count = write.crush_count;
    }
}

/// A write from the member's own client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberEdit {
    /// Replace the crush list
    SetCrushes(Vec<String>),
    /// Replace the canonical name (verification)
    SetIdentityName(String),
    /// Replace the contact handle
    SetContact(String),
}

/// Engine-owned fields for one member, as computed from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineWrite {
    /// Target member
    pub id: MemberId,

    /// Revision of the snapshot this write was computed from
    pub expected_revision: u64,

    /// Crush list with locked entries restored, if the snapshot had dropped any
    pub crushes: Option<Vec<String>>,

    /// Full locked set
    pub locked_crushes: Vec<String>,

    /// Full match list
    pub matches: Vec<MatchEntry>,

    /// Derived counter
    pub crush_count: u32,
}

/// A change observed on one member record.
#[derive(Debug, Clone)]
pub struct MemberChange {
    /// Record before the write, `None` on signup
    pub before: Option<Member>,
    /// Record after the write
    pub after: Member,
}
