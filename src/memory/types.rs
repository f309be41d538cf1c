//! Core memory type definitions.
//!
//! Defines [`Category`] (the closed set of fact kinds) and [`MemoryFact`]
//! (a stored fact about one user).

use serde::{Deserialize, Serialize};

/// What kind of statement a fact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Likes, dislikes, preferred ways of working.
    Preference,
    /// Recurring behaviour ("reviews email at 8am").
    Habit,
    /// Ongoing work the user is involved in.
    Project,
    /// People and how the user relates to them.
    Relationship,
    /// Hard limits ("no meetings on Fridays").
    Constraint,
    /// Dated happenings.
    Event,
    /// Personal details.
    Personal,
    Other,
}

impl Category {
    /// Every category, in the order context blocks render them.
    pub const ALL: [Category; 8] = [
        Category::Preference,
        Category::Constraint,
        Category::Habit,
        Category::Project,
        Category::Relationship,
        Category::Event,
        Category::Personal,
        Category::Other,
    ];

    /// Categories that shape outgoing communication drafted for the user.
    pub const CONSTRAINTS: [Category; 3] =
        [Category::Preference, Category::Constraint, Category::Habit];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preference => "preference",
            Self::Habit => "habit",
            Self::Project => "project",
            Self::Relationship => "relationship",
            Self::Constraint => "constraint",
            Self::Event => "event",
            Self::Personal => "personal",
            Self::Other => "other",
        }
    }

    /// Section heading used in rendered context blocks.
    pub fn heading(&self) -> &'static str {
        match self {
            Self::Preference => "Preferences",
            Self::Habit => "Habits",
            Self::Project => "Projects",
            Self::Relationship => "Relationships",
            Self::Constraint => "Constraints",
            Self::Event => "Events",
            Self::Personal => "Personal",
            Self::Other => "Other",
        }
    }

    /// Parse model output leniently: case-insensitive, plural-tolerant,
    /// anything unrecognised becomes [`Category::Other`].
    pub fn from_lenient(s: &str) -> Self {
        let lower = s.trim().to_lowercase();
        let singular = lower.strip_suffix('s').unwrap_or(&lower);
        lower
            .parse::<Category>()
            .or_else(|_| singular.parse::<Category>())
            .unwrap_or(Category::Other)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preference" => Ok(Self::Preference),
            "habit" => Ok(Self::Habit),
            "project" => Ok(Self::Project),
            "relationship" => Ok(Self::Relationship),
            "constraint" => Ok(Self::Constraint),
            "event" => Ok(Self::Event),
            "personal" => Ok(Self::Personal),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown category: {s}")),
        }
    }
}

/// A fact record, matching the `memory_facts` table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFact {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    /// Owner of the fact; facts are never shared across users.
    pub user_id: String,
    pub fact: String,
    pub category: Category,
    /// Importance in `[0.0, 1.0]`, assigned at extraction time.
    pub importance: f64,
    /// Free-form key-value data (e.g. `{"source": "chat"}`).
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-modification timestamp.
    pub updated_at: String,
}
