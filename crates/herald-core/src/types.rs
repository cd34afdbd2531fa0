//! Shared data model: recipients, audience filters, inline keyboards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A broadcast recipient, as the audience store exposes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
    pub alias: Option<String>,
    /// Category membership bits, matched against [`AudienceFilter`].
    pub categories: u32,
}

/// A bitmask of recipient categories. Zero means no restriction: everyone
/// matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceFilter(pub u32);

impl AudienceFilter {
    pub const EVERYONE: Self = Self(0);

    pub const SUBSCRIBERS: u32 = 1 << 0;
    pub const TESTERS: u32 = 1 << 1;
    pub const INACTIVE: u32 = 1 << 2;

    /// Parse a filter token like `none`, `subscribers`, or
    /// `subscribers+testers`. Malformed tokens are a user mistake, not a
    /// failure: the Err carries the corrective text.
    pub fn parse(token: &str) -> Result<Self, String> {
        let token = token.trim().to_lowercase();
        if token.is_empty() || token == "none" || token == "everyone" {
            return Ok(Self::EVERYONE);
        }
        let mut bits = 0u32;
        for part in token.split('+') {
            bits |= match part.trim() {
                "subscribers" => Self::SUBSCRIBERS,
                "testers" => Self::TESTERS,
                "inactive" => Self::INACTIVE,
                other => {
                    return Err(format!(
                        "Unknown audience \"{other}\". Use: everyone, subscribers, testers, inactive (combine with +)."
                    ))
                }
            };
        }
        Ok(Self(bits))
    }

    /// Whether a recipient with the given category bits receives the
    /// broadcast.
    pub fn matches(&self, categories: u32) -> bool {
        self.0 == 0 || self.0 & categories != 0
    }
}

impl fmt::Display for AudienceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "everyone");
        }
        let mut names = Vec::new();
        if self.0 & Self::SUBSCRIBERS != 0 {
            names.push("subscribers");
        }
        if self.0 & Self::TESTERS != 0 {
            names.push("testers");
        }
        if self.0 & Self::INACTIVE != 0 {
            names.push("inactive");
        }
        write!(f, "{}", names.join("+"))
    }
}

/// An inline keyboard attached to a sent message.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn single_row(buttons: Vec<Button>) -> Self {
        Self { rows: vec![buttons] }
    }
}

/// One inline keyboard button; pressing it delivers `callback_data` back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(label: &str, callback_data: &str) -> Self {
        Self {
            label: label.to_string(),
            callback_data: callback_data.to_string(),
        }
    }
}
