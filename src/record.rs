// Record Model - canonical (name, code) region mapping
// Pure normalization + validity rules, no I/O

use serde::{Deserialize, Serialize};
use std::fmt;

/// Required length of a region code after normalization
pub const CODE_LEN: usize = 2;

// ============================================================================
// RAW PAIR
// ============================================================================

/// RawPair - one candidate row as it came out of the table
///
/// Serialized with the same keys the intermediate slot files have always
/// used, so staging files stay readable by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPair {
    #[serde(rename = "State Name")]
    pub name: String,

    #[serde(rename = "ID")]
    pub code: String,
}

impl RawPair {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        RawPair {
            name: name.into(),
            code: code.into(),
        }
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// Record - a normalized (name, code) pair
///
/// Fields are private: the only way to get a `Record` is through
/// `normalize`/`parse` (or reading one back from the store), so every
/// instance is trimmed, title-cased and upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "State Name")]
    name: String,

    #[serde(rename = "ID")]
    code: String,
}

impl Record {
    /// Trim both fields, title-case the name, upper-case the code.
    ///
    /// Never fails, so the result may be invalid. Outside the crate records
    /// come from `parse`; the store refuses invalid ones regardless.
    pub(crate) fn normalize(raw_name: &str, raw_code: &str) -> Self {
        Record {
            name: title_case(raw_name.trim()),
            code: raw_code.trim().to_uppercase(),
        }
    }

    /// Normalize and validate in one step
    pub fn parse(raw_name: &str, raw_code: &str) -> Result<Self, RecordRejection> {
        let record = Record::normalize(raw_name, raw_code);
        match record.rejection() {
            Some(reason) => Err(reason),
            None => Ok(record),
        }
    }

    /// Rebuild a record from already-normalized storage columns
    pub(crate) fn from_stored(name: String, code: String) -> Self {
        Record { name, code }
    }

    pub fn is_valid(&self) -> bool {
        self.rejection().is_none()
    }

    /// Why this record would be rejected, if it would be
    pub fn rejection(&self) -> Option<RecordRejection> {
        if self.name.is_empty() {
            return Some(RecordRejection::EmptyName);
        }
        if self.code.is_empty() {
            return Some(RecordRejection::EmptyCode);
        }
        let len = self.code.chars().count();
        if len != CODE_LEN {
            return Some(RecordRejection::CodeLength(len));
        }
        None
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

// ============================================================================
// REJECTION REASONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "length", rename_all = "snake_case")]
pub enum RecordRejection {
    EmptyName,
    EmptyCode,
    /// Code has the wrong number of characters (actual length)
    CodeLength(usize),
}

impl fmt::Display for RecordRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRejection::EmptyName => write!(f, "name is empty"),
            RecordRejection::EmptyCode => write!(f, "code is empty"),
            RecordRejection::CodeLength(n) => {
                write!(f, "code must be {} characters, got {}", CODE_LEN, n)
            }
        }
    }
}

/// Title-case a name the way names are compared everywhere in the system:
/// a letter is upper-cased when it starts a word (the previous char is not
/// alphabetic) and lower-cased otherwise.
///
/// "andaman and nicobar" -> "Andaman And Nicobar", "jammu & kashmir" ->
/// "Jammu & Kashmir". Idempotent.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_alpha = false;

    for c in input.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }

    out
}
