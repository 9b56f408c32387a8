//! Startup tuning directives
//!
//! A directive is the body of a `PRAGMA` statement, e.g. `journal_mode=WAL`.

use super::connection::AccessMode;

/// Defaults for read-only handles: large page cache, no rollback journal
pub const READ_ONLY_DEFAULTS: &[&str] = &["cache_size=-640000", "journal_mode=OFF"];

/// Defaults for read-write handles: WAL journal, NORMAL durability, foreign keys
pub const READ_WRITE_DEFAULTS: &[&str] = &[
    "journal_mode=WAL",
    "synchronous=NORMAL",
    "temp_store=MEMORY",
    "foreign_keys=ON",
];

/// Which directive set to apply when a handle is opened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Tuning {
    /// The mode-dependent default set
    #[default]
    Defaults,
    /// Caller-supplied directives, applied verbatim and in order
    Custom(Vec<String>),
}

impl Tuning {
    pub fn custom<I, S>(directives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Custom(directives.into_iter().map(Into::into).collect())
    }

    /// Resolve to the concrete directive list for a mode
    pub fn directives(&self, mode: AccessMode) -> Vec<String> {
        match self {
            Self::Custom(directives) => directives.clone(),
            Self::Defaults => {
                let defaults = match mode {
                    AccessMode::ReadOnly => READ_ONLY_DEFAULTS,
                    AccessMode::ReadWrite => READ_WRITE_DEFAULTS,
                };
                defaults.iter().map(|d| d.to_string()).collect()
            }
        }
    }
}

/// Turn a directive into a full statement, tolerating a leading `PRAGMA`
pub(crate) fn pragma_statement(directive: &str) -> String {
    let trimmed = directive.trim().trim_end_matches(';').trim();
    let has_keyword = trimmed
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("pragma"));
    if has_keyword {
        trimmed.to_string()
    } else {
        format!("PRAGMA {}", trimmed)
    }
}
