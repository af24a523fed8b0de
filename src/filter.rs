//! Keep/skip decisions for archive entries.
//!
//! A [`SimpleNameFilter`] combines a [`Pattern`] with an inclusion flag.
//! [`ByName`] lifts any [`NameFilter`] to an [`EntryFilter`], which is what
//! the convert pipeline consumes.

use regex::Regex;
use tracing::warn;

use crate::error::ConvertError;
use crate::zip::ZipFileEntry;

/// Outcome of filtering one entry.
///
/// There is no "unspecified" outcome. The default is [`FilterResult::Skip`],
/// so a filter that has no opinion drops the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterResult {
    Keep,
    #[default]
    Skip,
}

impl FilterResult {
    pub fn is_keep(self) -> bool {
        self == FilterResult::Keep
    }
}

/// Compiled regular expression over entry names.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// Source of the default pattern, matching any non-empty name.
    pub const DEFAULT: &'static str = ".";

    pub fn new(pattern: &str) -> Result<Self, ConvertError> {
        let regex = Regex::new(pattern).map_err(|source| ConvertError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }

    /// Whether the pattern matches anywhere in `name`.
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self {
            regex: Regex::new(Self::DEFAULT).expect("default pattern compiles"),
        }
    }
}

/// Decides on an entry from its name alone.
pub trait NameFilter {
    fn decide(&self, name: &str) -> FilterResult;

    /// Adapt into an [`EntryFilter`] that looks at `entry.file_name`.
    fn into_entry_filter(self) -> ByName<Self>
    where
        Self: Sized,
    {
        ByName(self)
    }
}

/// Decides on an entry from its central directory record.
pub trait EntryFilter: Send + Sync {
    fn decide(&self, entry: &ZipFileEntry) -> FilterResult;
}

impl<F> EntryFilter for F
where
    F: Fn(&ZipFileEntry) -> FilterResult + Send + Sync,
{
    fn decide(&self, entry: &ZipFileEntry) -> FilterResult {
        self(entry)
    }
}

/// [`EntryFilter`] that delegates to a [`NameFilter`].
#[derive(Debug, Clone)]
pub struct ByName<N>(pub N);

impl<N: NameFilter + Send + Sync> EntryFilter for ByName<N> {
    fn decide(&self, entry: &ZipFileEntry) -> FilterResult {
        self.0.decide(&entry.file_name)
    }
}

/// Keeps every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopFilter;

impl EntryFilter for NopFilter {
    fn decide(&self, _entry: &ZipFileEntry) -> FilterResult {
        FilterResult::Keep
    }
}

/// Pattern plus inclusion polarity.
///
/// | include_found | pattern matches | result |
/// |:-------------:|:---------------:|:------:|
/// | true          | yes             | Keep   |
/// | true          | no              | Skip   |
/// | false         | yes             | Skip   |
/// | false         | no              | Keep   |
#[derive(Debug, Clone)]
pub struct SimpleNameFilter {
    pub pattern: Pattern,
    pub include_found: bool,
}

impl Default for SimpleNameFilter {
    fn default() -> Self {
        Self {
            pattern: Pattern::default(),
            include_found: true,
        }
    }
}

impl SimpleNameFilter {
    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Compile and use `pattern`.
    ///
    /// An invalid pattern is logged and ignored: the current pattern stays.
    /// Use [`SimpleNameFilter::try_with_pattern_string`] to reject it instead.
    pub fn with_pattern_string(self, pattern: &str) -> Self {
        match Pattern::new(pattern) {
            Ok(parsed) => self.with_pattern(parsed),
            Err(err) => {
                warn!(
                    pattern,
                    kept = self.pattern.as_str(),
                    "ignoring invalid name pattern: {}",
                    crate::error::error_chain(&err)
                );
                self
            }
        }
    }

    pub fn try_with_pattern_string(self, pattern: &str) -> Result<Self, ConvertError> {
        Ok(self.with_pattern(Pattern::new(pattern)?))
    }

    pub fn with_include_found(mut self, include_found: bool) -> Self {
        self.include_found = include_found;
        self
    }
}

impl NameFilter for SimpleNameFilter {
    fn decide(&self, name: &str) -> FilterResult {
        let found = self.pattern.matches(name);
        // include XOR found
        let skip = found != self.include_found;
        if skip {
            FilterResult::Skip
        } else {
            FilterResult::Keep
        }
    }
}
