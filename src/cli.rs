use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

use crate::convert::{ConvertConfig, MAX_ITEM_SIZE_DEFAULT};
use crate::error::ConvertError;
use crate::filter::{NameFilter, Pattern, SimpleNameFilter};

#[derive(Parser, Debug)]
#[command(name = "zip2zip")]
#[command(version)]
#[command(about = "Copy selected entries of a ZIP archive into a new ZIP on stdout")]
#[command(long_about = None)]
#[command(after_help = "Examples:\n  \
  zip2zip data.zip -p '\\.txt$' > texts.zip             keep only .txt entries\n  \
  zip2zip data.zip -p '^tmp/' --include-found false > clean.zip\n  \
  ENV_INPUT_ZIP_FILENAME=data.zip ENV_MAX_ITEM_SIZE=1048576 zip2zip > small.zip")]
pub struct Cli {
    /// Source ZIP file
    #[arg(value_name = "FILE", env = "ENV_INPUT_ZIP_FILENAME")]
    pub input: Option<PathBuf>,

    /// Regular expression matched against entry names (default: ".")
    #[arg(short = 'p', long, value_name = "REGEX", env = "ENV_NAME_PATTERN")]
    pub pattern: Option<String>,

    /// Keep entries whose name matches (true) or does not match (false)
    #[arg(long, value_name = "BOOL", env = "ENV_INCLUDE_FOUND")]
    pub include_found: Option<String>,

    /// Skip entries whose compressed size exceeds this many bytes
    #[arg(long, value_name = "BYTES", env = "ENV_MAX_ITEM_SIZE")]
    pub max_item_size: Option<String>,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

/// Resolved run settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub input: PathBuf,
    pub filter: SimpleNameFilter,
    pub max_item_size: i64,
}

impl Settings {
    pub fn convert_config(&self) -> ConvertConfig {
        ConvertConfig::default()
            .with_filter(self.filter.clone().into_entry_filter())
            .with_max_item_size(self.max_item_size)
    }
}

impl Cli {
    /// Resolve every setting, falling back to its default when a value
    /// does not parse. Only a missing input is an error.
    pub fn settings(&self) -> Result<Settings, ConvertError> {
        let input = self
            .input
            .clone()
            .ok_or(ConvertError::Configuration("ENV_INPUT_ZIP_FILENAME"))?;

        let include_found = match self.include_found.as_deref() {
            None => true,
            Some(raw) => parse_bool(raw).unwrap_or_else(|| {
                warn!(value = raw, "ignoring invalid ENV_INCLUDE_FOUND, using true");
                true
            }),
        };

        let max_item_size = match self.max_item_size.as_deref() {
            None => MAX_ITEM_SIZE_DEFAULT,
            Some(raw) => raw.parse::<i64>().unwrap_or_else(|err| {
                warn!(
                    value = raw,
                    "ignoring invalid ENV_MAX_ITEM_SIZE ({err}), using {MAX_ITEM_SIZE_DEFAULT}"
                );
                MAX_ITEM_SIZE_DEFAULT
            }),
        };

        let filter = SimpleNameFilter::default()
            .with_pattern_string(self.pattern.as_deref().unwrap_or(Pattern::DEFAULT))
            .with_include_found(include_found);

        Ok(Settings {
            input,
            filter,
            max_item_size,
        })
    }

    /// Default log directive for the quiet level.
    pub fn log_level(&self) -> &'static str {
        match self.quiet {
            0 => "info",
            1 => "warn",
            _ => "error",
        }
    }
}

/// Boolean spellings accepted by `ENV_INCLUDE_FOUND`.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
