//! Output dialects for delimited text

use std::fmt;
use std::str::FromStr;

/// Delimiter, quoting and line terminator conventions for written files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// Comma separated, CRLF, quote only when needed
    #[default]
    Excel,
    /// Tab separated, CRLF, quote only when needed
    ExcelTab,
    /// Comma separated, LF, quote every field
    Unix,
}

impl Dialect {
    pub fn delimiter(&self) -> u8 {
        match self {
            Dialect::Excel | Dialect::Unix => b',',
            Dialect::ExcelTab => b'\t',
        }
    }

    pub fn line_terminator(&self) -> &'static str {
        match self {
            Dialect::Excel | Dialect::ExcelTab => "\r\n",
            Dialect::Unix => "\n",
        }
    }

    /// A csv writer builder configured for this dialect
    pub fn writer_builder(&self) -> csv::WriterBuilder {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(self.delimiter())
            .has_headers(false)
            .double_quote(true);

        match self {
            Dialect::Excel | Dialect::ExcelTab => {
                builder
                    .terminator(csv::Terminator::CRLF)
                    .quote_style(csv::QuoteStyle::Necessary);
            }
            Dialect::Unix => {
                builder
                    .terminator(csv::Terminator::Any(b'\n'))
                    .quote_style(csv::QuoteStyle::Always);
            }
        }

        builder
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Excel => "excel",
            Dialect::ExcelTab => "excel_tab",
            Dialect::Unix => "unix",
        }
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "excel" => Ok(Dialect::Excel),
            "excel_tab" => Ok(Dialect::ExcelTab),
            "unix" => Ok(Dialect::Unix),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
