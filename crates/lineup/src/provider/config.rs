//! Provider and export configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::ColumnDesc;

/// Configuration of a data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderOptions {
    /// Filter every ranking by the filters of all rankings.
    pub filter_globally: bool,

    /// Quiet period before a dirty ranking is re-sorted.
    pub reorder_delay: Duration,

    /// Upper bound of values returned by a mapping sample.
    pub max_mapping_sample: usize,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            filter_globally: false,
            reorder_delay: Duration::from_millis(100),
            max_mapping_sample: 500,
        }
    }
}

impl ProviderOptions {
    pub fn with_filter_globally(mut self, filter_globally: bool) -> Self {
        self.filter_globally = filter_globally;
        self
    }

    pub fn with_reorder_delay(mut self, delay: Duration) -> Self {
        self.reorder_delay = delay;
        self
    }

    pub fn with_max_mapping_sample(mut self, max: usize) -> Self {
        self.max_mapping_sample = max;
        self
    }
}

/// Decides which columns an export includes.
pub type ExportFilter = Arc<dyn Fn(&ColumnDesc) -> bool + Send + Sync>;

/// Options of [`DataProvider::export_table`](super::DataProvider::export_table).
#[derive(Clone)]
pub struct ExportOptions {
    /// Cell separator.
    pub separator: String,

    /// Line separator.
    pub newline: String,

    /// Emit a header line with the column labels.
    pub header: bool,

    /// Quote labels and non-number cells.
    pub quote: bool,

    pub quote_char: char,

    /// Columns to export; support columns are skipped by default.
    pub filter: ExportFilter,
}

impl fmt::Debug for ExportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportOptions")
            .field("separator", &self.separator)
            .field("newline", &self.newline)
            .field("header", &self.header)
            .field("quote", &self.quote)
            .field("quote_char", &self.quote_char)
            .finish_non_exhaustive()
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            separator: "\t".to_string(),
            newline: "\n".to_string(),
            header: true,
            quote: false,
            quote_char: '"',
            filter: Arc::new(|desc: &ColumnDesc| !desc.is_support()),
        }
    }
}

impl ExportOptions {
    /// Comma separated values with quoting.
    pub fn csv() -> Self {
        Self::default().with_separator(",").with_quote(true)
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_newline(mut self, newline: impl Into<String>) -> Self {
        self.newline = newline.into();
        self
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn with_quote(mut self, quote: bool) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_quote_char(mut self, quote_char: char) -> Self {
        self.quote_char = quote_char;
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ColumnDesc) -> bool + Send + Sync + 'static,
    {
        self.filter = Arc::new(filter);
        self
    }

    /// Wrap `text` in the quote character when quoting is enabled.
    pub(crate) fn quoted(&self, text: &str) -> String {
        if self.quote {
            format!("{q}{text}{q}", q = self.quote_char)
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_deserialize_partial() {
        let options: ProviderOptions = serde_json::from_str(r#"{"filterGlobally": true}"#).unwrap();
        assert!(options.filter_globally);
        assert_eq!(options.reorder_delay, Duration::from_millis(100));
        assert_eq!(options.max_mapping_sample, 500);
    }

    #[test]
    fn test_export_defaults() {
        let options = ExportOptions::default();
        assert_eq!(options.quoted("a"), "a");
        assert!(!(options.filter)(&ColumnDesc::new("rank")));
        assert!((options.filter)(&ColumnDesc::string("name")));
        assert_eq!(ExportOptions::csv().quoted("a"), "\"a\"");
    }
}
