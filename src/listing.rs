use std::fmt;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

// Log file names look like `cfpb_xxxxxx.xxxxxxx.202001011200-1300-0.gz`:
// two word tokens, then year/month/day/from-hour/from-minute, the to-hour and
// to-minute of the covered window, and a rotation counter. Only the calendar
// date matters for selection. Matching is anchored at the start of the name
// only; text after the `.gz` does not disqualify it.
static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\w+\.\w+\.(?P<date>\d{8})\d{4}-\d{4}-\d+\.gz").expect("filename pattern compiles")
});

#[derive(Error, Debug)]
pub enum ListingError {
    #[error("unrecognized log filename: {0}")]
    UnrecognizedFilename(String),
    #[error("invalid date in log filename {filename}: {source}")]
    InvalidDate {
        filename: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("malformed directory listing: {0}")]
    Xml(#[from] quick_xml::DeError),
}

/// One remote log file, dated by the timestamp embedded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub filename: String,
    pub date: NaiveDate,
}

impl LogFile {
    pub fn new(filename: String) -> Result<Self, ListingError> {
        let caps = FILENAME_RE
            .captures(&filename)
            .ok_or_else(|| ListingError::UnrecognizedFilename(filename.clone()))?;

        let date = NaiveDate::parse_from_str(&caps["date"], "%Y%m%d").map_err(|source| {
            ListingError::InvalidDate {
                filename: filename.clone(),
                source,
            }
        })?;

        Ok(Self { filename, date })
    }
}

// <?xml version="1.0" encoding="UTF-8"?>
// <stat directory="/123456/example.com">
//   <file type="file" name="cfpb_xxxxxx.xxxxxxx.202001011200-1300-0.gz"
//         size="1234567" md5="..." mtime="1577880000"/>
//   ...
// </stat>
//
// Only the name attribute is consumed; size, md5 and mtime are ignored.
#[derive(Debug, Deserialize)]
struct Stat {
    #[serde(rename = "file", default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    #[serde(rename = "@name")]
    name: String,
}

/// The parsed `dir` response for one NetStorage directory, in listing order.
#[derive(Debug)]
pub struct DirectoryListing {
    logs: Vec<LogFile>,
}

impl DirectoryListing {
    /// Parses the raw stat XML. Fails on undecodable XML and on the first
    /// entry whose name does not follow the log naming scheme.
    pub fn parse(xml: &str) -> Result<Self, ListingError> {
        let stat: Stat = quick_xml::de::from_str(xml)?;
        let logs = stat
            .files
            .into_iter()
            .map(|entry| LogFile::new(entry.name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { logs })
    }

    pub fn logs(&self) -> &[LogFile] {
        &self.logs
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Returns the filenames dated within `range`, in listing order.
    pub fn select(&self, range: &DateRange) -> Vec<&str> {
        self.logs
            .iter()
            .filter(|log| range.contains(log.date))
            .map(|log| log.filename.as_str())
            .collect()
    }
}

/// Inclusive calendar-date range; a missing `to` collapses to the single
/// day `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to.unwrap_or(self.from)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            Some(to) if to != self.from => write!(f, "{}..{}", self.from, to),
            _ => write!(f, "{}", self.from),
        }
    }
}
