//! Fetches CDN log files from an Akamai NetStorage directory, keeping the
//! ones whose filename timestamp falls within a requested date range.

pub mod download;
pub mod listing;
pub mod netstorage;
