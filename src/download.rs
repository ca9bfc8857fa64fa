use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};

use crate::listing::{DateRange, DirectoryListing};
use crate::netstorage::{StorageClient, StorageError};

const PB_TEMPLATE: &str =
    "{spinner:.blue} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} {wide_msg}";

/// Lists `directory` and returns the names of the log files dated within
/// `range`, in listing order.
pub async fn select_logs<C: StorageClient>(
    client: &C,
    directory: &str,
    range: &DateRange,
) -> Result<Vec<String>, anyhow::Error> {
    let raw = client
        .list_dir(directory)
        .await
        .with_context(|| format!("listing {directory}"))?;
    let listing = DirectoryListing::parse(&raw)
        .with_context(|| format!("parsing the listing of {directory}"))?;

    let names = listing.select(range);
    log::info!(
        "{} of {} log files dated within {}",
        names.len(),
        listing.len(),
        range
    );

    Ok(names.into_iter().map(str::to_owned).collect())
}

/// Downloads every log file dated within `range` and returns the fetched
/// names. Stops at the first failed fetch; later files stay unfetched.
pub async fn download_logs<C: StorageClient>(
    client: &C,
    directory: &str,
    range: &DateRange,
) -> Result<Vec<String>, anyhow::Error> {
    let names = select_logs(client, directory, range).await?;
    fetch_all(client, directory, &names).await?;
    Ok(names)
}

/// Fetches `filenames` from `directory` one at a time, in order, aborting
/// on the first failure.
pub async fn fetch_all<C: StorageClient>(
    client: &C,
    directory: &str,
    filenames: &[String],
) -> Result<(), StorageError> {
    let directory = normalize_directory(directory);
    let progress = progress_bar(filenames.len() as u64);

    for filename in filenames {
        progress.set_message(filename.clone());
        if let Err(e) = client.download(&format!("{directory}{filename}")).await {
            progress.abandon();
            return Err(e);
        }
        progress.inc(1);
    }
    progress.finish_with_message("done");

    Ok(())
}

// The storage directory may arrive with or without a trailing separator;
// remote file paths are composed against exactly one.
fn normalize_directory(directory: &str) -> String {
    format!("{}/", directory.trim_end_matches('/'))
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(PB_TEMPLATE) {
        bar.set_style(style.progress_chars("█▓▒░  "));
    }
    bar
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use reqwest::StatusCode;

    use super::*;

    const LISTING: &str = r#"<stat directory="/123456/example.com">
        <file type="file" name="foobar_123456.123456.202001021200-1300-0.gz" size="10"/>
        <file type="file" name="foobar_123456.123456.202001031200-1300-0.gz" size="11"/>
        <file type="file" name="foobar_123456.123456.202001041200-1300-0.gz" size="12"/>
    </stat>"#;

    #[derive(Default)]
    struct RecordingClient {
        listing: String,
        fail_on: Option<&'static str>,
        requested: Mutex<Vec<String>>,
    }

    impl RecordingClient {
        fn with_listing(listing: &str) -> Self {
            Self {
                listing: listing.to_string(),
                ..Default::default()
            }
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StorageClient for RecordingClient {
        async fn list_dir(&self, _directory: &str) -> Result<String, StorageError> {
            Ok(self.listing.clone())
        }

        async fn download(&self, path: &str) -> Result<u64, StorageError> {
            self.requested.lock().unwrap().push(path.to_string());
            if self.fail_on.is_some_and(|suffix| path.ends_with(suffix)) {
                return Err(StorageError::Status {
                    path: path.to_string(),
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                });
            }
            Ok(0)
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn normalize_directory_yields_exactly_one_separator() {
        assert_eq!(normalize_directory("/123/example.com"), "/123/example.com/");
        assert_eq!(normalize_directory("/123/example.com/"), "/123/example.com/");
        assert_eq!(normalize_directory("/123/example.com///"), "/123/example.com/");
    }

    #[tokio::test]
    async fn composed_paths_match_for_either_directory_spelling() {
        let names = vec!["a_1.b.202001021200-1300-0.gz".to_string()];

        let bare = RecordingClient::default();
        fetch_all(&bare, "/123/example.com", &names).await.unwrap();

        let slashed = RecordingClient::default();
        fetch_all(&slashed, "/123/example.com/", &names).await.unwrap();

        assert_eq!(bare.requested(), slashed.requested());
        assert_eq!(
            bare.requested(),
            vec!["/123/example.com/a_1.b.202001021200-1300-0.gz"]
        );
    }

    #[tokio::test]
    async fn fetch_all_requests_files_in_order() {
        let names: Vec<String> = ["one.gz", "two.gz", "three.gz"]
            .iter()
            .map(|n| n.to_string())
            .collect();
        let client = RecordingClient::default();

        fetch_all(&client, "/123456/example.com", &names).await.unwrap();

        assert_eq!(
            client.requested(),
            vec![
                "/123456/example.com/one.gz",
                "/123456/example.com/two.gz",
                "/123456/example.com/three.gz"
            ]
        );
    }

    #[tokio::test]
    async fn fetch_all_stops_at_the_first_failure() {
        let names: Vec<String> = ["one.gz", "two.gz", "three.gz"]
            .iter()
            .map(|n| n.to_string())
            .collect();
        let client = RecordingClient {
            fail_on: Some("two.gz"),
            ..Default::default()
        };

        let err = fetch_all(&client, "/123456/example.com", &names)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Status { .. }));
        // The second fetch failed, so the third is never requested.
        assert_eq!(
            client.requested(),
            vec![
                "/123456/example.com/one.gz",
                "/123456/example.com/two.gz"
            ]
        );
    }

    #[tokio::test]
    async fn download_logs_fetches_only_the_selected_range() {
        let client = RecordingClient::with_listing(LISTING);
        let range = DateRange::new(day(2020, 1, 2), None);

        let names = download_logs(&client, "/123456/example.com", &range)
            .await
            .unwrap();

        assert_eq!(names, vec!["foobar_123456.123456.202001021200-1300-0.gz"]);
        assert_eq!(
            client.requested(),
            vec!["/123456/example.com/foobar_123456.123456.202001021200-1300-0.gz"]
        );
    }

    #[tokio::test]
    async fn download_logs_with_no_matches_downloads_nothing() {
        let client = RecordingClient::with_listing(LISTING);
        let range = DateRange::new(day(2023, 5, 1), Some(day(2023, 5, 31)));

        let names = download_logs(&client, "/123456/example.com", &range)
            .await
            .unwrap();

        assert!(names.is_empty());
        assert!(client.requested().is_empty());
    }

    #[tokio::test]
    async fn a_bad_listing_entry_aborts_before_any_fetch() {
        let client = RecordingClient::with_listing(
            r#"<stat directory="/123456/example.com">
                 <file type="file" name="foobar_123456.123456.202001021200-1300-0.gz"/>
                 <file type="file" name="surprise.txt"/>
               </stat>"#,
        );
        let range = DateRange::new(day(2020, 1, 2), None);

        let err = download_logs(&client, "/123456/example.com", &range)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("parsing the listing"));
        assert!(client.requested().is_empty());
    }
}
