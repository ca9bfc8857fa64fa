use std::env;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;
use dotenv::dotenv;

use logpull::download::{download_logs, select_logs};
use logpull::listing::DateRange;
use logpull::netstorage::NetstorageClient;

#[derive(Parser)]
#[command(version, about = "Download date-ranged CDN log files from Akamai NetStorage", long_about = None)]
struct Args {
    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase debug level (use -d for info, -dd for debug)")]
    debug: u8,

    /// First day of logs to download, e.g. 2020-01-02
    #[arg(long, value_parser = parse_date)]
    from_date: NaiveDate,

    /// Last day of logs to download, inclusive. Defaults to --from-date
    #[arg(long, value_parser = parse_date)]
    to_date: Option<NaiveDate>,

    /// NetStorage HTTP API hostname
    #[arg(long, env = "NETSTORAGE_HOSTNAME")]
    netstorage_hostname: String,

    /// NetStorage HTTP API key
    #[arg(long, env = "NETSTORAGE_KEY", hide_env_values = true)]
    netstorage_key: String,

    /// Name of the NetStorage HTTP API key
    #[arg(long, env = "NETSTORAGE_KEYNAME")]
    netstorage_keyname: String,

    /// Log file directory on NetStorage, e.g. /123456/example.com
    #[arg(long)]
    netstorage_directory: String,

    /// Directory downloaded log files are written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// List the matching log files without downloading them
    #[arg(long)]
    dry_run: bool,
}

fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let args = Args::parse();

    match args.debug {
        0 => {}
        1 => env::set_var("RUST_LOG", "info"),
        _ => env::set_var("RUST_LOG", "debug"),
    }
    env_logger::init();

    if let Err(e) = run(&args).await {
        log::error!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> Result<(), anyhow::Error> {
    let range = DateRange::new(args.from_date, args.to_date);
    let client = NetstorageClient::new(
        &args.netstorage_hostname,
        &args.netstorage_keyname,
        &args.netstorage_key,
    )
    .with_output_dir(&args.output_dir);

    if args.dry_run {
        let names = select_logs(&client, &args.netstorage_directory, &range).await?;
        for name in &names {
            println!("{name}");
        }
        return Ok(());
    }

    let names = download_logs(&client, &args.netstorage_directory, &range).await?;
    println!("Downloaded {} log files dated within {}", names.len(), range);

    Ok(())
}
