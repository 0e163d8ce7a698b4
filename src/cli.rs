use chrono::NaiveDate;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "temp-sentinel",
    version,
    about = "Sample a 1-Wire temperature probe into Timestream and alert over SNS"
)]
pub struct SentinelArgs {
    /// Stop after this many iterations instead of running until signalled.
    #[arg(long)]
    pub iterations: Option<u64>,
    /// Skip the database/table existence checks at startup.
    #[arg(long, default_value_t = false)]
    pub skip_setup: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "unload-csv",
    version,
    about = "Unload the last day of temperature data from Timestream to S3 as CSV"
)]
pub struct UnloadArgs {
    /// Date used for the destination folder (YYYY-MM-DD); defaults to today (UTC).
    #[arg(long)]
    pub date: Option<NaiveDate>,
    /// Log the UNLOAD statement without running it.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}
