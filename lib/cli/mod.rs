use crate::build_info;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Synchronize bug watches with external bug trackers",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT
)]
pub struct Cli {
    #[clap(short, long = "tracker", value_name = "NAME")]
    /// Only synchronize these trackers (repeatable). Defaults to all trackers
    pub trackers: Vec<String>,

    #[clap(short, long)]
    /// Max remote bugs queried per tracker; 0 means unlimited. Overrides SYNC_BATCH_SIZE
    pub batch_size: Option<i64>,

    #[clap(short, long)]
    /// Number of tracker jobs to run concurrently. Overrides SYNC_JOBS
    pub jobs: Option<usize>,

    #[clap(long, requires = "trackers")]
    /// Forget previous checks of the selected trackers and resynchronize them from scratch
    pub reset: bool,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
