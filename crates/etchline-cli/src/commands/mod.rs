//! CLI command implementations

use crate::progress::{BarSink, JsonLinesSink};
use etchline_core::{
    BlockDevice, JobReport, JobRunner, Procedure, ProgressAggregator, Source,
};

/// Conditionally println based on quiet mode
macro_rules! println_if {
    ($quiet:expr) => {
        if !$quiet {
            println!();
        }
    };
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            println!($($arg)*);
        }
    };
}

pub mod config;
pub mod verify;
pub mod write;

/// Job id used for jobs started from the command line
const CLI_JOB_ID: u64 = 1;

/// Run `procedure` with progress rendered as a bar or as JSON lines
fn run_job<O, D>(
    runner: &JobRunner,
    procedure: Procedure,
    start_step: usize,
    open_source: O,
    device: &mut D,
    json: bool,
    quiet: bool,
) -> etchline_core::Result<JobReport>
where
    O: FnMut() -> etchline_core::Result<Source>,
    D: BlockDevice + ?Sized,
{
    if json {
        let sink = JsonLinesSink::new(std::io::stdout());
        let mut aggregator = ProgressAggregator::new(CLI_JOB_ID, procedure, sink);
        runner.run(&mut aggregator, start_step, open_source, device)
    } else {
        let sink = BarSink::new(&procedure, quiet);
        let mut aggregator = ProgressAggregator::new(CLI_JOB_ID, procedure, sink);
        runner.run(&mut aggregator, start_step, open_source, device)
    }
}
