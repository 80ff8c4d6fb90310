//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Batch retrieval and reconciliation of client document archives.
///
/// Archiver works through a backlog of clients: for each one it drives the
/// document platform's export actions, watches the download staging area,
/// rebuilds the client's folder taxonomy, and records every outcome in a
/// resumable ledger.
#[derive(Parser, Debug)]
#[command(name = "archiver")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Archive root directory; also the browser's download staging directory
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Path of the ledger database file
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add clients to the pending backlog from a delimited file
    ///
    /// Each line: client name, client number, optional email. A header line
    /// starting with "Client Name" is skipped. Clients already in the ledger
    /// are left untouched.
    Import {
        /// Backlog file to read
        file: PathBuf,
    },

    /// Process every pending client in the backlog
    Run {
        /// Documents per bulk export page (1-200)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=200))]
        page_size: Option<u32>,

        /// Seconds to wait for each download artifact (1-3600)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
        timeout: Option<u64>,

        /// Consecutive client failures that abort the batch (1-1000)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=1000))]
        max_consecutive_errors: Option<u32>,

        /// Show a progress spinner (off by default; the operator prompts
        /// share the terminal)
        #[arg(long)]
        progress: bool,
    },

    /// Show backlog counts and recent document failures
    Status {
        /// How many recent failures to list (1-100)
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(i64).range(1..=100))]
        failures: i64,

        /// Emit machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_run_defaults_parse_successfully() {
        let args = Args::try_parse_from(["archiver", "run"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.root.is_none());
        match args.command {
            Command::Run {
                page_size,
                timeout,
                max_consecutive_errors,
                progress,
            } => {
                assert!(page_size.is_none());
                assert!(timeout.is_none());
                assert!(max_consecutive_errors.is_none());
                assert!(!progress);
            }
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_import_requires_file() {
        let result = Args::try_parse_from(["archiver", "import"]);
        assert!(result.is_err());

        let args = Args::try_parse_from(["archiver", "import", "clients.csv"]).unwrap();
        match args.command {
            Command::Import { file } => assert_eq!(file, PathBuf::from("clients.csv")),
            other => panic!("expected import command, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["archiver", "run", "--root", "/srv/archive", "-v"]).unwrap();
        assert_eq!(args.root, Some(PathBuf::from("/srv/archive")));
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_cli_page_size_range_enforced() {
        let result = Args::try_parse_from(["archiver", "run", "--page-size", "0"]);
        assert!(result.is_err());

        let args = Args::try_parse_from(["archiver", "run", "--page-size", "25"]).unwrap();
        match args.command {
            Command::Run { page_size, .. } => assert_eq!(page_size, Some(25)),
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_status_failures_default() {
        let args = Args::try_parse_from(["archiver", "status"]).unwrap();
        match args.command {
            Command::Status { failures, json } => {
                assert_eq!(failures, 10);
                assert!(!json);
            }
            other => panic!("expected status command, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["archiver", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_unknown_subcommand_rejected() {
        let result = Args::try_parse_from(["archiver", "download"]);
        assert!(result.is_err());
    }
}
