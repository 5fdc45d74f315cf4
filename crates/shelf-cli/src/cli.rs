use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "shelf", about = "Shelf store maintenance", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Shop configuration file (TOML). Only its `[store]` table is used.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the database, overriding the configuration.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the database and its top-level namespaces
    Init,
    /// Write a snapshot of the whole store to a file
    Backup(BackupArgs),
    /// Replace the store contents with a snapshot
    Restore(RestoreArgs),
    /// Check a snapshot file without applying it
    Verify(VerifyArgs),
    /// Print the namespace tree
    Tree(TreeArgs),
}

#[derive(Args)]
pub struct BackupArgs {
    pub output: PathBuf,
}

#[derive(Args)]
pub struct RestoreArgs {
    pub input: PathBuf,
    /// Required: every current entry is discarded
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub input: PathBuf,
}

#[derive(Args)]
pub struct TreeArgs {
    /// Only show this namespace, e.g. `products/Cards`
    pub prefix: Option<String>,
    /// Print entry values (lossy UTF-8, truncated)
    #[arg(long)]
    pub values: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "shelf",
            "tree",
            "products/Cards",
            "--data-dir",
            "/tmp/shop",
            "--format",
            "json",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/shop")));
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Tree(args) => {
                assert_eq!(args.prefix.as_deref(), Some("products/Cards"));
                assert!(!args.values);
            }
            _ => panic!("expected tree"),
        }
    }

    #[test]
    fn restore_needs_input() {
        assert!(Cli::try_parse_from(["shelf", "restore"]).is_err());
    }
}
