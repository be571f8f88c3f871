use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "docvault",
    about = "Inspect and edit docvault JSON documents, snapshots, and editing locks",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store root; overrides `store.root` from the config file
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

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
    /// Print a document, recovering from snapshots if needed
    Show(DocArgs),
    /// Replace a document with a JSON value
    Set(SetArgs),
    /// Assign a JSON value at a JSON pointer inside a document
    Edit(EditArgs),
    /// List a document's snapshots, newest first
    Snapshots(DocArgs),
    /// Replace a document with one of its snapshots
    Restore(RestoreArgs),
    /// Delete snapshots beyond each tier's cap
    Prune(DocArgs),
    /// Mark a document as being edited
    Lock(HolderArgs),
    /// Show who is editing a document
    LockStatus(DocArgs),
    /// Clear your editing mark on a document
    Unlock(HolderArgs),
    /// List every live editing mark
    Locks,
}

#[derive(Args)]
pub struct DocArgs {
    pub document: String,
}

#[derive(Args)]
pub struct CommitArgs {
    /// Snapshot only into these tiers (repeatable)
    #[arg(long = "tier")]
    pub tiers: Vec<String>,
    /// Event name sent to change subscribers
    #[arg(long, default_value = "updated")]
    pub event: String,
}

#[derive(Args)]
pub struct SetArgs {
    pub document: String,
    pub value: String,
    #[command(flatten)]
    pub commit: CommitArgs,
}

#[derive(Args)]
pub struct EditArgs {
    pub document: String,
    /// RFC 6901 pointer, e.g. `/cells/0/label`; `-` appends to an array
    pub pointer: String,
    pub value: String,
    #[command(flatten)]
    pub commit: CommitArgs,
}

#[derive(Args)]
pub struct RestoreArgs {
    pub document: String,
    pub slot: String,
}

#[derive(Args)]
pub struct HolderArgs {
    pub document: String,
    pub holder: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_show() {
        let cli = Cli::try_parse_from(["docvault", "show", "state.json"]).unwrap();
        assert!(matches!(cli.command, Command::Show(DocArgs { ref document }) if document == "state.json"));
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "docvault", "snapshots", "grid.json", "--root", "/srv/data", "--format", "json", "-v",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/srv/data")));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.verbose);
    }

    #[test]
    fn parse_edit_with_tiers() {
        let cli = Cli::try_parse_from([
            "docvault", "edit", "grid.json", "/cells/0", "{\"x\":1}", "--tier", "recent", "--tier",
            "session", "--event", "grid-updated",
        ])
        .unwrap();
        match cli.command {
            Command::Edit(args) => {
                assert_eq!(args.pointer, "/cells/0");
                assert_eq!(args.commit.tiers, vec!["recent", "session"]);
                assert_eq!(args.commit.event, "grid-updated");
            }
            _ => panic!("expected edit"),
        }
    }

    #[test]
    fn parse_set_defaults() {
        let cli = Cli::try_parse_from(["docvault", "set", "a.json", "[]"]).unwrap();
        match cli.command {
            Command::Set(args) => {
                assert!(args.commit.tiers.is_empty());
                assert_eq!(args.commit.event, "updated");
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn parse_lock_commands() {
        assert!(Cli::try_parse_from(["docvault", "lock", "doc1", "alice"]).is_ok());
        assert!(Cli::try_parse_from(["docvault", "lock-status", "doc1"]).is_ok());
        assert!(Cli::try_parse_from(["docvault", "unlock", "doc1", "alice"]).is_ok());
        assert!(Cli::try_parse_from(["docvault", "locks"]).is_ok());
        assert!(Cli::try_parse_from(["docvault", "lock", "doc1"]).is_err());
    }

    #[test]
    fn parse_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["docvault", "show", "a.json", "--format", "yaml"]).is_err());
    }
}
