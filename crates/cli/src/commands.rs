use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Create the merge target if it does not exist yet
    Init,

    /// Append the rows of a CSV export to the source log
    Ingest {
        #[arg(long, help = "CSV file with messageID, deviceId, rpm, angle, timestamp")]
        csv: PathBuf,
    },

    /// Salt, deduplicate and merge pending source records into the target
    Run {
        #[arg(
            long,
            help = "Keep polling for new records instead of stopping once drained"
        )]
        continuous: bool,

        #[arg(
            long,
            help = "If specified, writes the JSON run summary to this file instead of stdout"
        )]
        output: Option<PathBuf>,
    },

    Progress {
        #[arg(
            long,
            help = "If set, prints the progress information as JSON instead of a table"
        )]
        json: bool,
    },

    /// Print the salted and unsalted SHA-256 of a key
    Hash {
        #[arg(long, help = "Device key to hash")]
        key: i64,

        #[arg(long, help = "Salt to append; falls back to SALTMERGE_SALT")]
        salt: Option<String>,
    },

    /// Show source records through the redaction view
    View {
        #[arg(long = "group", help = "Group the caller belongs to (repeatable)")]
        groups: Vec<String>,

        #[arg(long, default_value = "anonymous", help = "Caller user name")]
        user: String,

        #[arg(long, default_value_t = 20, help = "Maximum number of records")]
        limit: usize,

        #[arg(long, help = "Print rows as JSON")]
        json: bool,
    },

    /// List the rows currently stored in the merge target
    Target {
        #[arg(long, help = "Print rows as JSON")]
        json: bool,
    },
}
