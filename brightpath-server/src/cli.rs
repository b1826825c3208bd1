use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5150 or config.listen_port)

The `hash-password` command prints a bcrypt hash suitable for the
`password_hash` field of a user entry in config.yaml.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "brightpath-server",
    version,
    about = "Brightpath server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a bcrypt hash for use in config.yaml
    HashPassword {
        /// Plaintext password to hash
        password: String,
    },
}
