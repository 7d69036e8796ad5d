use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use kpx_core::enums::Role;

/// Top-level CLI parser for the `kutplix` binary.
#[derive(Debug, Parser)]
#[command(name = "kutplix", version, about = "Kutplix - content calendar approvals")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file layered over the default sources
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API and the outbox dispatcher.
    Serve,
    /// Manage client companies.
    Company {
        #[command(subcommand)]
        action: CompanyCommands,
    },
    /// Manage user accounts.
    User {
        #[command(subcommand)]
        action: UserCommands,
    },
    /// Inspect or drain the event outbox.
    Outbox {
        #[command(subcommand)]
        action: OutboxCommands,
    },
    /// Show recent audit trail entries.
    Audit {
        /// Only entries for this entity id
        #[arg(long)]
        entity_id: Option<String>,
        /// Only entries by this user
        #[arg(long)]
        actor: Option<String>,
        #[arg(short, long)]
        limit: Option<u32>,
    },
}

#[derive(Debug, Subcommand)]
pub enum CompanyCommands {
    Create {
        #[arg(long)]
        name: String,
    },
    List,
}

#[derive(Debug, Subcommand)]
pub enum UserCommands {
    Create {
        #[arg(long)]
        email: String,
        #[arg(long, value_enum)]
        role: RoleArg,
        /// Company id; required for clients
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    Activate { id: String },
    Deactivate { id: String },
}

#[derive(Debug, Subcommand)]
pub enum OutboxCommands {
    /// Deliver pending events once and exit.
    Flush,
    /// List events queued for a grid.
    Show { grid_id: String },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum RoleArg {
    Admin,
    Designer,
    Client,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Self::Admin,
            RoleArg::Designer => Self::Designer,
            RoleArg::Client => Self::Client,
        }
    }
}
