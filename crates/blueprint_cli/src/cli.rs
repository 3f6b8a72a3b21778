//! Command-line argument model.
//!
//! Purely declarative; parsing has no side effects.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// Operator tool for blueprint course associations.
#[derive(Parser, Debug)]
#[command(name = "blueprint", version, about, long_about = None)]
pub struct Cli {
    /// Path to `blueprint.toml`. Without it, defaults plus
    /// `BLUEPRINT_*` environment variables are used.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List courses that can be associated to a template.
    Candidates {
        template_id: Uuid,
        /// Case-insensitive filter on name, course code or SIS id.
        #[arg(short, long)]
        query: Option<String>,
    },
    /// List courses currently associated to a template.
    Associations { template_id: Uuid },
    /// Add and remove associations in one commit.
    Save {
        template_id: Uuid,
        /// Course to associate; repeatable.
        #[arg(long = "add", value_name = "COURSE_ID")]
        add: Vec<Uuid>,
        /// Course to unassociate; repeatable.
        #[arg(long = "remove", value_name = "COURSE_ID")]
        remove: Vec<Uuid>,
    },
    /// Designate a course as a blueprint master.
    SetMaster { course_id: Uuid },
}
