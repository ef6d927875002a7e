use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use confman::SectionKind;

#[derive(Parser, Debug)]
#[command(name = "confman", version)]
#[command(about = "Read and edit XML application configuration documents", long_about = None)]
pub struct Cli {
    /// Configuration document, created on first save when missing.
    pub file: PathBuf,

    /// Options file. Defaults to `confman.toml` next to the document.
    #[arg(long)]
    pub options: Option<PathBuf>,

    /// Save after every change instead of once at the end.
    #[arg(long)]
    pub auto_save: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the document
    Show,
    /// Print the document as JSON
    Export,
    /// Print an application setting
    Get { key: String },
    /// Set an application setting
    Set { key: String, value: String },
    /// Remove an application setting
    Remove { key: String },
    /// Add or replace a connection string
    ConnSet {
        name: String,
        connection_string: String,
        /// Provider invariant name, e.g. `Npgsql`.
        #[arg(long)]
        provider: Option<String>,
    },
    /// Print a connection string and its provider
    ConnGet { name: String },
    /// Set a value in a section, creating the section and its groups
    SectionSet {
        /// Section path, `group/.../section`.
        path: String,
        key: String,
        value: String,
        #[arg(long, value_enum, default_value_t = KindArg::NameValue)]
        kind: KindArg,
        /// Value type tag for dictionary sections, e.g. `System.Int32`.
        #[arg(long)]
        type_tag: Option<String>,
    },
    /// Print the entries of a section
    SectionShow { path: String },
    /// Remove a section
    SectionRemove { path: String },
    /// Add a section with opaque content
    CustomAdd {
        path: String,
        type_name: String,
        raw: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    SingleTag,
    NameValue,
    Dictionary,
}

impl From<KindArg> for SectionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::SingleTag => SectionKind::SingleTag,
            KindArg::NameValue => SectionKind::NameValue,
            KindArg::Dictionary => SectionKind::Dictionary,
        }
    }
}

impl Command {
    /// Whether the command changes the document.
    pub fn mutates(&self) -> bool {
        !matches!(
            self,
            Command::Show
                | Command::Export
                | Command::Get { .. }
                | Command::ConnGet { .. }
                | Command::SectionShow { .. }
        )
    }
}
