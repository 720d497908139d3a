//! cps - Command-line client for CPS document storages
//!
//! Runs one storage command per invocation and prints the reply.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use cps_client::{Client, ClientConfig, TracingSink};
use cps_protocol::{BackupType, DocumentFormat, ExactMatch, ListMode, RequestOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cps")]
#[command(about = "Command-line client for CPS document storages")]
#[command(version)]
struct Cli {
    /// Connection URL (tcp://host:port, http://host[:port][/path], unix:///path)
    #[arg(short, long, env = "CPS_URL")]
    url: Option<String>,

    /// Storage name
    #[arg(short, long, env = "CPS_STORAGE")]
    storage: Option<String>,

    /// User name
    #[arg(short = 'U', long, env = "CPS_USER")]
    user: Option<String>,

    /// Password
    #[arg(short = 'P', long, env = "CPS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// YAML configuration file
    #[arg(short, long, env = "CPS_CONFIG")]
    config: Option<PathBuf>,

    /// Application tag sent with every request
    #[arg(short, long, env = "CPS_APPLICATION")]
    application: Option<String>,

    /// Request identifier echoed by the server
    #[arg(long)]
    request_id: Option<String>,

    /// Server-side timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Log envelopes and raw traffic at TRACE level
    #[arg(long)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show storage status
    Status,

    /// Search documents
    Search {
        /// Query markup
        query: String,

        /// Number of documents to return
        #[arg(short, long)]
        docs: Option<u32>,

        /// Offset of the first returned document
        #[arg(short, long)]
        offset: Option<u32>,

        /// Listed path as PATH=MODE (yes, no, snippet, highlight)
        #[arg(short, long, value_parser = parse_list)]
        list: Vec<(String, ListMode)>,

        /// Ordering markup
        #[arg(long)]
        ordering: Vec<String>,

        /// Facet path
        #[arg(long)]
        facet: Vec<String>,

        /// Exact match mode (text, binary, all)
        #[arg(long)]
        exact_match: Option<ExactMatch>,

        /// Document format (tree, element, text)
        #[arg(short, long, default_value = "tree")]
        format: DocumentFormat,
    },

    /// Retrieve documents by id
    Retrieve {
        ids: Vec<String>,

        /// Document format (tree, element, text)
        #[arg(short, long, default_value = "tree")]
        format: DocumentFormat,
    },

    /// Retrieve selected paths of documents by id
    Lookup {
        ids: Vec<String>,

        /// Listed path as PATH=MODE
        #[arg(short, long, value_parser = parse_list)]
        list: Vec<(String, ListMode)>,

        /// Document format (tree, element, text)
        #[arg(short, long, default_value = "tree")]
        format: DocumentFormat,
    },

    /// Insert documents (markup, JSON, or @file)
    Insert { documents: Vec<String> },

    /// Replace documents (markup, JSON, or @file)
    Replace { documents: Vec<String> },

    /// Delete documents by id
    Delete { ids: Vec<String> },

    /// Delete every document matching a query
    SearchDelete { query: String },

    /// List indexed words matching a pattern
    ListWords { query: String },

    /// Suggest spelling alternatives
    Alternatives {
        query: String,

        #[arg(long)]
        cr: Option<f64>,

        #[arg(long)]
        idif: Option<f64>,

        #[arg(long)]
        h: Option<f64>,
    },

    /// List the first documents in storage order
    ListFirst {
        #[command(flatten)]
        window: Window,
    },

    /// List the last documents in storage order
    ListLast {
        #[command(flatten)]
        window: Window,
    },

    /// Retrieve the first documents in storage order
    RetrieveFirst {
        #[command(flatten)]
        window: Window,
    },

    /// Retrieve the last documents in storage order
    RetrieveLast {
        #[command(flatten)]
        window: Window,
    },

    /// List indexed paths
    ListPaths,

    /// List facet terms for paths
    ListFacets { paths: Vec<String> },

    /// Back up the storage to a .tar.gz archive
    Backup {
        file: String,

        /// Backup type (full, incremental)
        #[arg(short = 't', long = "type")]
        backup_type: Option<BackupType>,
    },

    /// Restore the storage from a .tar.gz archive
    Restore {
        file: String,

        /// Skip the sequence check
        #[arg(long)]
        no_sequence_check: bool,
    },

    /// Rebuild the storage index
    Reindex,

    /// Delete every document in the storage
    Clear,
}

/// Result window options shared by the ordered listing commands.
#[derive(clap::Args)]
struct Window {
    #[arg(short, long)]
    docs: Option<u32>,

    #[arg(short, long)]
    offset: Option<u32>,

    /// Document format (tree, element, text)
    #[arg(short, long, default_value = "tree")]
    format: DocumentFormat,
}

fn parse_list(arg: &str) -> Result<(String, ListMode), String> {
    let (path, mode) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected PATH=MODE, got '{arg}'"))?;
    let mode = mode.parse().map_err(|e| format!("{e}"))?;
    Ok((path.to_string(), mode))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; --trace needs the client's TRACE events.
    let default_filter = if cli.trace { "warn,cps_client=trace" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = cli.url {
        config.url = url;
    }
    if let Some(storage) = cli.storage {
        config.storage = storage;
    }
    if let Some(user) = cli.user {
        config.user = user;
    }
    if let Some(password) = cli.password {
        config.password = password;
    }
    if cli.application.is_some() {
        config.application = cli.application;
    }

    let mut connection = config.into_connection_config()?;
    if cli.trace {
        connection = connection.with_trace_sink(Arc::new(TracingSink));
    }

    let mut options = RequestOptions::new();
    if let Some(request_id) = cli.request_id {
        options = options.with_request_id(request_id);
    }
    if let Some(timeout) = cli.timeout {
        options = options.with_timeout(timeout);
    }

    let mut client = match Client::connect(connection) {
        Ok(client) => client.with_options(options),
        Err(e) => {
            eprintln!("{}: {}", "Connection failed".red(), e);
            std::process::exit(1);
        }
    };

    let result = commands::execute(&mut client, cli.command);
    client.close();

    match result {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}
