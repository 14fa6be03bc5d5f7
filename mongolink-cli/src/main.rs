use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mongolink_core::document::parse_document;
use mongolink_core::{
    Client, ClientOptions, CreateCollectionOptions, Document, MemoryDriver, ReadMode, ReadPreference,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "mongolink")]
#[command(about = "mongolink CLI - database-level operations against a JSON-backed server")]
#[command(version)]
struct Cli {
    /// Server state file (created if missing)
    #[arg(long, global = true, default_value = "mongolink.json")]
    state: PathBuf,
    /// Database name
    #[arg(long, global = true, default_value = "test")]
    db: String,
    /// Client options file (JSON)
    #[arg(long, global = true)]
    options: Option<PathBuf>,
    /// Read mode for collection reads (overrides the options file)
    #[arg(long, global = true, value_parser = parse_read_mode)]
    read_mode: Option<ReadMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an arbitrary command document, e.g. '{"ping": 1}'
    Command {
        /// Command as JSON
        json: String,
    },
    /// Create a collection
    CreateCollection {
        name: String,
        /// Fixed-size collection
        #[arg(long)]
        capped: bool,
        /// Maximum size in bytes (capped only)
        #[arg(long)]
        size: Option<u64>,
        /// Maximum number of documents (capped only)
        #[arg(long)]
        max: Option<u64>,
        /// Validator query as JSON
        #[arg(long)]
        validator: Option<String>,
    },
    /// Drop the database
    Drop,
    /// Check whether a collection exists
    HasCollection { name: String },
    /// List collections in the database
    ListCollections {
        /// Filter as JSON
        #[arg(long)]
        filter: Option<String>,
        /// Print names only
        #[arg(long)]
        name_only: bool,
    },
    /// Print database statistics
    Stats,
    /// Insert one document into a collection
    Insert {
        collection: String,
        /// Document as JSON
        json: String,
    },
    /// Count documents in a collection
    Count {
        collection: String,
        /// Filter as JSON
        #[arg(long)]
        filter: Option<String>,
    },
    /// List non-empty databases
    Databases,
}

fn parse_read_mode(s: &str) -> std::result::Result<ReadMode, String> {
    ReadMode::parse(s).ok_or_else(|| {
        format!(
            "unknown read mode '{}' (primary, primaryPreferred, secondary, secondaryPreferred, nearest)",
            s
        )
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let driver = Arc::new(
        MemoryDriver::load(&cli.state)
            .with_context(|| format!("Failed to load state: {}", cli.state.display()))?,
    );
    let options = match &cli.options {
        Some(path) => load_options(path)?,
        None => ClientOptions::default(),
    };
    let mut client = Client::with_options(driver.clone(), options).context("Invalid client options")?;
    if let Some(mode) = cli.read_mode {
        client.set_read_preference(ReadPreference::new(mode));
    }

    run(&client, &cli.db, cli.command)?;

    driver
        .save(&cli.state)
        .with_context(|| format!("Failed to save state: {}", cli.state.display()))?;
    debug!(state = %cli.state.display(), "state saved");
    Ok(())
}

fn load_options(path: &Path) -> Result<ClientOptions> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read options: {}", path.display()))?;
    ClientOptions::from_json_str(&content)
        .with_context(|| format!("Invalid options in: {}", path.display()))
}

fn parse_json(what: &str, json: &str) -> Result<Document> {
    parse_document(json).with_context(|| format!("Invalid {} JSON: {}", what, json))
}

fn print_json(value: &Value) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn run(client: &Client, db_name: &str, command: Commands) -> Result<()> {
    let db = client.database(db_name);

    match command {
        Commands::Command { json } => {
            let command = parse_json("command", &json)?;
            let reply = db.run_command(&command)?;
            print_json(&Value::Object(reply))?;
        }
        Commands::CreateCollection {
            name,
            capped,
            size,
            max,
            validator,
        } => {
            let options = CreateCollectionOptions {
                capped: capped.then_some(true),
                size,
                max,
                validator: validator
                    .map(|v| parse_json("validator", &v))
                    .transpose()?,
                ..Default::default()
            };
            let collection = db
                .create_collection(&name, &options)
                .with_context(|| format!("Failed to create collection '{}'", name))?;
            println!("Created collection '{}'", collection.namespace());
        }
        Commands::Drop => {
            db.drop()
                .with_context(|| format!("Failed to drop database '{}'", db_name))?;
            println!("Dropped database '{}'", db_name);
        }
        Commands::HasCollection { name } => {
            println!("{}", db.has_collection(&name)?);
        }
        Commands::ListCollections { filter, name_only } => {
            let filter = filter.map(|f| parse_json("filter", &f)).transpose()?;
            if name_only {
                for name in db.list_collection_names(filter)? {
                    println!("{}", name);
                }
            } else {
                for descriptor in db.list_collections(filter)? {
                    print_json(&Value::Object(descriptor?))?;
                }
            }
        }
        Commands::Stats => {
            let stats = db.stats()?;
            print_json(&Value::Object(stats))?;
        }
        Commands::Insert { collection, json } => {
            let document = parse_json("document", &json)?;
            let id = db
                .collection(&collection)
                .insert_one(document)
                .with_context(|| format!("Failed to insert into '{}'", collection))?;
            println!("Inserted {} into '{}.{}'", id, db_name, collection);
        }
        Commands::Count { collection, filter } => {
            let filter = filter.map(|f| parse_json("filter", &f)).transpose()?;
            let n = db
                .collection(&collection)
                .count_documents(filter)
                .with_context(|| format!("Failed to count '{}'", collection))?;
            println!("{}", n);
        }
        Commands::Databases => {
            for name in client.list_database_names()? {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
