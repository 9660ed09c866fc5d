//! `eddyd`: the Eddy replica agent and command-line client.
//!
//! # Usage
//!
//! ```text
//! eddyd put /tempZone/home/rods/a.txt ./a.txt -R resc0 -k   # create and register a checksum
//! eddyd get /tempZone/home/rods/a.txt -o ./copy.txt
//! eddyd ls /tempZone/home/rods/ -l
//! eddyd checksum /tempZone/home/rods/a.txt --verify -a
//! eddyd repl /tempZone/home/rods/a.txt -R resc1
//! eddyd agent                                               # JSON lines on stdin/stdout
//! eddyd recover                                             # release locks left by dead agents
//! ```

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use eddy_catalog::{AccessControl, Catalog};
use eddy_checksum::{ChecksumRequest, ChecksumResponse};
use eddy_engine::{
    Agent, CloseRequest, Coordinator, OpenRequest, ReplicateOutcome, ReplicateRequest, Session,
    recover_orphaned_locks,
};
use eddy_storage::{FileStorage, MemoryStorage, PhysicalStorage, ResourceTopology};
use eddy_types::{Principal, ReplicaNumber};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "eddyd", version, about = "Eddy replica lifecycle agent")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// User to act as (defaults to `[access] user`).
    #[arg(short, long, global = true, env = "EDDY_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file as a data object.
    Put {
        /// Logical path of the data object.
        path: String,
        /// Local file to upload.
        file: PathBuf,
        /// Resource to create the replica on.
        #[arg(short = 'R', long)]
        resource: Option<String>,
        /// Register a checksum of the uploaded content.
        #[arg(short = 'k', long)]
        checksum: bool,
    },

    /// Download a replica.
    Get {
        path: String,
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short = 'n', long)]
        replica: Option<u32>,
        #[arg(short = 'R', long)]
        resource: Option<String>,
    },

    /// List data objects under a prefix.
    Ls {
        #[arg(default_value = "/")]
        prefix: String,
        /// Show every replica with its status, size and checksum.
        #[arg(short, long)]
        long: bool,
    },

    /// Look up, register or verify replica checksums.
    Checksum {
        path: String,
        /// Recompute even when a checksum is registered.
        #[arg(short, long)]
        force: bool,
        /// Verify instead of registering.
        #[arg(short = 'K', long)]
        verify: bool,
        /// Operate on every good replica.
        #[arg(short, long)]
        all: bool,
        /// With --verify: compare catalog facts only.
        #[arg(long)]
        no_compute: bool,
        #[arg(short = 'n', long)]
        replica: Option<u32>,
        #[arg(short = 'R', long)]
        resource: Option<String>,
        /// Administrative override.
        #[arg(short = 'M', long)]
        admin: bool,
    },

    /// Replicate a data object onto another resource.
    Repl {
        path: String,
        /// Destination resource.
        #[arg(short = 'R', long)]
        resource: Option<String>,
        /// Source replica number.
        #[arg(short = 'n', long)]
        source_replica: Option<u32>,
        /// Source resource.
        #[arg(short = 'S', long)]
        source_resource: Option<String>,
        /// Register the destination checksum.
        #[arg(short = 'k', long)]
        reg_checksum: bool,
        /// Verify the destination against the source checksum.
        #[arg(short = 'K', long)]
        verify_checksum: bool,
        /// Leave the destination checksum empty.
        #[arg(long)]
        no_compute: bool,
        /// Succeed when the destination already holds a good replica.
        #[arg(short, long)]
        backup: bool,
        /// Update every stale replica.
        #[arg(short, long)]
        all: bool,
        #[arg(short = 'M', long)]
        admin: bool,
    },

    /// Serve one JSON-lines session on stdin/stdout.
    Agent,

    /// Release write locks whose sessions no longer exist.
    Recover,
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    let user = cli.user.clone().unwrap_or_else(|| config.access.user.clone());
    let coordinator = open_coordinator(&config)?;
    let principal = Principal::new(user);

    match cli.command {
        Commands::Put {
            path,
            file,
            resource,
            checksum,
        } => cmd_put(coordinator, principal, &path, &file, resource, checksum).await,
        Commands::Get {
            path,
            output,
            replica,
            resource,
        } => cmd_get(coordinator, principal, &path, output, replica, resource).await,
        Commands::Ls { prefix, long } => cmd_ls(&coordinator, &prefix, long),
        Commands::Checksum {
            path,
            force,
            verify,
            all,
            no_compute,
            replica,
            resource,
            admin,
        } => {
            let request = ChecksumRequest {
                force,
                verify,
                all,
                no_compute,
                replica_number: replica.map(ReplicaNumber::new),
                resource,
                admin,
                ..ChecksumRequest::new(&path)
            };
            cmd_checksum(coordinator, principal, &request).await
        }
        Commands::Repl {
            path,
            resource,
            source_replica,
            source_resource,
            reg_checksum,
            verify_checksum,
            no_compute,
            backup,
            all,
            admin,
        } => {
            let request = ReplicateRequest {
                destination: resource,
                source_replica: source_replica.map(ReplicaNumber::new),
                source_resource,
                reg_checksum,
                verify_checksum,
                no_compute,
                backup,
                all,
                admin,
                ..ReplicateRequest::new(&path)
            };
            cmd_repl(coordinator, principal, &request).await
        }
        Commands::Agent => cmd_agent(coordinator, principal).await,
        Commands::Recover => cmd_recover(&coordinator),
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
/// Logs go to stderr so the agent's stdout carries only responses.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Open the catalog and storage named by the config and wire a coordinator.
fn open_coordinator(config: &CliConfig) -> Result<Arc<Coordinator>> {
    let catalog = if config.catalog.temporary {
        info!("using temporary catalog");
        Catalog::open_temporary().context("failed to open temporary catalog")?
    } else {
        let path = config.catalog_path();
        std::fs::create_dir_all(&config.catalog.data_dir)
            .context("failed to create data directory")?;
        Catalog::open(&path)
            .with_context(|| format!("failed to open catalog at {}", path.display()))?
    };

    let storage: Arc<dyn PhysicalStorage> = match config.storage.backend.as_str() {
        "memory" => {
            info!("using in-memory storage");
            Arc::new(MemoryStorage::new())
        }
        "file" => {
            let vault = config.vault_dir();
            info!(path = %vault.display(), "using file storage");
            Arc::new(FileStorage::new(&vault).context("failed to initialize vault")?)
        }
        other => bail!("unknown storage backend {other:?}"),
    };

    let topology: Arc<dyn ResourceTopology> = Arc::new(config.topology());
    let access: Arc<dyn AccessControl> = Arc::new(config.access_control());
    let engine = config.engine_config();
    info!(
        default_resource = %engine.default_resource,
        scheme = %engine.checksum_scheme.prefix(),
        resources = config.resource_specs().len(),
        "engine configuration"
    );

    Ok(Arc::new(Coordinator::new(
        engine,
        Arc::new(catalog),
        storage,
        topology,
        access,
    )))
}

// -----------------------------------------------------------------------
// Commands
// -----------------------------------------------------------------------

async fn cmd_put(
    coordinator: Arc<Coordinator>,
    principal: Principal,
    path: &str,
    file: &Path,
    resource: Option<String>,
    checksum: bool,
) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let mut session = Session::new(coordinator, principal);

    let mut open = OpenRequest::create(path).truncating();
    if let Some(resource) = &resource {
        open = open.on_resource(resource);
    }
    let handle = session.open(&open).await?;
    let replica = session.handle(handle)?.replica;
    let written = session.write(handle, Bytes::from(data)).await?;

    let mut close = CloseRequest::new(handle);
    if checksum {
        close = close.computing_checksum();
    }
    let status = session.close(&close).await?;
    println!("{path}: replica {replica} {status} ({written} bytes)");
    Ok(())
}

async fn cmd_get(
    coordinator: Arc<Coordinator>,
    principal: Principal,
    path: &str,
    output: Option<PathBuf>,
    replica: Option<u32>,
    resource: Option<String>,
) -> Result<()> {
    let mut session = Session::new(coordinator, principal);
    let mut open = OpenRequest::read(path);
    if let Some(number) = replica {
        open = open.replica(ReplicaNumber::new(number));
    }
    if let Some(resource) = &resource {
        open = open.on_resource(resource);
    }
    let handle = session.open(&open).await?;
    let data = session.read(handle).await?;
    session.close(&CloseRequest::new(handle)).await?;

    match output {
        Some(file) => tokio::fs::write(&file, &data)
            .await
            .with_context(|| format!("failed to write {}", file.display()))?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

fn cmd_ls(coordinator: &Coordinator, prefix: &str, long: bool) -> Result<()> {
    let catalog = coordinator.catalog();
    for path in catalog.list(prefix)? {
        println!("{path}");
        if !long {
            continue;
        }
        let Some(object) = catalog.get(&path)? else {
            continue;
        };
        for replica in &object.replicas {
            println!(
                "  {} {} {} {} {}",
                replica.replica_number,
                replica.resource_hierarchy,
                replica.status,
                replica.size,
                replica.checksum
            );
        }
        if let Some(lock) = &object.lock {
            println!("  locked: target {} by {} session(s)", lock.target, lock.holders.len());
        }
    }
    Ok(())
}

async fn cmd_checksum(
    coordinator: Arc<Coordinator>,
    principal: Principal,
    request: &ChecksumRequest,
) -> Result<()> {
    let mut session = Session::new(coordinator, principal);
    match session.checksum(request).await? {
        ChecksumResponse::Checksum { checksum, notes } => {
            println!("{}    {checksum}", request.path);
            for finding in &notes.findings {
                eprintln!("{:?} {}: {}", finding.severity, finding.code, finding.message);
            }
            Ok(())
        }
        ChecksumResponse::Findings(result) => {
            for finding in &result.findings {
                println!("{:?} {}: {}", finding.severity, finding.code, finding.message);
            }
            bail!("verification of {} found problems", request.path)
        }
    }
}

async fn cmd_repl(
    coordinator: Arc<Coordinator>,
    principal: Principal,
    request: &ReplicateRequest,
) -> Result<()> {
    let mut session = Session::new(coordinator, principal);
    match session.replicate(request).await? {
        ReplicateOutcome::Replicated {
            source,
            destinations,
        } => {
            for (replica, status) in destinations {
                println!("{}: replica {source} -> {replica} {status}", request.path);
            }
        }
        ReplicateOutcome::AlreadyGood { replica } => {
            println!("{}: replica {replica} already good", request.path);
        }
    }
    Ok(())
}

/// Serve one JSON-lines session; EOF ends it and recovers open handles.
async fn cmd_agent(coordinator: Arc<Coordinator>, principal: Principal) -> Result<()> {
    // A fresh process has no live sessions; any lock left in the catalog
    // belongs to an agent that died.
    let recovered = recover_orphaned_locks(coordinator.catalog(), |_| false)?;
    if !recovered.is_empty() {
        warn!(count = recovered.len(), "recovered orphaned locks");
    }

    let mut agent = Agent::new(coordinator, principal.clone());
    info!(user = %principal.user, session = %agent.session().id(), "agent session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = agent.handle_line(&line).await;
        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    let leaked = agent.finish();
    info!(recovered = leaked, "agent session ended");
    Ok(())
}

fn cmd_recover(coordinator: &Coordinator) -> Result<()> {
    let recovered = recover_orphaned_locks(coordinator.catalog(), |_| false)?;
    for path in &recovered {
        println!("{path}");
    }
    info!(count = recovered.len(), "orphaned lock sweep finished");
    Ok(())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
