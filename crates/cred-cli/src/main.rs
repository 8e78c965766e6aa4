use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cred_config::secrets::resolve_secrets_for_scope;
use cred_config::{ConfigScope, LoadedConfig, SyncSettings, UnusedKeyPolicy};
use cred_db::PgStore;
use cred_remote::{
    CachedCredential, CredentialProvider, HttpNetworkClient, HttpVerificationClient,
    OAuthClientCredentials, StaticCredential,
};
use cred_sync::{run_exclusive, Collection, PullReconciler, PushReconciler, SyncError, SyncReport};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "credsync")]
#[command(about = "Credentialing sync CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> site...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run one reconciliation pass
    Sync {
        #[command(subcommand)]
        cmd: SyncCmd,
    },

    /// Inspect recorded sync runs
    Runs {
        #[command(subcommand)]
        cmd: RunsCmd,
    },

    /// Audit log utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses while any sync pass is RUNNING unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating under a pass that may still be writing.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SyncCmd {
    /// Push local providers, licenses and contract to the network
    Push {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Append the outcome to this JSONL audit log
        #[arg(long = "audit-log")]
        audit_log: Option<String>,
    },

    /// Mirror one verification collection into the local store
    Pull {
        /// providers | licenses | board-certificates
        #[arg(long)]
        collection: String,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Append the outcome to this JSONL audit log
        #[arg(long = "audit-log")]
        audit_log: Option<String>,
    },
}

#[derive(Subcommand)]
enum RunsCmd {
    /// Print the most recent run row for a system
    Latest {
        /// push | pull-providers | pull-licenses | pull-board-certificates
        #[arg(long)]
        system: String,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of an audit log
    Verify {
        #[arg(required = true)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = cred_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = cred_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_sync_runs_table={}",
                        s.ok, s.has_sync_runs_table
                    );
                }
                DbCmd::Migrate { yes } => {
                    let n = cred_db::count_running_sync_runs(&pool).await?;
                    if n > 0 && !yes {
                        anyhow::bail!(
                            "REFUSING MIGRATE: detected {} sync run(s) in RUNNING. Re-run with: `credsync db migrate --yes`",
                            n
                        );
                    }

                    cred_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let loaded = load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Sync { cmd } => match cmd {
            SyncCmd::Push {
                config_paths,
                audit_log,
            } => {
                let loaded = load_config(&config_paths)?;
                let settings = scoped_settings(&loaded, ConfigScope::Push)?;
                let push = settings.push()?;
                let secrets = resolve_secrets_for_scope(&settings, ConfigScope::Push)?;
                let api_key = secrets
                    .push_api_key
                    .context("push api key was not resolved")?;

                let credentials: Arc<dyn CredentialProvider> =
                    Arc::new(StaticCredential::new(api_key));
                let client = HttpNetworkClient::new(push.base_url.clone(), credentials);

                let store = PgStore::new(cred_db::connect_from_env().await?);
                let reconciler = PushReconciler::new(&client, &store, push);

                info!(config_hash = %loaded.config_hash, "starting push pass");
                let outcome = run_exclusive(
                    &store,
                    cred_sync::push::SYSTEM,
                    settings.lease.ttl_seconds,
                    reconciler.run(),
                )
                .await;

                finish_pass(
                    cred_sync::push::SYSTEM,
                    &loaded.config_hash,
                    audit_log.as_deref(),
                    outcome,
                )?;
            }

            SyncCmd::Pull {
                collection,
                config_paths,
                audit_log,
            } => {
                let collection = Collection::parse(&collection).with_context(|| {
                    format!(
                        "unknown collection '{collection}' (expected providers | licenses | board-certificates)"
                    )
                })?;

                let loaded = load_config(&config_paths)?;
                let settings = scoped_settings(&loaded, ConfigScope::Pull)?;
                let pull = settings.pull()?;
                let secrets = resolve_secrets_for_scope(&settings, ConfigScope::Pull)?;
                let client_id = secrets
                    .pull_client_id
                    .context("pull client id was not resolved")?;
                let client_secret = secrets
                    .pull_client_secret
                    .context("pull client secret was not resolved")?;

                let credentials: Arc<dyn CredentialProvider> =
                    Arc::new(CachedCredential::new(OAuthClientCredentials::new(
                        pull.token_url.clone(),
                        client_id,
                        client_secret,
                    )));
                let client = HttpVerificationClient::new(pull.base_url.clone(), credentials)
                    .context("build verification client")?;

                let store = PgStore::new(cred_db::connect_from_env().await?);
                let reconciler = PullReconciler::new(&client, &store, pull);

                info!(
                    collection = %collection,
                    config_hash = %loaded.config_hash,
                    "starting pull pass"
                );
                let outcome = run_exclusive(
                    &store,
                    collection.system(),
                    settings.lease.ttl_seconds,
                    reconciler.run(collection),
                )
                .await;

                finish_pass(
                    collection.system(),
                    &loaded.config_hash,
                    audit_log.as_deref(),
                    outcome,
                )?;
            }
        },

        Commands::Runs { cmd } => match cmd {
            RunsCmd::Latest { system } => {
                let store = PgStore::new(cred_db::connect_from_env().await?);
                let row = cred_db::Store::latest_sync_run(&store, &system).await?;
                match row {
                    None => println!("run_id= system={} status=NONE", system),
                    Some(r) => {
                        println!("run_id={}", r.run_id);
                        println!("system={}", r.system);
                        println!("status={}", r.status.as_str());
                        println!("started_at_utc={}", r.started_at_utc.to_rfc3339());
                        println!(
                            "finished_at_utc={}",
                            r.finished_at_utc
                                .map(|d| d.to_rfc3339())
                                .unwrap_or_default()
                        );
                        if let Some(e) = r.error {
                            println!("error={}", e);
                        }
                        if let Some(report) = r.report {
                            println!("{}", serde_json::to_string_pretty(&report)?);
                        }
                    }
                }
            }
        },

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => match cred_audit::verify_hash_chain(&path)? {
                cred_audit::VerifyResult::Valid { lines } => {
                    println!("audit_valid=true lines={}", lines);
                }
                cred_audit::VerifyResult::Broken { line, reason } => {
                    anyhow::bail!("audit chain broken at line {}: {}", line, reason);
                }
            },
        },
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    cred_config::load_layered_yaml(&path_refs)
}

/// Typed settings for one pass. Keys the pass never reads are logged, not fatal.
fn scoped_settings(loaded: &LoadedConfig, scope: ConfigScope) -> Result<SyncSettings> {
    let unused = cred_config::report_unused_keys(scope, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    for pointer in &unused.unused_leaf_pointers {
        warn!(scope = scope.as_str(), pointer = %pointer, "config key is not used by this pass");
    }
    loaded.sync_settings()
}

/// Print the report, append the audit record, and turn a failed pass into a
/// non-zero exit.
fn finish_pass(
    system: &str,
    config_hash: &str,
    audit_log: Option<&str>,
    outcome: Result<(Uuid, SyncReport), SyncError>,
) -> Result<()> {
    let (run_id, record_outcome, payload) = match &outcome {
        Ok((run_id, report)) => {
            println!("{}", serde_json::to_string_pretty(report)?);
            info!(%run_id, clean = report.is_clean(), "pass finished");
            (
                Some(*run_id),
                cred_audit::RunOutcome::Succeeded,
                serde_json::to_value(report)?,
            )
        }
        Err(SyncError::AlreadyRunning { .. }) => (
            None,
            cred_audit::RunOutcome::Skipped,
            json!({ "kind": "already_running" }),
        ),
        Err(e) => (
            None,
            cred_audit::RunOutcome::Failed,
            json!({ "kind": e.kind(), "error": e.to_string() }),
        ),
    };

    if let Some(path) = audit_log {
        let mut writer = cred_audit::AuditWriter::open(path, true)?;
        let rec = writer.append(run_id, system, record_outcome, Some(config_hash), payload)?;
        println!("audit_written=true path={}", path);
        if let Some(h) = rec.hash_self {
            println!("hash_self={}", h);
        }
    }

    match outcome {
        Ok(_) => Ok(()),
        Err(e) => Err(anyhow::Error::new(e).context(format!("sync {system} failed"))),
    }
}
