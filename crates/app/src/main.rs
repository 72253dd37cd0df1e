use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use contract_analyzer_core::{
    answer_question, build_session, conformity_check, detect_anomalies, discover_pdf_files,
    executive_summary, extract_contract_data, extract_events, extract_uploads, list_collections,
    load_collection, read_uploads, risk_analysis, save_collection, ChunkingConfig, Embedder,
    FirebaseStorageClient, FirestoreClient, GeminiClient, HashingEmbedder, IdentityClient,
    OcrOptions, SessionState,
};
use contract_analyzer_core::{login_user, register_user};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "contract-analyzer", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Google API key for model and identity calls.
    #[arg(long, env = "GOOGLE_API_KEY")]
    api_key: String,

    /// Firebase project that hosts the metadata store.
    #[arg(long, env = "FIREBASE_PROJECT_ID", default_value = "contratiapy")]
    project_id: String,

    /// Storage bucket; defaults to "<project_id>.appspot.com".
    #[arg(long, env = "FIREBASE_STORAGE_BUCKET")]
    bucket: Option<String>,

    /// OAuth bearer token for Firestore, Storage, and admin lookups.
    #[arg(long, env = "GOOGLE_OAUTH_TOKEN")]
    oauth_token: Option<String>,

    /// Embed with the offline hashing embedder instead of the remote model.
    #[arg(long, default_value_t = false)]
    local_embeddings: bool,
}

/// Where the working session comes from: a fresh folder upload or a saved
/// collection.
#[derive(Args)]
struct SessionArgs {
    /// Folder containing the PDFs to process (recursive).
    #[arg(long)]
    folder: Option<PathBuf>,

    /// Name of a saved collection to load.
    #[arg(long)]
    collection: Option<String>,

    /// User id that owns the collection.
    #[arg(long, env = "CONTRACT_USER_ID")]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Register a new account.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Resolve an email to its user id.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Process a folder of PDFs and optionally save the result as a collection.
    Ingest {
        #[arg(long)]
        folder: PathBuf,
        /// Save the processed batch under this collection name.
        #[arg(long)]
        save_as: Option<String>,
        /// User id that will own the saved collection.
        #[arg(long, env = "CONTRACT_USER_ID")]
        user: Option<String>,
    },
    /// List the collections saved by a user.
    Collections {
        #[arg(long, env = "CONTRACT_USER_ID")]
        user: String,
    },
    /// Ask a question answered from the retrieved document context.
    Ask {
        #[arg(long)]
        question: String,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Extract structured contract fields from every document.
    Extract {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Executive summary of one contract.
    Summary {
        #[arg(long)]
        file: String,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Risk-clause analysis of one contract.
    Risks {
        #[arg(long)]
        file: String,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Extract deadlines and dated events from every document.
    Deadlines {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Conformity report comparing a document against a reference.
    Conformity {
        #[arg(long)]
        reference: String,
        #[arg(long)]
        analyzed: String,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Extract structured fields and flag anomalies across them.
    Anomalies {
        #[command(flatten)]
        session: SessionArgs,
    },
}

struct Services {
    gemini: GeminiClient,
    metadata: FirestoreClient,
    storage: FirebaseStorageClient,
    identity: IdentityClient,
    hashing: HashingEmbedder,
    local_embeddings: bool,
}

impl Services {
    fn embedder(&self) -> &dyn Embedder {
        if self.local_embeddings {
            &self.hashing
        } else {
            &self.gemini
        }
    }
}

async fn ingest_folder(folder: &Path, services: &Services) -> anyhow::Result<SessionState> {
    let files = discover_pdf_files(folder);
    if files.is_empty() {
        bail!("no pdf files found in {}", folder.display());
    }

    let uploads = read_uploads(&files).map_err(|error| anyhow!(error.to_string()))?;
    let report = extract_uploads(&uploads, &services.gemini, OcrOptions::default())
        .await
        .map_err(|error| anyhow!(error.to_string()))?;

    info!(
        batch_id = %report.batch_id,
        processed = report.processed.len(),
        skipped = report.skipped.len(),
        "extraction finished"
    );
    for skipped in &report.skipped {
        warn!(file = %skipped.name, reason = %skipped.reason, "skipped pdf");
    }
    for file in &report.processed {
        info!(
            file = %file.name,
            fragments = file.fragment_count,
            method = ?file.method,
            checksum = %file.checksum,
            "processed pdf"
        );
    }

    let session = build_session(&report, ChunkingConfig::default(), services.embedder())
        .await
        .map_err(|error| anyhow!(error.to_string()))?;

    Ok(session)
}

async fn open_session(args: &SessionArgs, services: &Services) -> anyhow::Result<SessionState> {
    match (&args.folder, &args.collection) {
        (Some(folder), None) => ingest_folder(folder, services).await,
        (None, Some(collection)) => {
            let user = args
                .user
                .as_deref()
                .context("--user is required when loading a collection")?;
            let session = load_collection(&services.metadata, &services.storage, user, collection)
                .await
                .map_err(|error| anyhow!(error.to_string()))?;
            info!(collection = %collection, files = session.file_names.len(), "collection loaded");
            Ok(session)
        }
        _ => bail!("pass exactly one of --folder or --collection"),
    }
}

fn print_failures(failures: &[contract_analyzer_core::ItemFailure]) {
    for failure in failures {
        warn!(file = %failure.source_file, reason = %failure.reason, "document dropped from batch");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let bucket = cli
        .bucket
        .clone()
        .unwrap_or_else(|| format!("{}.appspot.com", cli.project_id));

    let services = Services {
        gemini: GeminiClient::new(&cli.api_key),
        metadata: FirestoreClient::new(&cli.project_id, cli.oauth_token.clone()),
        storage: FirebaseStorageClient::new(bucket, cli.oauth_token.clone()),
        identity: IdentityClient::new(&cli.api_key, cli.oauth_token.clone()),
        hashing: HashingEmbedder::default(),
        local_embeddings: cli.local_embeddings,
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "contract-analyzer boot"
    );

    match cli.command {
        Command::Register { email, password } => {
            let user_id = register_user(&services.identity, &email, &password)
                .await
                .map_err(|error| anyhow!(error.to_string()))?;
            println!("registered: user_id={user_id}");
        }
        Command::Login { email, password } => {
            let user_id = login_user(&services.identity, &email, &password)
                .await
                .map_err(|error| anyhow!(error.to_string()))?;
            println!("logged in: user_id={user_id}");
        }
        Command::Ingest {
            folder,
            save_as,
            user,
        } => {
            let session = ingest_folder(&folder, &services).await?;
            println!(
                "{} fragments indexed from {} file(s)",
                session.index.len(),
                session.file_names.len()
            );

            if let Some(collection) = save_as {
                let user = user.context("--user is required to save a collection")?;
                let record =
                    save_collection(&services.metadata, &services.storage, &user, &collection, &session)
                        .await
                        .map_err(|error| anyhow!(error.to_string()))?;
                println!(
                    "collection '{}' saved at {} ({})",
                    record.name,
                    record.storage_path,
                    record.created_at.to_rfc3339()
                );
            }
        }
        Command::Collections { user } => {
            let names = list_collections(&services.metadata, &user)
                .await
                .map_err(|error| anyhow!(error.to_string()))?;
            if names.is_empty() {
                println!("no collections saved for this user");
            }
            for name in names {
                println!("{name}");
            }
        }
        Command::Ask { question, session } => {
            let session = open_session(&session, &services).await?;
            let answer = answer_question(&session, &question, &services.gemini, services.embedder())
                .await
                .map_err(|error| anyhow!(error.to_string()))?;

            println!("{}", answer.text);
            println!("---");
            for hit in answer.sources {
                println!(
                    "fonte: {} (página {}) score={:.4}",
                    hit.fragment.source, hit.fragment.page, hit.score
                );
            }
        }
        Command::Extract { session } => {
            let session = open_session(&session, &services).await?;
            let batch = extract_contract_data(&session, &services.gemini).await;
            print_failures(&batch.failures);
            println!("{}", serde_json::to_string_pretty(&batch.records)?);
        }
        Command::Summary { file, session } => {
            let session = open_session(&session, &services).await?;
            let summary = executive_summary(&session, &file, &services.gemini)
                .await
                .map_err(|error| anyhow!(error.to_string()))?;
            println!("{summary}");
        }
        Command::Risks { file, session } => {
            let session = open_session(&session, &services).await?;
            let report = risk_analysis(&session, &file, &services.gemini)
                .await
                .map_err(|error| anyhow!(error.to_string()))?;
            println!("{report}");
        }
        Command::Deadlines { session } => {
            let session = open_session(&session, &services).await?;
            let batch = extract_events(&session, &services.gemini).await;
            print_failures(&batch.failures);
            println!("{}", serde_json::to_string_pretty(&batch.events)?);
        }
        Command::Conformity {
            reference,
            analyzed,
            session,
        } => {
            let session = open_session(&session, &services).await?;
            let report = conformity_check(&session, &reference, &analyzed, &services.gemini)
                .await
                .map_err(|error| anyhow!(error.to_string()))?;
            println!("{report}");
        }
        Command::Anomalies { session } => {
            let session = open_session(&session, &services).await?;
            let batch = extract_contract_data(&session, &services.gemini).await;
            print_failures(&batch.failures);
            let anomalies = detect_anomalies(&batch.records, &services.gemini)
                .await
                .map_err(|error| anyhow!(error.to_string()))?;
            for anomaly in anomalies {
                println!("- {anomaly}");
            }
        }
    }

    Ok(())
}
