use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use jobworker::api::{self, ApiState};
use jobworker::auth::TokenStore;
use jobworker::client::{ClientError, JobClient, DEFAULT_BASE_URL};
use jobworker::config::{
    ManagerConfig, OutputPolicy, ServiceConfig, TlsConfig, DEFAULT_LISTEN_ADDR,
};
use jobworker::jobs::JobManager;
use jobworker::shutdown::install_shutdown_handler;
use jobworker::tls::TlsIdentity;

#[derive(Parser, Debug)]
#[command(name = "jobworker")]
#[command(version)]
#[command(about = "Run, stop and inspect Linux processes over HTTPS")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the job API server
    Server(ServerArgs),

    /// Job management commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    listen: SocketAddr,

    /// Path to server certificate chain (PEM format)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Path to server private key (PEM format)
    #[arg(long)]
    key: Option<PathBuf>,

    /// Serve plain HTTP when the certificate or key is missing.
    /// Useful for development. NOT recommended for production.
    #[arg(long)]
    allow_insecure: bool,

    /// JSON token table: [{"token": "...", "user_id": "...", "role": "user|admin"}].
    /// Built-in development tokens are used when omitted.
    #[arg(long)]
    tokens: Option<PathBuf>,

    /// Whether output of running jobs may be read
    #[arg(long, default_value = "partial")]
    output_policy: OutputPolicyArg,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputPolicyArg {
    /// Return output captured so far, even while the job runs
    Partial,
    /// Only return output once the job has finished
    RequireCompletion,
}

impl From<OutputPolicyArg> for OutputPolicy {
    fn from(arg: OutputPolicyArg) -> Self {
        match arg {
            OutputPolicyArg::Partial => OutputPolicy::Partial,
            OutputPolicyArg::RequireCompletion => OutputPolicy::RequireCompletion,
        }
    }
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server address
    #[arg(long, short = 'a', default_value = DEFAULT_BASE_URL)]
    addr: String,

    /// Bearer token identifying the caller
    #[arg(long, short = 't', env = "JOBWORKER_TOKEN", hide_env_values = true)]
    token: String,

    /// Path to CA certificate (PEM format) used to verify the server
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Job Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Start a new job (e.g. `start /bin/echo hello world`)
    Start {
        /// Path to the program to execute
        program: String,

        /// Arguments passed to the program verbatim
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Kill a running job
    Stop {
        /// The job ID (UUID)
        job_id: String,
    },
    /// Get status of a job
    Status {
        /// The job ID (UUID)
        job_id: String,
    },
    /// Get captured stdout and stderr of a job
    Output {
        /// The job ID (UUID)
        job_id: String,
    },
    /// List jobs visible to the caller
    List,
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig {
        listen_addr: args.listen,
        tls: TlsConfig {
            cert_path: args.cert,
            key_path: args.key,
            allow_insecure: args.allow_insecure,
        },
        tokens_path: args.tokens,
        manager: ManagerConfig::default().with_output_policy(args.output_policy.into()),
    };

    // Validate and load TLS identity
    let tls_identity = if config.tls.is_complete() {
        match TlsIdentity::load(&config.tls).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                if config.tls.allow_insecure {
                    tracing::warn!(
                        error = %e,
                        "TLS certificate loading failed, running in insecure mode"
                    );
                    None
                } else {
                    return Err(format!("TLS certificate loading failed: {}", e).into());
                }
            }
        }
    } else if config.tls.allow_insecure {
        tracing::warn!("TLS certificate paths incomplete, running in insecure mode");
        None
    } else {
        return Err("TLS requires --cert and --key (or --allow-insecure)".into());
    };

    let tokens = match &config.tokens_path {
        Some(path) => TokenStore::load(path).await?,
        None => {
            tracing::warn!("No --tokens file given, using built-in development tokens");
            TokenStore::development()
        }
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        tls_enabled = tls_identity.is_some(),
        tokens = tokens.len(),
        output_policy = ?config.manager.output_policy,
        "Starting jobworker"
    );

    let manager = Arc::new(JobManager::new(config.manager.clone()));
    let app = api::router(ApiState::new(manager.clone(), tokens));
    let shutdown = install_shutdown_handler();

    let listener = TcpListener::bind(config.listen_addr).await?;
    api::serve(listener, app, tls_identity, shutdown).await?;

    manager.stop_all().await;
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_job_command(
    client: &JobClient,
    command: JobCommands,
    output_format: &OutputFormat,
) -> Result<(), ClientError> {
    match command {
        JobCommands::Start { program, args } => {
            let response = client.start(&program, &args).await?;
            match output_format {
                OutputFormat::Json => emit_json(&response),
                OutputFormat::Table => println!("Job started with ID {}", response.id),
            }
        }
        JobCommands::Stop { job_id } => {
            let response = client.stop(&job_id).await?;
            match output_format {
                OutputFormat::Json => emit_json(&response),
                OutputFormat::Table => println!("Job stopped for ID {}", response.id),
            }
        }
        JobCommands::Status { job_id } => {
            let response = client.status(&job_id).await?;
            match output_format {
                OutputFormat::Json => emit_json(&response),
                OutputFormat::Table => {
                    println!("Job ID:    {}", response.id);
                    println!("Status:    {}", response.status);
                    if let Some(exit_code) = response.exit_code {
                        println!("Exit Code: {}", exit_code);
                    }
                    if let Some(error) = &response.error {
                        println!("Error:     {}", error);
                    }
                }
            }
        }
        JobCommands::Output { job_id } => {
            let response = client.output(&job_id).await?;
            match output_format {
                OutputFormat::Json => emit_json(&response),
                OutputFormat::Table => {
                    println!("Job output for ID {}", response.id);
                    println!("stdout:");
                    print!("{}", response.stdout);
                    println!("stderr:");
                    print!("{}", response.stderr);
                }
            }
        }
        JobCommands::List => {
            let response = client.list().await?;
            match output_format {
                OutputFormat::Json => emit_json(&response),
                OutputFormat::Table => {
                    if response.jobs.is_empty() {
                        println!("No jobs found.");
                        return Ok(());
                    }
                    println!("{:<38} {:<10} {:<10} COMMAND", "JOB ID", "OWNER", "STATUS");
                    println!("{}", "-".repeat(78));
                    for job in &response.jobs {
                        let mut command = job.program.clone();
                        for arg in &job.args {
                            command.push(' ');
                            command.push_str(arg);
                        }
                        // Truncate command if too long
                        if command.chars().count() > 30 {
                            command = format!("{}...", command.chars().take(27).collect::<String>());
                        }
                        println!(
                            "{:<38} {:<10} {:<10} {}",
                            job.id,
                            job.owner,
                            job.status.to_string(),
                            command
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

fn emit_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: failed to encode response: {}", e);
            std::process::exit(1);
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Job { client, command } => {
            let job_client =
                JobClient::with_ca_file(&client.addr, &client.token, client.ca_cert.as_deref())
                    .await?;

            if let Err(e) = handle_job_command(&job_client, command, &client.output).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
