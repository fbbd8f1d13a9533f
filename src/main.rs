use anyhow::Result;
use clap::Parser;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use inbox_organizer::auth;
use inbox_organizer::categorizer::Categorizer;
use inbox_organizer::cli::{self, Cli, Commands};
use inbox_organizer::config::Config;
use inbox_organizer::error::OrganizerError;
use inbox_organizer::executor::UnsubscribeExecutor;
use inbox_organizer::mailbox::GmailMailbox;
use inbox_organizer::{pipeline, provider};

#[tokio::main]
async fn main() {
    // Per-message failures are contained inside the pipeline; reaching this
    // error path means setup itself failed.
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: inbox-organizer --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs (better performance, FIPS support)
    // On Windows, use ring (better compatibility, no NASM/CMake required)
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("inbox_organizer=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("inbox_organizer=info,warn,error"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with the Gmail API...");

            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            if force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Test the connection - scope must be pinned to avoid a second
            // OAuth flow
            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope("https://www.googleapis.com/auth/gmail.modify")
                .doit()
                .await
                .map_err(OrganizerError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );

            Ok(())
        }

        Commands::Run {
            max_messages,
            dry_run,
            no_unsubscribe,
        } => {
            let mut config = Config::load(&cli.config).await?;
            if dry_run {
                config.execution.dry_run = true;
            }
            if no_unsubscribe {
                config.unsubscribe.enabled = false;
            }

            if config.execution.dry_run {
                println!("Running in DRY RUN mode - no changes will be made");
            }

            // Provider is selected once here; the pipeline only sees the trait
            let provider = provider::from_config(&config.provider, &config.categories)?;
            let categorizer = Categorizer::new(
                provider,
                Duration::from_millis(config.pacing.base_backoff_ms),
                Duration::from_millis(config.pacing.message_delay_ms),
            );
            let executor = UnsubscribeExecutor::new(&config.unsubscribe, config.execution.dry_run)?;

            let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
            let mailbox = GmailMailbox::new(hub);

            let summary =
                pipeline::run(&mailbox, &categorizer, &executor, &config, max_messages).await?;

            print!("\n{}", summary.render());
            if !summary.reconciles() {
                tracing::warn!("summary does not reconcile with the fetch count");
            }

            Ok(())
        }

        Commands::CleanLabels { dry_run, force } => {
            let config = Config::load(&cli.config).await?;

            let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
            let mailbox = GmailMailbox::new(hub);

            if !dry_run && !force {
                print!(
                    "This will permanently delete custom labels{}. Proceed? [y/N]: ",
                    if config.labels.preserve.is_empty() {
                        String::new()
                    } else {
                        format!(" (preserving: {})", config.labels.preserve.join(", "))
                    }
                );
                std::io::Write::flush(&mut std::io::stdout())?;

                let mut input = String::new();
                std::io::stdin().read_line(&mut input)?;
                if input.trim().to_lowercase() != "y" {
                    println!("Aborted.");
                    return Ok(());
                }
            }

            let report = cli::clean_labels(&mailbox, &config.labels.preserve, dry_run).await?;

            if dry_run {
                println!(
                    "Would delete {} labels ({} preserved)",
                    report.deleted, report.preserved
                );
            } else {
                println!(
                    "Deleted {} labels ({} preserved, {} failed)",
                    report.deleted, report.preserved, report.failed
                );
            }

            Ok(())
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                return Err(OrganizerError::Config(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(&output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - provider.backend: 'openai' or 'gemini'");
            println!("  - categories.keep: categories that are labeled and archived");
            println!("  - unsubscribe.enabled: attempt automatic unsubscription");
            println!("  - labels.preserve: labels no operation may remove");

            Ok(())
        }
    }
}
