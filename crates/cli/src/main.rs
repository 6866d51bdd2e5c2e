use std::{
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};

mod catalog;
mod manifest;
mod serve;

use manifest::Manifest;

#[derive(Parser, Debug)]
#[clap(author, version, about = "JobPay - Job portal payment service CLI", long_about = None)]
struct Opts {
    /// Path to the jobpay.yaml manifest file (default: ./jobpay.yaml)
    #[arg(
        long = "manifest-path",
        short = 'm',
        global = true,
        default_value = "./jobpay.yaml"
    )]
    manifest_path: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Start the payment and wallet HTTP service
    Serve(serve::ServeCommand),
    /// Validate the manifest, credentials and database without serving
    Check,
    /// Catalog inspection commands
    Catalog {
        #[clap(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum CatalogCommand {
    /// Print the effective service catalog
    Services,
    /// Print the effective token-pack catalog
    Packs,
}

#[tokio::main]
async fn main() {
    let opts: Opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            process::exit(e.exit_code());
        }
    };

    tracing_subscriber::fmt::init();

    let manifest_dir = opts
        .manifest_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    load_env_file(&manifest_dir);

    let manifest = match Manifest::load(&opts.manifest_path) {
        Ok(manifest) => {
            eprintln!("✓ Loaded manifest from {}", opts.manifest_path.display());
            manifest
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    };

    if let Err(e) = handle_command(opts, &manifest).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Load environment variables from a .env file in the manifest directory.
fn load_env_file(manifest_dir: &Path) {
    let env_file_path = manifest_dir.join(".env");
    match dotenvy::from_path(&env_file_path) {
        Ok(_) => {
            eprintln!("✓ Loaded environment from {}", env_file_path.display());
        }
        Err(e) if e.not_found() => {
            // No .env file is fine.
        }
        Err(e) => {
            eprintln!(
                "Warning: Failed to load .env file at {}: {}",
                env_file_path.display(),
                e
            );
        }
    }
}

async fn handle_command(opts: Opts, manifest: &Manifest) -> anyhow::Result<()> {
    match opts.command {
        Command::Serve(cmd) => cmd.execute(manifest).await,
        Command::Check => check(manifest),
        Command::Catalog { command } => match command {
            CatalogCommand::Services => catalog::print_services(manifest),
            CatalogCommand::Packs => catalog::print_packs(manifest),
        },
    }
}

/// Dry-run of everything `serve` would construct: credentials resolve, the
/// database opens and migrates, the catalogs are non-empty.
fn check(manifest: &Manifest) -> anyhow::Result<()> {
    serve::build_facade(manifest)?;
    eprintln!("✓ Provider credentials resolved");

    jobpay_core::db::DbManager::new(&manifest.database.url)?;
    eprintln!("✓ Database ready at {}", manifest.database.url);

    let services = manifest.catalogs.effective_services();
    let packs = manifest.catalogs.effective_packs();
    eprintln!(
        "✓ Catalogs loaded ({} services, {} token packs)",
        services.len(),
        packs.len()
    );
    Ok(())
}
