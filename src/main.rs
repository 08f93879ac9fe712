mod cli;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use cli::{Cli, Commands};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use viewer_host::builtin;
use viewer_host::catalog::CatalogSource;
use viewer_host::config::HostConfig;
use viewer_host::document::Document;
use viewer_host::features::{self, FeatureSet};
use viewer_host::host::{HostController, HostView, ShowRequest};
use viewer_host::loader::{DependencyLoader, HttpFetcher, OfflineFetcher, ResourceFetcher, ResourceLoader};
use viewer_host::registry::PluginRegistry;
use viewer_host::resolver::FileDescriptor;
use viewer_host::tracker::ResourceTracker;
use viewer_host::utils::paths::get_logs_dir;

/// Log to the daily rolling file. The guard must outlive the program.
fn init_file_logging(filter: tracing_subscriber::EnvFilter) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let logs_dir = match get_logs_dir() {
        Ok(dir) => dir,
        Err(_) => return None,
    };

    // Create logs directory if it doesn't exist
    if let Err(e) = fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Could not create logs directory: {}", e);
        return None;
    }

    // Set up file appender (rolling daily)
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "viewerctl.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI colors in log files
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    Some(guard)
}

fn init_logging(level: &str, to_file: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if to_file {
        return init_file_logging(filter);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    None
}

fn catalog_source(cli_catalog: Option<PathBuf>, config: &HostConfig) -> CatalogSource {
    match cli_catalog.or_else(|| config.catalog_path.clone()) {
        Some(path) => CatalogSource::File(path),
        None => CatalogSource::Builtin,
    }
}

fn feature_set(cli_features: Option<&str>, config: &HostConfig) -> Option<FeatureSet> {
    let mut features = config.feature_set_from_env();
    if let Some(extra) = cli_features {
        features
            .get_or_insert_with(FeatureSet::new)
            .extend(&FeatureSet::from_csv(extra));
    }
    features
}

fn build_registry(
    source: CatalogSource,
    features: Option<FeatureSet>,
    config: &HostConfig,
    offline: bool,
) -> Result<PluginRegistry> {
    let fetcher: Arc<dyn ResourceFetcher> = if offline {
        Arc::new(OfflineFetcher)
    } else {
        Arc::new(HttpFetcher::new(
            config.resources.base_url.as_deref(),
            config.resources.request_timeout(),
        )?)
    };

    let tracker = Arc::new(ResourceTracker::new(Arc::new(Document::new())));
    let resources =
        Arc::new(ResourceLoader::new(fetcher, tracker).with_poll_budget(config.resources.poll_budget()));

    Ok(PluginRegistry::new(
        source,
        features,
        DependencyLoader::new(builtin::module_table(), resources),
    ))
}

fn file_set(files: &[String]) -> Vec<FileDescriptor> {
    files.iter().map(FileDescriptor::file).collect()
}

async fn handle_list(
    source: CatalogSource,
    features: Option<FeatureSet>,
    config: &HostConfig,
    all: bool,
) -> Result<()> {
    let registry = build_registry(source, features, config, true)?;
    registry.initialize().await?;

    for descriptor in registry.descriptors()? {
        println!(
            "{:<16} {:<24} p{:<3} {}",
            descriptor.id,
            descriptor.display_label(),
            descriptor.priority,
            descriptor
                .supported_extensions
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(" ")
        );
    }

    if all {
        for excluded in registry.excluded() {
            println!("{:<16} (not registered: {})", excluded.id, excluded.reason);
        }
    }

    Ok(())
}

async fn handle_resolve(
    source: CatalogSource,
    features: Option<FeatureSet>,
    config: &HostConfig,
    files: &[String],
    preview: bool,
) -> Result<()> {
    let registry = build_registry(source, features, config, true)?;
    registry.initialize().await?;

    let compatible = registry.compatible_for_files(&file_set(files), preview)?;
    if compatible.is_empty() {
        println!("No compatible viewer");
        return Ok(());
    }

    for (rank, descriptor) in compatible.iter().enumerate() {
        println!(
            "{}. {} ({}, priority {})",
            rank + 1,
            descriptor.id,
            descriptor.display_label(),
            descriptor.priority
        );
    }
    Ok(())
}

struct ShowArgs {
    files: Vec<String>,
    preview: bool,
    viewer: Option<String>,
    offline: bool,
    asset_id: String,
    database_id: String,
}

async fn handle_show(
    source: CatalogSource,
    features: Option<FeatureSet>,
    config: &HostConfig,
    args: ShowArgs,
) -> Result<()> {
    let registry = build_registry(source, features, config, args.offline)?;
    let host = HostController::new(Arc::new(registry));

    let request = ShowRequest {
        asset_id: args.asset_id,
        database_id: args.database_id,
        files: file_set(&args.files),
        is_preview: args.preview,
        viewer: args.viewer,
        ..Default::default()
    };

    let outcome = host.show(&request).await;
    host.teardown();

    match outcome? {
        HostView::Empty => println!("No compatible viewer"),
        HostView::Failed {
            viewer_id,
            message,
            alternatives,
        } => {
            println!("{} failed: {}", viewer_id, message);
            if !alternatives.is_empty() {
                println!("Try instead: {}", alternatives.join(", "));
            }
        }
        HostView::Mounted {
            viewer_id,
            view,
            warnings,
            ..
        } => {
            println!("{}: {}", viewer_id, view.summary);
            for warning in warnings {
                println!("warning: {}", warning);
            }
        }
    }
    Ok(())
}

async fn handle_check(source: CatalogSource, features: Option<FeatureSet>) -> Result<()> {
    let catalog = source.read().await.context("Catalog is invalid")?;

    let table = builtin::module_table();
    let mut problems = 0;
    for descriptor in catalog.descriptors() {
        if !table.has_implementation(&descriptor.implementation_ref) {
            problems += 1;
            println!(
                "{}: unknown implementationRef '{}'",
                descriptor.id, descriptor.implementation_ref
            );
        }
        if let Some(reference) = &descriptor.dependency_ref
            && !table.has_dependency(reference)
        {
            problems += 1;
            println!("{}: unknown dependencyRef '{}'", descriptor.id, reference);
        }
        let missing = features::missing_flags(descriptor, features.as_ref());
        if !missing.is_empty() {
            println!("{}: hidden until {} enabled", descriptor.id, missing.join(", "));
        }
    }

    let referenced: HashSet<&str> = catalog
        .descriptors()
        .iter()
        .map(|d| d.implementation_ref.as_str())
        .collect();
    let unused: Vec<&str> = table
        .implementation_refs()
        .into_iter()
        .filter(|reference| !referenced.contains(reference))
        .collect();
    if !unused.is_empty() {
        println!("unused implementation modules: {}", unused.join(", "));
    }

    println!("{} viewers, {} problem(s)", catalog.len(), problems);
    if problems > 0 {
        return Err(anyhow!("Catalog references unknown modules"));
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = HostConfig::load()?;

    // Guard must be kept alive for the duration of the program
    let _log_guard = init_logging(&config.log_level, cli.log_file);

    let features = feature_set(cli.features.as_deref(), &config);

    match cli.command {
        Commands::List { all } => {
            handle_list(catalog_source(cli.catalog, &config), features, &config, all).await?;
        }
        Commands::Resolve { files, preview } => {
            handle_resolve(catalog_source(cli.catalog, &config), features, &config, &files, preview).await?;
        }
        Commands::Show {
            files,
            preview,
            viewer,
            offline,
            asset_id,
            database_id,
        } => {
            let args = ShowArgs {
                files,
                preview,
                viewer,
                offline,
                asset_id,
                database_id,
            };
            handle_show(catalog_source(cli.catalog, &config), features, &config, args).await?;
        }
        Commands::Check { path } => {
            let source = catalog_source(path.or(cli.catalog), &config);
            handle_check(source, features).await?;
        }
    }

    Ok(())
}
