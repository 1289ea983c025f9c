use clap::Parser;
use kabu_core::config::Settings;
use kabu_core::domain::catalog::InstrumentCatalog;
use kabu_core::viewport::{ChartViewport, HeadlessViewport, ViewportSync};
use kabu_core::AnalysisOrchestrator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod repl;

#[derive(Debug, Parser)]
#[command(name = "kabu", about = "Interactive stock analysis session")]
struct Args {
    /// JSON instrument list (`[{ticker, name, industry}]`). Overrides KABU_CATALOG_PATH.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Analysis backend base URL. Overrides KABU_BACKEND_URL.
    #[arg(long)]
    backend_url: Option<String>,

    #[arg(long)]
    recent_capacity: Option<usize>,

    #[arg(long)]
    history_capacity: Option<usize>,

    /// Directory exported documents are written to.
    #[arg(long, default_value = ".")]
    export_dir: PathBuf,

    /// Instrument to load before the prompt opens.
    #[arg(long)]
    ticker: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    apply_overrides(&mut settings, &args);
    settings.validate()?;

    let catalog = load_catalog(settings.catalog_path.as_deref());

    let price = Arc::new(HeadlessViewport::new());
    let kairi = Arc::new(HeadlessViewport::new());
    let sync = ViewportSync::attach(vec![
        price.clone() as Arc<dyn ChartViewport>,
        kairi.clone() as Arc<dyn ChartViewport>,
    ]);

    let orchestrator = AnalysisOrchestrator::from_settings(&settings, catalog)?.with_viewports(sync);
    let mut session = repl::Repl::new(orchestrator, price, kairi, args.export_dir);

    if let Some(ticker) = args.ticker.as_deref() {
        session.execute(repl::Command::Select(ticker.to_string())).await?;
    }

    if let Err(err) = session.run().await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "session aborted");
        return Err(err);
    }
    Ok(())
}

fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(url) = &args.backend_url {
        settings.backend_url = Some(url.clone());
    }
    if let Some(path) = &args.catalog {
        settings.catalog_path = Some(path.clone());
    }
    if let Some(n) = args.recent_capacity {
        settings.recent_capacity = n;
    }
    if let Some(n) = args.history_capacity {
        settings.history_capacity = n;
    }
}

/// Falls back to the built-in index entry when no usable list is configured.
fn load_catalog(path: Option<&Path>) -> InstrumentCatalog {
    let Some(path) = path else {
        return InstrumentCatalog::builtin();
    };
    match InstrumentCatalog::from_json_file(path) {
        Ok(catalog) => catalog,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %format!("{err:#}"), "instrument catalog unavailable; using built-in list");
            InstrumentCatalog::builtin()
        }
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
