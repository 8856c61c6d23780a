use anyhow::Result;
use clap::Parser;
use iri_pipeline::{
    config::{PipelineConfig, Strictness},
    pipeline,
    schema::CanonicalItem,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Harmonize IRI survey cohorts, gate careless responders and publish clean datasets"
)]
struct Args {
    /// YAML pipeline config; built-in 2023/2024/2025 cohorts when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    raw_dir: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long, value_enum)]
    strictness: Option<Strictness>,
    /// Chi-squared tail probability for outlier flagging.
    #[arg(long)]
    p_value: Option<f64>,
    /// Cohort years to load, e.g. `2023,2024`.
    #[arg(long, value_delimiter = ',')]
    years: Option<Vec<i32>>,
    /// Items left out of outlier detection, e.g. `FS7,PD13`.
    #[arg(long, value_delimiter = ',')]
    exclude_items: Option<Vec<CanonicalItem>>,
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::from_yaml_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(d) = self.raw_dir {
            cfg.raw_dir = d;
        }
        if let Some(d) = self.output_dir {
            cfg.output_dir = d;
        }
        if let Some(s) = self.strictness {
            cfg.strictness = s;
        }
        if let Some(p) = self.p_value {
            cfg.outlier_p_value = p;
        }
        if let Some(years) = self.years {
            cfg.include_years = Some(years);
        }
        if let Some(items) = self.exclude_items {
            cfg.exclude_items = items;
        }
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // ─── init logging ────────────────────────────────────────────────
    let default_level = if args.verbose { "debug" } else { "info" };
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    let cfg = args.into_config()?;
    cfg.validate()?;
    info!(
        raw_dir = %cfg.raw_dir.display(),
        output_dir = %cfg.output_dir.display(),
        strictness = cfg.strictness.as_str(),
        p_value = cfg.outlier_p_value,
        "startup"
    );

    let (run, artifacts) = pipeline::run(&cfg)?;
    for snap in &artifacts.snapshots {
        info!(
            snapshot = %snap.name,
            rows = snap.rows,
            parquet = %snap.parquet.display(),
            "published"
        );
    }
    print!("{}", run.summary().render());
    Ok(())
}
