//! Command-line host for the US30 analytics pipeline.
//!
//! Subcommands:
//!   - `report`:  summarize one calendar day and write the JSON report
//!   - `analyze`: print candle, band, anomaly and trend views for a feed

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use tracing::info;
use tracing_subscriber::EnvFilter;

use us30_analytics::{
    Analysis, AnalysisRequest, AnalyticsError, AnalyticsPipeline, DailyReport, FeedFormat,
    JsonReportStore, PipelineConfig, ReportGenerator, ReportStore, SampleStore, TimeRange,
};

#[derive(Parser)]
#[command(
    name = "us30-report",
    version = us30_analytics::VERSION,
    about = "Daily reports and chart views for US30 index price feeds",
    propagate_version = true,
)]
struct Cli {
    /// TOML configuration file (US30_* environment variables override it)
    #[arg(long, global = true, env = "US30_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the daily summary report
    Report(ReportArgs),
    /// Print derived views for a feed
    Analyze(AnalyzeArgs),
}

#[derive(Parser)]
struct InputArgs {
    /// Raw price feed
    #[arg(long)]
    input: PathBuf,

    /// Feed encoding; guessed from the file extension when omitted
    #[arg(long, value_parser = parse_format)]
    format: Option<FeedFormat>,
}

#[derive(Parser)]
struct ReportArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Day to summarize (YYYY-MM-DD); defaults to today in the configured zone
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Report destination; defaults to `report_path` from the configuration
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Parser)]
struct AnalyzeArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Start of the selected range (inclusive)
    #[arg(long)]
    from: Option<String>,

    /// End of the selected range (inclusive)
    #[arg(long)]
    to: Option<String>,

    /// Print the full analysis as JSON instead of tables
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn parse_format(raw: &str) -> std::result::Result<FeedFormat, String> {
    raw.parse().map_err(|e: AnalyticsError| e.to_string())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn read_feed(args: &InputArgs) -> Result<(Vec<u8>, FeedFormat)> {
    let format = match args.format {
        Some(format) => format,
        None => FeedFormat::from_path(&args.input).with_context(|| {
            format!(
                "cannot tell the feed format of {:?}; pass --format csv|json",
                args.input
            )
        })?,
    };
    let bytes =
        fs::read(&args.input).with_context(|| format!("cannot read feed {:?}", args.input))?;
    Ok((bytes, format))
}

fn run_report(config: &PipelineConfig, args: &ReportArgs) -> Result<()> {
    let (bytes, format) = read_feed(&args.input)?;
    let offset = config.offset()?;
    let series = SampleStore::new(offset).parse_feed(&bytes, format)?;

    let generator = ReportGenerator::new(offset);
    let date = args.date.unwrap_or_else(|| generator.today(Utc::now()));
    let report = match generator.generate(&series, date) {
        Ok(report) => report,
        Err(AnalyticsError::NoData { date }) => bail!("no samples for {} in {:?}", date, args.input.input),
        Err(err) => return Err(err.into()),
    };

    let path = args.output.as_deref().unwrap_or(config.report_path.as_path());
    JsonReportStore::new(path)
        .write(&report)
        .with_context(|| format!("cannot write report to {:?}", path))?;

    println!("{}", report_table(&report));
    Ok(())
}

fn run_analyze(config: PipelineConfig, args: &AnalyzeArgs) -> Result<()> {
    let (bytes, format) = read_feed(&args.input)?;
    let store = SampleStore::new(config.offset()?);
    let bound = |raw: &Option<String>| -> Result<Option<DateTime<Utc>>> {
        raw.as_deref()
            .map(|s| {
                store
                    .parse_timestamp(s)
                    .with_context(|| format!("unrecognized timestamp {:?}", s))
            })
            .transpose()
    };
    let range = TimeRange::new(bound(&args.from)?, bound(&args.to)?);

    let pipeline = AnalyticsPipeline::new(config);
    let analysis = pipeline.analyze_feed(&bytes, format, &AnalysisRequest::new(Utc::now(), range))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    println!("{}", overview_table(&analysis));
    if let Some(report) = &analysis.report {
        println!("{}", report_table(report));
    }
    if !analysis.anomalies.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec!["Anomaly", "Value", "z"]);
        for sample in &analysis.anomalies {
            let z = analysis
                .summary
                .z_score(sample.value)
                .map_or_else(|| "-".to_string(), |z| format!("{:+.2}", z));
            table.add_row(vec![
                sample.timestamp.to_rfc3339(),
                format!("{:.2}", sample.value),
                z,
            ]);
        }
        println!("{table}");
    }
    Ok(())
}

fn overview_table(analysis: &Analysis) -> Table {
    let opt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Samples".to_string(), analysis.series.len().to_string()]);
    table.add_row(vec!["Selected".to_string(), analysis.selection.len().to_string()]);
    table.add_row(vec!["Candles".to_string(), analysis.candles.len().to_string()]);
    table.add_row(vec!["Mean".to_string(), opt(analysis.summary.mean)]);
    table.add_row(vec!["Std dev".to_string(), opt(analysis.summary.stddev)]);
    table.add_row(vec!["Anomalies".to_string(), analysis.anomalies.len().to_string()]);
    table.add_row(vec![
        "Trend".to_string(),
        analysis.trend.map_or_else(
            || "n/a".to_string(),
            |t| format!("{:.2} at {}", t.value, t.timestamp.to_rfc3339()),
        ),
    ]);
    if let Some(fingerprint) = &analysis.source_fingerprint {
        table.add_row(vec!["SHA-256".to_string(), fingerprint.clone()]);
    }
    table
}

fn report_table(report: &DailyReport) -> Table {
    let rounded = report.rounded();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Date", "Open", "Close", "Min", "Max", "Mean", "Volatility"]);
    table.add_row(vec![
        rounded.date.to_string(),
        format!("{:.2}", rounded.open),
        format!("{:.2}", rounded.close),
        format!("{:.2}", rounded.min),
        format!("{:.2}", rounded.max),
        format!("{:.2}", rounded.mean),
        rounded
            .volatility
            .map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v)),
    ]);
    table
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = PipelineConfig::load(path).context("invalid configuration")?;
    info!(
        bucket_width_secs = config.bucket_width_secs,
        sma_window_secs = config.sma_window_secs,
        utc_offset_minutes = config.utc_offset_minutes,
        "configuration loaded"
    );
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        Commands::Report(args) => run_report(&config, args),
        Commands::Analyze(args) => run_analyze(config, args),
    }
}
