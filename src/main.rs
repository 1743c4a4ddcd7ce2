use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use ship_ability::config::ShipConfig;
use ship_ability::export;
use ship_ability::orders::FormatHint;
use ship_ability::rules::EnrichedRow;
use ship_ability::session::Session;

#[derive(Parser, Debug)]
#[command(name = "ship-ability")]
#[command(about = "Classify marketplace orders and export a carrier batch CSV")]
#[command(version)]
struct Args {
    /// Marketplace order export (CSV)
    input: PathBuf,

    /// Export format: auto, tcgplayer or manapool
    #[arg(short, long, default_value = "auto", env = "SHIP_FORMAT")]
    format: FormatHint,

    /// Where to write the batch export
    #[arg(short, long = "out", default_value = "batch_export.csv", env = "SHIP_OUT")]
    output: PathBuf,
}

fn preview_line(row: &EnrichedRow) -> String {
    let c = &row.classification;
    let dims = c
        .dimensions
        .map(|d| format!("{}x{}x{}", d.length, d.width, d.height))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:>4}  {:<24}  {:>5}  {:<7}  {:>5}oz  {:<5}  {:<16}  {:<9}  {}",
        row.row_id().0,
        row.row.recipient.name,
        row.row.item_count,
        c.kind.to_string(),
        c.weight_oz.to_string(),
        if c.machinable { "yes" } else { "no" },
        c.service,
        dims,
        row.readiness.describe(),
    )
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ShipConfig::from_env().context("loading configuration")?;

    eprintln!("📦 ShipAbility v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Input:  {}", args.input.display());
    eprintln!("   Format: {:?}", args.format);
    eprintln!(
        "   Carrier: {} ({} / {})",
        config.defaults.carrier, config.defaults.service, config.defaults.package_service
    );

    let mut session = Session::new(config);
    let file = File::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let batch = session.load_csv(file, args.format)?;
    eprintln!("   Detected: {} ({} rows)\n", batch.format, batch.rows.len());

    for issue in session.issues() {
        eprintln!("   ⚠ row {}: {}", issue.row_id, issue.message);
    }

    let rows = session.evaluate()?;
    eprintln!(
        "{:>4}  {:<24}  {:>5}  {:<7}  {:>7}  {:<5}  {:<16}  {:<9}  {}",
        "row", "recipient", "items", "kind", "weight", "mach", "service", "dims", "status"
    );
    for row in &rows {
        eprintln!("{}", preview_line(row));
    }

    let lines = session.export()?;
    export::write_csv_file(&lines, &args.output)?;

    let held = rows.len() - lines.len();
    eprintln!(
        "\n   Wrote {} row(s) to {}{}",
        lines.len(),
        args.output.display(),
        if held > 0 {
            format!(" ({held} held back for review)")
        } else {
            String::new()
        }
    );

    Ok(())
}
