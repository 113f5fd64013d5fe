//! Bulk Historical Weather Export
//!
//! Sweeps a bounding-box grid year by year, pulling hourly weather from the
//! Open-Meteo archive, and appends rows to a CSV for offline analysis.
//!
//! Usage:
//!   export-weather --bbox -124.5,32.5,-114.0,42.0 --step 0.5 \
//!                  --start-year 2017 --end-year 2024 \
//!                  --output data/weather_export.csv

use anyhow::{bail, Context, Result};
use clap::Parser;
use risk_engine::BoundingBox;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

#[derive(Parser, Debug)]
#[command(
    name = "export-weather",
    about = "Export historical hourly weather over a bounding-box grid to CSV"
)]
struct Args {
    /// Bounding box west,south,east,north
    #[arg(long, default_value = "-124.5,32.5,-114.0,42.0")]
    bbox: String,

    /// Grid step in degrees
    #[arg(long, default_value_t = 0.5)]
    step: f64,

    #[arg(long, default_value_t = 2017)]
    start_year: i32,

    #[arg(long, default_value_t = 2024)]
    end_year: i32,

    /// Output CSV file
    #[arg(short, long, default_value = "data/weather_export.csv")]
    output: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize, Default)]
struct ArchiveHourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    wind_direction_10m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    #[serde(default)]
    hourly: ArchiveHourly,
}

fn build_grid(bbox: &BoundingBox, step: f64) -> Vec<(f64, f64)> {
    let mut cells = Vec::new();
    let mut lat = bbox.south;
    while lat <= bbox.north + 1e-9 {
        let mut lon = bbox.west;
        while lon <= bbox.east + 1e-9 {
            cells.push((lat, lon));
            lon += step;
        }
        lat += step;
    }
    cells
}

async fn fetch_cell_year(
    client: &reqwest::Client,
    lat: f64,
    lon: f64,
    year: i32,
) -> Result<ArchiveHourly> {
    let url = format!(
        "{ARCHIVE_URL}?latitude={lat:.4}&longitude={lon:.4}\
         &start_date={year}-01-01&end_date={year}-12-31\
         &hourly=temperature_2m,relative_humidity_2m,wind_speed_10m,wind_direction_10m"
    );
    let response = client.get(&url).send().await?.error_for_status()?;
    let data: ArchiveResponse = response.json().await?;
    Ok(data.hourly)
}

fn write_rows(out: &mut impl Write, lat: f64, lon: f64, hourly: &ArchiveHourly) -> Result<usize> {
    let mut written = 0;
    for (i, time) in hourly.time.iter().enumerate() {
        let row = hourly
            .temperature_2m
            .get(i)
            .copied()
            .flatten()
            .zip(hourly.relative_humidity_2m.get(i).copied().flatten())
            .zip(hourly.wind_speed_10m.get(i).copied().flatten())
            .zip(hourly.wind_direction_10m.get(i).copied().flatten());
        // Rows with any missing series are skipped.
        let Some((((temp, humidity), wind_speed), wind_dir)) = row else {
            continue;
        };
        writeln!(
            out,
            "{time},{lat:.4},{lon:.4},{temp},{humidity},{wind_speed},{wind_dir}"
        )?;
        written += 1;
    }
    Ok(written)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let bbox: BoundingBox = args.bbox.parse().context("parsing --bbox")?;
    if args.end_year < args.start_year {
        bail!("--end-year must be >= --start-year");
    }
    if args.step <= 0.0 {
        bail!("--step must be positive");
    }

    if let Some(parent) = args.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(
        out,
        "time,lat,lon,temperature_c,humidity_pct,wind_speed_kmh,wind_direction_deg"
    )?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;
    let grid = build_grid(&bbox, args.step);
    info!(
        cells = grid.len(),
        years = args.end_year - args.start_year + 1,
        "starting weather export"
    );

    let mut total_rows = 0usize;
    for year in args.start_year..=args.end_year {
        for &(lat, lon) in &grid {
            match fetch_cell_year(&client, lat, lon, year).await {
                Ok(hourly) => {
                    let written = write_rows(&mut out, lat, lon, &hourly)?;
                    total_rows += written;
                    info!(year, lat, lon, rows = written, "cell exported");
                }
                Err(error) => {
                    warn!(year, lat, lon, %error, "cell failed; continuing sweep");
                }
            }
        }
    }

    out.flush()?;
    info!(
        rows = total_rows,
        output = %args.output.display(),
        "export complete"
    );
    Ok(())
}
