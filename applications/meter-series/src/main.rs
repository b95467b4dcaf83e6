use meter_series::input::SeriesDocument;
use meter_series::{Config, CumulativeSeriesExpander, RegisterTable};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cfg_path =
        std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.example.yaml".into());
    let cfg = Config::load(&cfg_path)?;
    info!(
        resolution = %cfg.resolution,
        location = %cfg.location,
        "loaded config"
    );

    let input_path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: meter-series <input.json>"))?;
    let input = std::fs::read_to_string(&input_path)?;

    let set = match SeriesDocument::from_json(&input).and_then(SeriesDocument::into_set) {
        Ok(set) => set,
        Err(e) => {
            warn!(path = %input_path, error = %e, "rejected input document");
            return Err(e.into());
        }
    };

    let table = RegisterTable::standard();
    let divider = cfg.bucketer()?.divider(&cfg.resolution)?;
    let expander = CumulativeSeriesExpander::new(&table, &divider).with_tolerance(cfg.tolerance()?);

    let derived = match expander.expand_set(&set) {
        Ok(derived) => derived,
        Err(e) => {
            warn!(path = %input_path, error = %e, "expansion failed");
            return Err(e.into());
        }
    };
    info!(labels = derived.len(), "expansion done");

    println!("{}", serde_json::to_string_pretty(&derived)?);
    Ok(())
}
