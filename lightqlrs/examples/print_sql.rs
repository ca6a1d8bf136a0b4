use std::{env, fs, path::PathBuf};

use lightql::{LightqlConfig, QueryRequest, SqlBuilder, Validator, WarehouseType};
use tracing_subscriber::EnvFilter;

fn usage() {
    eprintln!("Usage: print_sql <explores_dir> <request_json> [dialect]");
    eprintln!(
        "Example: cargo run --example print_sql -- demos/explores demos/requests/revenue_by_country.json bigquery"
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.len() < 2 {
        usage();
        std::process::exit(1);
    }

    let explores_dir = PathBuf::from(args.remove(0));
    let request_path = PathBuf::from(args.remove(0));

    let config = LightqlConfig::load_default();
    let warehouse = match args.first() {
        Some(name) => {
            serde_json::from_value::<WarehouseType>(serde_json::Value::String(name.clone()))?
        }
        None => config.warehouse.dialect,
    };

    let registry = lightql::load_and_validate(explores_dir, &Validator::from_config(&config))?;
    let request_str = fs::read_to_string(request_path)?;
    let request: QueryRequest = serde_json::from_str(&request_str)?;

    let builder = SqlBuilder::from_config(&config);
    let dialect = warehouse.dialect();
    let compiled = builder.build_for_request(&registry, &request, dialect.as_ref())?;
    println!("{}", compiled.query);
    eprintln!("-- cache key: {}", compiled.cache_key());
    if compiled.has_example_metric {
        eprintln!("-- uses the example count metric");
    }
    Ok(())
}
