//! Blocking GraphQL client demo
//!
//! Connects to the configured endpoint, introspects the schema, and runs a
//! fragment query listing every European country. The transport retries
//! network faults on its own; application errors are printed and the
//! session is closed either way.

use dotenv::dotenv;
use tracing::{error, info};

use skystack::config::ClientConfig;
use skystack::{BlockingSession, ClientResult, QueryBuilder, QueryDocument};

fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("configuration error: {}", err);
            std::process::exit(1);
        }
    };

    let session = match BlockingSession::open(&config) {
        Ok(session) => session,
        Err(err) => {
            error!("could not build transport: {}", err);
            std::process::exit(1);
        }
    };

    let outcome = run(&session);
    session.close();

    if let Err(err) = outcome {
        error!("query failed: {}", err);
        std::process::exit(1);
    }
}

fn run(session: &BlockingSession) -> ClientResult<()> {
    session.introspect()?;
    info!("schema introspected");

    let schema = session.schema()?;
    let ds = QueryBuilder::new(&schema);

    let country_info = ds
        .fragment("CountryInfo", "Country")?
        .select(ds.field("Country", "code")?)
        .select(ds.field("Country", "name")?)
        .select(ds.field("Country", "capital")?)
        .select(ds.field("Country", "currency")?);

    let doc = QueryDocument::new()
        .selection(
            "GetCountriesonContinent",
            ds.query_field("continent")?
                .arg("code", "EU")
                .select(ds.field("Continent", "code")?)
                .select(ds.field("Continent", "name")?)
                .select(
                    ds.field("Continent", "countries")?
                        .spread(&country_info),
                ),
        )
        .fragment(country_info);

    let data = session.execute(&doc)?;
    println!("{}", serde_json::to_string_pretty(&data).unwrap_or_default());
    Ok(())
}
