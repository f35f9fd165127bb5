//! Async GraphQL client demo
//!
//! Opens a session under the unbounded connect policy, then runs three
//! queries in sequence under the bounded execute policy: all continents,
//! one country by code, and a fragment query over a continent's countries.
//! The session is closed exactly once on every path out.

use dotenv::dotenv;
use tracing::{error, info};

use skystack::config::ClientConfig;
use skystack::{retry, ClientResult, QueryBuilder, QueryDocument, RetryPolicy, Session};

#[tokio::main]
async fn main() {
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

    let session = match Session::open(&config) {
        Ok(session) => session,
        Err(err) => {
            error!("could not build transport: {}", err);
            std::process::exit(1);
        }
    };

    let connect = RetryPolicy::connect();
    if let Err(err) = retry(&connect, "introspect", || session.introspect()).await {
        error!("introspection failed: {}", err);
        session.close();
        std::process::exit(1);
    }
    info!("schema introspected");

    let outcome = run(&session).await;
    session.close();

    if let Err(err) = outcome {
        error!("query failed: {}", err);
        std::process::exit(1);
    }
}

async fn run(session: &Session) -> ClientResult<()> {
    let schema = session.schema()?;
    let ds = QueryBuilder::new(&schema);
    let execute = RetryPolicy::execute();

    let continents = QueryDocument::new().selection(
        "GetContinents",
        ds.query_field("continents")?
            .select(ds.field("Continent", "code")?)
            .select(ds.field("Continent", "name")?),
    );

    let country = QueryDocument::new().selection(
        "GetCountryByCode",
        ds.query_field("country")?
            .arg("code", "IE")
            .select(
                ds.field("Country", "continent")?
                    .select(ds.field("Continent", "name")?),
            )
            .select(ds.field("Country", "name")?)
            .select(ds.field("Country", "capital")?)
            .select(ds.field("Country", "currency")?)
            .select(
                ds.field("Country", "languages")?
                    .select(ds.field("Language", "code")?)
                    .select(ds.field("Language", "name")?),
            ),
    );

    let country_info = ds
        .fragment("CountryInfo", "Country")?
        .select(ds.field("Country", "code")?)
        .select(ds.field("Country", "name")?)
        .select(ds.field("Country", "capital")?)
        .select(ds.field("Country", "currency")?);
    let europe = QueryDocument::new()
        .selection(
            "GetCountriesonContinent",
            ds.query_field("continent")?
                .arg("code", "EU")
                .select(ds.field("Continent", "code")?)
                .select(ds.field("Continent", "name")?)
                .select(ds.field("Continent", "countries")?.spread(&country_info)),
        )
        .fragment(country_info);

    for doc in [&continents, &country, &europe] {
        let data = retry(&execute, "execute", || session.execute(doc)).await?;
        println!("{}", serde_json::to_string_pretty(&data).unwrap_or_default());
    }
    Ok(())
}
