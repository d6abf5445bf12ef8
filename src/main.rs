use idx_client::{
    DirectoryClient, HttpTransport, IdealClient, IdinClient, Variant,
    config::Config, telemetry,
};
use serde_json::json;

/// Prints the issuer directory, or the status of the transaction whose ID is
/// passed as the only argument.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let config = Config::load()?;
    tracing::info!(
        variant = %config.acquirer.variant,
        endpoint = %config.acquirer.endpoint,
        "Loaded configuration"
    );

    let identity = config.client_identity()?;
    let transport = config.transport(&identity)?;
    let transaction_id = std::env::args().nth(1);

    let output = match config.acquirer.variant {
        Variant::Ideal => ideal(IdealClient::new(identity, transport), transaction_id).await?,
        Variant::Idin => idin(IdinClient::new(identity, transport), transaction_id).await?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn ideal(
    client: IdealClient<HttpTransport>,
    transaction_id: Option<String>,
) -> color_eyre::Result<serde_json::Value> {
    let Some(id) = transaction_id else {
        return Ok(serde_json::to_value(client.directory().await?)?);
    };
    let status = client.transaction_status(&id).await?;
    Ok(json!({
        "transactionID": id,
        "status": status.status(),
        "payment": status.payload(),
    }))
}

async fn idin(
    client: IdinClient<HttpTransport>,
    transaction_id: Option<String>,
) -> color_eyre::Result<serde_json::Value> {
    let Some(id) = transaction_id else {
        return Ok(serde_json::to_value(client.directory().await?)?);
    };
    // Attribute values are personal data; only their names are printed
    let status = client.transaction_status(&id).await?;
    let mut attributes: Vec<&String> = status.payload().into_iter().flat_map(|a| a.keys()).collect();
    attributes.sort();
    Ok(json!({
        "transactionID": id,
        "status": status.status(),
        "attributes": attributes,
    }))
}

