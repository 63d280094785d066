//! Interactive device-linked sign-in: prints the confirmation URL, waits
//! for approval, then prints the resulting token.
//!
//! Usage: cargo run --example sign_in

use diffusion_cloud::{ClientConfig, CloudClient};

#[tokio::main]
async fn main() -> diffusion_cloud::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diffusion_cloud=info".into()),
        )
        .init();

    let client = CloudClient::new(ClientConfig::default());
    let pending = client.sign_in().await?;

    println!("Open this URL in a browser to approve the sign-in:");
    println!("  {}", pending.auth_url);

    let token = pending.wait_confirmation().await?;
    let user = client.authenticate(&token).await?;
    println!("authorized as {} ({} credits)", user.name, user.credits);
    println!("token: {token}");
    Ok(())
}
