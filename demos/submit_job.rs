//! Submit one generation job and print lifecycle events as they arrive.
//!
//! Usage: DIFFUSION_CLOUD_TOKEN=... cargo run --example submit_job

use diffusion_cloud::{ClientConfig, CloudClient, Event, WorkflowInput, WorkflowKind};
use serde_json::json;

#[tokio::main]
async fn main() -> diffusion_cloud::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diffusion_cloud=info".into()),
        )
        .init();

    let token = std::env::var("DIFFUSION_CLOUD_TOKEN").unwrap_or_default();
    let client = CloudClient::connect(ClientConfig::default(), &token).await?;

    let user = client.user().expect("authenticated");
    println!("signed in as {} ({} credits)", user.name, user.credits);

    let work = WorkflowInput::new(WorkflowKind::Generate)
        .with_batch_count(2)
        .with_param("prompt", json!("a lighthouse in heavy fog, oil painting"))
        .with_param("steps", json!(20));

    let mut events = client.listen();
    let job_id = client.enqueue(work, false).await;
    println!("submitted job {job_id}");

    while let Some(event) = events.next_event().await {
        match event {
            Event::Connected => {}
            Event::Queued { .. } => println!("waiting in queue..."),
            Event::Progress { value, .. } => println!("progress: {:.0}%", value * 100.0),
            Event::Finished { images, .. } => {
                for (i, image) in images.iter().enumerate() {
                    let path = format!("result_{i}.png");
                    std::fs::write(&path, image).expect("write image");
                    println!("wrote {path}");
                }
                break;
            }
            Event::Error { message, .. } => {
                eprintln!("job failed: {message}");
                break;
            }
            Event::Interrupted { .. } => {
                println!("job was cancelled");
                break;
            }
        }
    }
    Ok(())
}
