//! Enqueues a sync task for one user, printing the task id.

use anyhow::{Context, Result};
use clap::Parser;
use hubsync::{config::ConfigLoader, db, worker};

#[derive(Parser, Debug)]
#[command(name = "enqueue_sync", about = "Queue a full mirror sync for a user")]
struct Args {
    /// Local user id to synchronize.
    #[arg(long)]
    user_id: i32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;

    let task_id = worker::enqueue(&db, args.user_id)
        .await
        .context("enqueuing sync task")?;

    println!("queued sync task {} for user {}", task_id, args.user_id);
    Ok(())
}
