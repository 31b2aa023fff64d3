//! Operator commands for the dead-letter stream.

use clap::Subcommand;

use domo_core::DomoConfig;
use domo_stream::StreamClient;

#[derive(Subcommand)]
pub enum DlqCommand {
    /// Show the oldest dead-lettered entries.
    List {
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Print the number of dead-lettered entries.
    Len,
    /// Re-append an entry's original payload to the inbound stream.
    Requeue { dlq_id: String },
    /// Drop an entry without reprocessing it.
    Delete { dlq_id: String },
}

pub async fn run(config: DomoConfig, command: DlqCommand) -> anyhow::Result<()> {
    let client = StreamClient::connect(
        &config.redis.url,
        &config.redis.stream_in,
        &config.redis.group,
        &config.consumer_name(),
    )
    .await?;

    match command {
        DlqCommand::List { count } => {
            let entries = client.read_dlq(count).await?;
            if entries.is_empty() {
                println!("DLQ is empty.");
                return Ok(());
            }
            for (dlq_id, entry) in entries {
                println!(
                    "{dlq_id}  original={}  type={}  retries={}  user={}  at={}",
                    entry.original_message_id,
                    entry.error_type,
                    entry.retry_count,
                    entry
                        .user_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".into()),
                    entry.failed_at.to_rfc3339(),
                );
                println!("    {}", entry.error_message);
            }
        }
        DlqCommand::Len => {
            println!("{}", client.get_dlq_length().await?);
        }
        DlqCommand::Requeue { dlq_id } => {
            let new_id = client.requeue_from_dlq(&dlq_id).await?;
            println!("requeued {dlq_id} as {new_id}");
        }
        DlqCommand::Delete { dlq_id } => {
            client.delete_from_dlq(&dlq_id).await?;
            println!("deleted {dlq_id}");
        }
    }
    Ok(())
}
