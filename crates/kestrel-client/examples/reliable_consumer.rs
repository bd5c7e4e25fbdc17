use kestrel_client::{ClientConfig, ClientFactory, QueueService};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let servers = std::env::var("KESTREL_SERVERS").unwrap_or_else(|_| "127.0.0.1:22133".to_string());
    let config = ClientConfig::default().with_servers(servers.split(','));
    let factory = ClientFactory::new(config);

    factory.scoped(|client| {
        println!("Enqueueing work...");
        for i in 0..3 {
            client.enqueue("jobs", &format!("task-{}", i))?;
        }

        // Each message stays open until finished; a failure hands it back
        while let Some(task) = client.next("jobs", Some(Duration::from_millis(500)))? {
            if task.ends_with('1') {
                println!("Failed {}, returning it to the queue", task);
                client.abort("jobs")?;
                break;
            }
            println!("Processed {}", task);
            client.finish("jobs")?;
        }

        Ok(())
    })?;

    let mut client = factory.acquire()?;
    if let Some(task) = client.dequeue("jobs")? {
        println!("Redelivered: {}", task);
    }
    println!("{}", describe(&client.stats()?));

    Ok(())
}

fn describe(stats: &kestrel_client::StatsSnapshot) -> String {
    stats
        .queues
        .iter()
        .map(|(name, counters)| format!("{}: {:?}", name, counters))
        .collect::<Vec<_>>()
        .join("\n")
}
