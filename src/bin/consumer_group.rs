use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), ()> {
    tracing_subscriber::fmt()
        // filter spans/events with level TRACE or higher.
        .with_max_level(tracing::Level::INFO)
        .compact()
        // Display source code file paths
        .with_file(true)
        // Display source code line numbers
        .with_line_number(true)
        // Display the thread ID an event was recorded on
        .with_thread_ids(true)
        // Don't display the event's target (module path)
        .with_target(false)
        // Build the subscriber
        .init();

    let bootstrap_addrs = ["127.0.0.1:9092"];
    let src_topic = "shakespeare";

    let consumer = franz::prelude::ConsumerBuilder::new(&bootstrap_addrs, "Squad", &[src_topic])
        .map_err(|err| tracing::error!("{:?}", err))?
        .heartbeat_interval_ms(3000)
        .build()
        .map_err(|err| tracing::error!("{:?}", err))?;
    consumer
        .join()
        .await
        .map_err(|err| tracing::error!("{:?}", err))?;
    tracing::info!(
        "Joined, reading partitions {:?}",
        consumer.assigned(src_topic).await
    );

    let (cancel, cancelled) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Stopping");
            let _ = cancel.send(true);
        }
    });

    let stream = consumer.stream(src_topic, cancelled);
    tokio::pin!(stream);

    while let Some(message) = stream.next().await {
        match message {
            Ok(message) => tracing::info!(
                "{}:{}@{} {:?}",
                message.topic,
                message.partition,
                message.offset,
                message.value
            ),
            Err(err) => tracing::error!("{:?}", err),
        }
    }

    consumer
        .leave()
        .await
        .map_err(|err| tracing::error!("{:?}", err))
}
