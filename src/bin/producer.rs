use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use franz::prelude::{Message, ProducerBuilder};

#[tokio::main]
async fn main() -> Result<(), ()> {
    tracing_subscriber::fmt::init();
    let bootstrap_addrs = ["127.0.0.1:9092"];
    let topic_name = "purchases";

    tracing::info!("Connecting to cluster");
    let producer = ProducerBuilder::new(&bootstrap_addrs)
        .map_err(|err| tracing::error!("{:?}", err))?
        .throttle_size(10)
        .throttle_ms(500)
        .build()
        .map_err(|err| tracing::error!("{:?}", err))?;
    let producer = Arc::new(producer);

    // one direct batch, large enough to be compressed
    let batch = (0..5)
        .map(|i| {
            Message::new(
                Some(Bytes::from_static(b"Tester")),
                Some(Bytes::from(format!("Batch value {} {}", i, "x".repeat(1024)))),
            )
        })
        .collect();
    let response = producer
        .send(topic_name, batch)
        .await
        .map_err(|err| tracing::error!("{:?}", err))?;
    tracing::info!("Batch stored {:?}", response);

    let queue = producer.queue();
    for i in 0..100 {
        tracing::info!("Queueing record {} for topic {}", i, topic_name);
        queue
            .enqueue(
                topic_name,
                vec![Message::new(
                    Some(Bytes::from_static(b"Tester")),
                    Some(Bytes::from(format!("Value {}", i))),
                )],
            )
            .await
            .map_err(|err| tracing::error!("{:?}", err))?;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    queue
        .close()
        .await
        .map_err(|err| tracing::error!("{:?}", err))
}
