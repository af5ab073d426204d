use std::{sync::Arc, thread};

use bytes::Bytes;
use memdex::options::IndexOpenOptions;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let index = Arc::new(
        IndexOpenOptions::new()
            .memory_limit(64 << 10)
            .seed(7)
            .open()?,
    );

    let reader = {
        let index = index.clone();
        thread::spawn(move || {
            let probe = b"key00000500";
            while !index.contains(probe) {
                thread::yield_now();
            }
            println!("reader saw {:?}", Bytes::from_static(probe));
        })
    };

    for i in 0..1000 {
        index.insert(format!("key{i:08}"))?;
    }
    reader.join().expect("reader panicked");

    let mut cursor = index.cursor();
    cursor.seek(&Bytes::from_static(b"key00000990"));
    while let Some(key) = cursor.key() {
        println!("{:?}", key);
        cursor.next();
    }

    println!(
        "memory usage: {} bytes, should flush: {}",
        index.memory_usage(),
        index.should_flush()
    );
    Ok(())
}
