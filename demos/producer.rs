// Writes diagnostic events into a named log ring.
//
//   cargo run --example producer -- <num_events> [--auto-exit]
use dmxp_logring::{ErrorLevel, ErrorRecord, Field, LogRingBuilder};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const SEGMENT: &str = "dmxp_logring_demo";

fn main() -> dmxp_logring::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <num_events> [--auto-exit]", args[0]);
        std::process::exit(1);
    }

    let num_events: usize = args[1].parse().expect("Invalid number of events");
    let auto_exit = args.get(2).map(|s| s == "--auto-exit").unwrap_or(false);

    let producer = LogRingBuilder::new()
        .with_name(SEGMENT)
        .with_capacity(1024 * 1024)
        .build_producer()?;

    let keep_alive = Arc::new(AtomicBool::new(true));
    let keep_alive_for_handler = Arc::clone(&keep_alive);

    // Handle Ctrl+C to clean up
    ctrlc::set_handler(move || {
        keep_alive_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    println!(
        "Producer: writing {} events to /dev/shm/{} ({} byte ring)",
        num_events,
        SEGMENT,
        producer.ring().capacity()
    );

    let start = std::time::Instant::now();
    let mut written = 0;
    let mut evicted = 0;

    for i in 0..num_events {
        let level = ErrorLevel::ALL[i % ErrorLevel::ALL.len()];
        let message = format!("event {} of {}", i, num_events);
        let query = format!("select * from events where id = {}", i);
        let mut record = ErrorRecord::new(level, &message)
            .with_field(Field::ApplicationName, "demo-producer")
            .with_field(Field::Query, &query);
        record.meta.txid = i as u64;

        if let dmxp_logring::AppendOutcome::Written { evicted: e } = producer.append(&record) {
            written += 1;
            evicted += e;
        }
        if !keep_alive.load(Ordering::SeqCst) {
            break;
        }
    }

    let elapsed = start.elapsed();
    println!(
        "Producer: wrote {} events in {:.2?} ({} unread events overwritten)",
        written, elapsed, evicted
    );
    println!(
        "Producer: Throughput: {:.2} events/sec",
        written as f64 / elapsed.as_secs_f64()
    );

    if auto_exit {
        println!("Producer: Auto-exit mode, waiting 2 seconds for consumer...");
        std::thread::sleep(std::time::Duration::from_secs(2));
    } else {
        println!("Press Ctrl+C to exit...");
        while keep_alive.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }

    println!("Producer: Shutting down");
    producer.segment().unlink()
}
