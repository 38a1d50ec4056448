// Periodically drains a named log ring and prints what it finds.
//
//   cargo run --example consumer -- [interval_ms]
use dmxp_logring::{Field, LogRingBuilder};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SEGMENT: &str = "dmxp_logring_demo";

fn main() -> dmxp_logring::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let interval = env::args()
        .nth(1)
        .map(|s| s.parse().expect("Invalid interval"))
        .unwrap_or(500);

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    println!("Consumer: Waiting for /dev/shm/{}...", SEGMENT);
    let mut consumer = loop {
        match LogRingBuilder::new().with_name(SEGMENT).build_consumer() {
            Ok(consumer) => break consumer,
            Err(_) if running.load(Ordering::SeqCst) => {
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => return Err(e),
        }
    };

    println!("\n{:<8} {:<10} {:<16} {}", "Line", "Level", "App", "Message");
    println!("{}", "=".repeat(80));

    let mut received = 0usize;
    while running.load(Ordering::SeqCst) {
        for record in consumer.drain()? {
            let record = record?;
            println!(
                "{:<8} {:<10} {:<16} {}",
                record.meta.log_line_number,
                record.level(),
                record.text(Field::ApplicationName),
                record.message()
            );
            received += 1;
        }
        std::thread::sleep(Duration::from_millis(interval));
    }

    let stats = consumer.stats();
    println!("{}", "=".repeat(80));
    println!(
        "Consumer: received {} events; ring appended {} and overwrote {}",
        received, stats.appended, stats.evicted
    );
    Ok(())
}
