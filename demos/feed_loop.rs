// ABOUTME: End-to-end feed loop demo
// ABOUTME: Simulated producer and quantum consumer wired through queue, clock, and drift filter

use clap::Parser;
use std::thread;
use std::time::Duration;
use syncring::{
    DriftController, PcmFormat, QueueConfig, RecoveredClock, SampleQueue, SampleType, SharedQueue,
    StreamFormat,
};

/// Drive a simulated producer/consumer pair through the timing engine.
///
/// No audio hardware involved: the "device" is a synthetic clock that
/// runs 500ppm fast, so the drift filter has something real to chase.
#[derive(Parser, Debug)]
#[command(name = "feed_loop")]
#[command(about = "Simulate a synchronized audio feed loop", long_about = None)]
struct Args {
    /// Sample rate of the simulated stream
    #[arg(short, long, default_value_t = 48_000)]
    rate: u32,

    /// Frames per consumer quantum
    #[arg(short, long, default_value_t = 1_024)]
    quantum: usize,

    /// Number of quanta to run
    #[arg(short, long, default_value_t = 200)]
    cycles: u32,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let format = StreamFormat::Pcm(PcmFormat {
        sample_rate: args.rate,
        channels: 2,
        sample_type: SampleType::S16,
    });
    let queue: SampleQueue = QueueConfig::builder().format(format).build();
    let queue = SharedQueue::new(queue);
    let stride = format.stride() as usize;
    let quantum_us = format.frames_to_us(args.quantum as u64);

    // Producer: pushes quantum-sized blocks of a ramp signal, blocking
    // whenever more than 100ms sits unconsumed.
    let producer = {
        let queue = queue.clone();
        let quantum = args.quantum;
        let cycles = args.cycles;
        thread::spawn(move || {
            let mut pts = 0i64;
            for cycle in 0..cycles {
                let block: Vec<u8> = (0..quantum * stride / 2)
                    .flat_map(|i| ((cycle as u16).wrapping_add(i as u16)).to_le_bytes())
                    .collect();
                if queue.push_blocking(&block, Some(pts), 100_000).is_err() {
                    return;
                }
                pts += quantum_us;
            }
        })
    };

    // Consumer: recovers the device clock from observations of a
    // 500ppm-fast device, retrieves one quantum per tick, and feeds
    // reported deltas through the PI filter.
    let mut clock = RecoveredClock::new();
    let mut controller = DriftController::new(0.1, 0.001);
    let mut system_us = 0i64;
    let mut last_update_us: Option<i64> = None;
    let mut underruns = 0u32;

    for cycle in 0..args.cycles {
        system_us += quantum_us;
        let device_us = system_us + system_us / 2_000; // 500ppm fast
        clock.observe(Some(device_us), system_us);
        let now = clock.now(system_us);

        let fetch = queue.retrieve(args.quantum, args.quantum, now, 0);
        if fetch.read_frames == 0 {
            underruns += 1;
        }
        if let Some(delta) = fetch.drift_us {
            let time_scale = match last_update_us {
                Some(prev) => (system_us - prev) as f64 / 1_000_000.0,
                None => 0.0,
            };
            last_update_us = Some(system_us);
            let correction = controller.update(delta as f64, time_scale);
            if cycle % 50 == 0 {
                println!(
                    "cycle {cycle:4}: clock {now:9}us  delta {delta:5}us  rate correction {correction:+.6}"
                );
            }
        }
        // Stand-in for the real-time callback cadence.
        thread::sleep(Duration::from_micros(200));
    }

    producer.join().expect("producer thread");
    println!(
        "done: {} cycles, {} underruns, final fill {}us",
        args.cycles,
        underruns,
        queue.fill_level_us()
    );
}
