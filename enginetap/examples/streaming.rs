//! Streaming output example: live engine output while a command runs.
//!
//! The engine here is a stand-in that prints one line every few hundred
//! milliseconds, so the difference between streaming and batch delivery is
//! visible in a terminal.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example streaming -- --lines 5
//! cargo run --example streaming -- --lines 5 --batch
//! cargo run --example streaming -- --mata
//! ```

use std::env;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use enginetap::engine::StreamingMode;
use enginetap::platform::MATA;
use enginetap::{Command, Dispatcher, Engine, EngineSession, Executor, RenderConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let engine = Arc::new(SlowEngine::new(args.lines, args.delay));
    let streaming = if args.batch { StreamingMode::Off } else { StreamingMode::On };
    let config = RenderConfig::default().with_streaming(streaming);
    println!("{}", config);

    let session = Arc::new(EngineSession::with_config(engine, config));
    let dispatcher = Dispatcher::new(session.clone());

    let command = if args.mata {
        Command::mata_block("x = 1..3\nx", false)
    } else {
        Command::new("forvalues i = 1/5 { display `i' }")
    };
    println!("Running: {:?}", command.text());
    println!("{}", "-".repeat(50));

    // Outside a call, host prints go straight to the terminal.
    writeln!(session.streams().stdout(), "(host print outside the call)")?;

    let outcome = dispatcher.execute(&command).await?;

    println!("{}", "-".repeat(50));
    println!(
        "Return code {} after {:?}, {} raw bytes",
        outcome.return_code,
        outcome.elapsed,
        outcome.raw_output.len()
    );

    let failing = Command::new("display nosuchvar");
    match dispatcher.execute(&failing).await {
        Ok(_) => println!("unexpected success"),
        Err(e) => println!("Failure surfaced as: {}", e),
    }

    Ok(())
}

/// Engine stand-in that prints slowly.
struct SlowEngine {
    lines: usize,
    delay: Duration,
    buffer: Mutex<Vec<u8>>,
}

impl SlowEngine {
    fn new(lines: usize, delay: Duration) -> Self {
        Self {
            lines,
            delay,
            buffer: Mutex::new(Vec::new()),
        }
    }

    fn print(&self, text: &str) {
        self.buffer.lock().unwrap().extend_from_slice(text.as_bytes());
    }
}

impl Engine for SlowEngine {
    fn execute(&self, command: &[u8]) -> i32 {
        let command = String::from_utf8_lossy(command);
        if command.contains("nosuchvar") {
            self.print("nosuchvar not found\n");
            return 111;
        }

        let mata = command.starts_with("mata");
        if mata {
            self.print(&format!(". mata\n{}\n", MATA.divider()));
        }
        for i in 1..=self.lines {
            std::thread::sleep(self.delay);
            self.print(&format!("  {}\n", i));
        }
        if mata {
            self.print(": end\n");
        }
        0
    }

    fn read_output(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buffer.lock().unwrap())
    }

    fn append_output(&self, bytes: &[u8]) {
        self.buffer.lock().unwrap().extend_from_slice(bytes);
    }
}

struct Args {
    lines: usize,
    delay: Duration,
    batch: bool,
    mata: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut lines = 5usize;
        let mut delay = 300u64;
        let mut batch = false;
        let mut mata = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--lines" | "-n" => {
                    i += 1;
                    if i < args.len() {
                        lines = args[i].parse().unwrap_or(5);
                    }
                }
                "--delay" | "-d" => {
                    i += 1;
                    if i < args.len() {
                        delay = args[i].parse().unwrap_or(300);
                    }
                }
                "--batch" | "-b" => batch = true,
                "--mata" | "-m" => mata = true,
                _ => {}
            }
            i += 1;
        }

        Self {
            lines,
            delay: Duration::from_millis(delay),
            batch,
            mata,
        }
    }
}
