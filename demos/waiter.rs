//! Text-mode ordering demo.
//!
//! Type a message and the waiter replies. `/menu` prints the card, `/cart`
//! shows what you have ordered so far, `/quit` leaves. Needs GEMINI_API_KEY
//! in the environment or a .env file.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};

use nexspice_assistant::cart::cart_fn;
use nexspice_assistant::voice::playback::PlaybackSink;
use nexspice_assistant::voice::{AudioIo, CaptureStream};
use nexspice_assistant::{Config, SessionCoordinator};
use nexspice_types::{Menu, Role};

/// The text demo never opens a microphone.
struct NoAudio;

impl AudioIo for NoAudio {
    fn open_capture(&self, _sample_rate: u32) -> anyhow::Result<CaptureStream> {
        anyhow::bail!("voice needs a device backend; run the `voice` example instead")
    }

    fn open_playback(&self, _sample_rate: u32) -> anyhow::Result<Box<dyn PlaybackSink>> {
        anyhow::bail!("voice needs a device backend; run the `voice` example instead")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();
    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let items: Arc<Mutex<BTreeMap<String, u32>>> = Arc::new(Mutex::new(BTreeMap::new()));
    let cart_items = items.clone();
    let cart = Arc::new(cart_fn(move |dish| {
        if let Ok(mut items) = cart_items.lock() {
            *items.entry(dish.name().to_string()).or_insert(0) += 1;
        }
    }));

    let mut coordinator = SessionCoordinator::new(&config, NoAudio, cart);

    if let Some(greeting) = coordinator.messages().first() {
        println!("waiter> {}\n", greeting.text());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/menu" => {
                for dish in Menu::standard().dishes() {
                    let marker = if dish.is_bestseller() { " *" } else { "" };
                    println!("  {:<24} Rs {:<5} {}{}", dish.name(), dish.price(), dish.description(), marker);
                }
                continue;
            }
            "/cart" => {
                let items = items.lock().expect("cart lock");
                if items.is_empty() {
                    println!("  (empty)");
                }
                for (name, count) in items.iter() {
                    println!("  {count} x {name}");
                }
                continue;
            }
            _ => {}
        }

        let seen = coordinator.messages().len();
        if let Err(err) = coordinator.send_text_turn(line).await {
            println!("waiter> ({err})");
            continue;
        }
        for message in coordinator.messages().into_iter().skip(seen) {
            if message.role() == Role::Model {
                println!("waiter> {}\n", message.text());
            }
        }
    }

    coordinator.shutdown();
    println!("Thanks for visiting NexSpice Court!");
    Ok(())
}
