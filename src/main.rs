//! Sticker Wall demo
//!
//! Simulates a crowd of visitors auto-placing stickers on the eagle at once,
//! all against one in-memory service with uneven request latency, then
//! checks the separation invariant and prints the wall as JSON.
//!
//! Usage: `stickerwall [settings.json] [clients]` (verbosity via `RUST_LOG`)

#[cfg(not(target_arch = "wasm32"))]
mod demo {
    use std::error::Error;
    use std::rc::Rc;

    use futures::executor::block_on;
    use futures::future::join_all;
    use glam::Vec2;

    use stickerwall::persistence::{Delayed, InMemoryPersistence, ServerRules, Subscription};
    use stickerwall::{CanvasSize, DeviceId, EngineError, EngineSettings, Region, StickerEngine};

    pub const DEFAULT_CLIENTS: usize = 8;
    const STICKERS_PER_CLIENT: usize = 6;

    /// Eagle silhouette: two wings and a body, overlapping
    const EAGLE: [&str; 3] = [
        "M 480 380 Q 300 200 60 220 L 140 300 L 90 330 L 200 360 L 150 400 Q 320 440 480 430 Z",
        "M 520 380 Q 700 200 940 220 L 860 300 L 910 330 L 800 360 L 850 400 Q 680 440 520 430 Z",
        "M 470 300 C 470 240 530 240 530 300 L 560 560 L 600 700 L 500 660 L 400 700 L 440 560 Z",
    ];

    type Client = StickerEngine<Delayed<Rc<InMemoryPersistence>>>;

    #[derive(Debug, Default)]
    struct Tally {
        placed: usize,
        attempts: u32,
        conflicts: usize,
        no_room: usize,
    }

    pub fn run(settings: EngineSettings, clients: usize) -> Result<(), Box<dyn Error>> {
        let region = Region::from_svg_paths(CanvasSize::new(1000.0, 800.0), &EAGLE)?;
        let server = InMemoryPersistence::shared(ServerRules::from_settings(&region, &settings));
        let anchor = region.bounds().map(|b| b.lerp(Vec2::splat(0.5)));

        let engines: Vec<Client> = (0..clients)
            .map(|i| {
                let mut client_settings = settings.clone();
                client_settings.seed = settings.seed.map(|seed| seed.wrapping_add(i as u64));
                // Staggered latency so commits race
                let service = Delayed::new(Rc::clone(&server), (i % 4) as u32);
                StickerEngine::new(service, region.clone(), DeviceId::generate(), client_settings)
            })
            .collect();
        let feeds: Vec<Subscription> = engines
            .iter()
            .map(|_| InMemoryPersistence::subscribe(&server))
            .collect();

        log::info!("{clients} client(s) placing {STICKERS_PER_CLIENT} sticker(s) each");
        let outcomes = block_on(join_all(engines.iter().enumerate().map(
            |(i, engine)| async move {
                let mut results = Vec::with_capacity(STICKERS_PER_CLIENT);
                for n in 0..STICKERS_PER_CLIENT {
                    let note = format!("visitor {i}, sticker {n}");
                    results.push(engine.auto_place(&note, anchor).await);
                }
                results
            },
        )));

        let mut tally = Tally::default();
        for result in outcomes.into_iter().flatten() {
            match result {
                Ok(placed) => {
                    tally.placed += 1;
                    tally.attempts += placed.attempts;
                }
                Err(EngineError::Conflict { attempts, .. }) => {
                    tally.conflicts += 1;
                    tally.attempts += attempts;
                }
                Err(EngineError::NoFreeSpot) => tally.no_room += 1,
                Err(err) => return Err(err.into()),
            }
        }

        for (engine, feed) in engines.iter().zip(&feeds) {
            engine.pump(feed);
        }
        let counts: Vec<usize> = engines.iter().map(|e| e.record_count()).collect();
        if counts.iter().any(|c| *c != server.len()) {
            log::warn!("Clients disagree with the service: {counts:?} vs {}", server.len());
        }

        let canvas = region.canvas();
        let positions: Vec<Vec2> = server
            .rows()
            .iter()
            .map(|row| canvas.denormalize(Vec2::new(row.x_norm, row.y_norm)))
            .collect();
        let closest = positions
            .iter()
            .enumerate()
            .flat_map(|(i, a)| positions[i + 1..].iter().map(move |b| a.distance(*b)))
            .fold(f32::INFINITY, f32::min);

        log::info!(
            "Placed {} sticker(s) in {} attempt(s); {} gave up on conflicts, {} found no room",
            tally.placed,
            tally.attempts,
            tally.conflicts,
            tally.no_room
        );
        if closest < settings.min_separation {
            log::error!("Separation violated: closest pair {closest:.2}");
        } else if positions.len() > 1 {
            log::info!("Closest pair {closest:.2} (minimum {})", settings.min_separation);
        }

        match engines.first() {
            Some(engine) => println!("{}", serde_json::to_string_pretty(&engine.all_records())?),
            None => println!("[]"),
        }
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use stickerwall::EngineSettings;

    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let settings = args
        .first()
        .map(EngineSettings::load_or_default)
        .unwrap_or_default();
    let clients = args
        .get(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(demo::DEFAULT_CLIENTS);

    if let Err(err) = demo::run(settings, clients) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The engine is a library on the web; there is no demo to run
}
