//! Synthetic host for the scry feed.
//!
//! Walks a player through a procedural world, streams chunks, edits blocks
//! and renders a wandering herd, driving a [`Bridge`] the way a game client
//! would. With `--probe` it plays the overlay side instead.
//!
//! Run with `cargo run -p scry-sim` to host, and
//! `cargo run -p scry-sim -- --probe` in a second terminal to watch the feed.

mod mobs;
mod probe;
mod world;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scry_blocks::{BlockPos, ChunkPos, ScanGeometry, scan_chunk_for};
use scry_bridge::Bridge;
use scry_config::{CliArgs, Config, default_config_dir};
use scry_entities::{FixedFov, FrameOutcome};
use tracing::{debug, info, warn};

use crate::mobs::Herd;
use crate::world::{BEDROCK_Y, SURFACE_Y, SyntheticWorld};

const VIEW_RADIUS: i32 = 4;
const MOB_COUNT: usize = 40;
const TICKS_PER_SECOND: f64 = 20.0;
const WALK_SPEED: f64 = 4.3;
/// Simulated respawn period.
const RESPAWN_EVERY: Duration = Duration::from_secs(45);
/// Key held briefly every few seconds.
const SIMULATED_KEY: i32 = 82;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    scry_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let duration = args.duration.map(Duration::from_secs);
    if args.probe {
        let addr: SocketAddr =
            format!("{}:{}", config.network.bind_address, config.network.port).parse()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let tally = runtime.block_on(probe::run(addr, duration))?;
        info!("Probe finished: {tally:?}");
        return Ok(());
    }

    host(config, &args, duration)
}

fn host(
    config: Config,
    args: &CliArgs,
    duration: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    let geometry = ScanGeometry {
        min_y: config.scan.min_y,
        max_y: config.scan.max_y,
    };
    let world = Arc::new(SyntheticWorld::new(args.seed, VIEW_RADIUS));
    let bridge = Bridge::new(config, world.clone(), Arc::new(FixedFov::default()))?;
    bridge.add_connection_listener(|| info!("Overlay connected"));
    let addr = bridge.start()?;
    info!("Hosting feed on {addr} at {} fps", args.fps);

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut herd = Herd::new(args.seed, MOB_COUNT);
    let mut heading = DVec3::X;

    let first = world.move_player(world.player());
    for chunk in first.loaded {
        bridge.on_chunk_loaded(chunk);
    }

    let frame_time = Duration::from_secs_f64(1.0 / f64::from(args.fps.max(1)));
    let started = Instant::now();
    let mut last_respawn = Instant::now();
    let mut last_frame = Instant::now();
    let mut tick_accumulator = 0.0;
    let mut busy_frames = 0u64;

    while duration.is_none_or(|d| started.elapsed() < d) {
        let frame_start = Instant::now();
        let dt = frame_start.duration_since(last_frame).as_secs_f64();
        last_frame = frame_start;

        if !bridge.is_running() {
            if bridge.is_fully_disabled() {
                warn!("Feed fully disabled by the overlay, exiting");
                break;
            }
            std::thread::sleep(frame_time);
            continue;
        }

        if rng.random_bool(0.002) {
            heading = DVec3::new(rng.random_range(-1.0..1.0), 0.0, rng.random_range(-1.0..1.0))
                .normalize_or(DVec3::X);
        }
        let streaming = world.move_player(world.player() + heading * WALK_SPEED * dt);
        for chunk in streaming.unloaded {
            bridge.on_chunk_unloaded(chunk);
        }
        for chunk in streaming.loaded {
            bridge.on_chunk_loaded(chunk);
        }

        tick_accumulator += dt * TICKS_PER_SECOND;
        while tick_accumulator >= 1.0 {
            tick_accumulator -= 1.0;
            bridge.on_tick();
            edit_blocks(&world, &bridge, &mut rng);
        }

        if rng.random_bool(0.001) {
            carve_vein(&world, &bridge, &geometry, &mut rng);
        }

        if last_respawn.elapsed() >= RESPAWN_EVERY {
            last_respawn = Instant::now();
            bridge.on_world_reset();
        }

        let phase = started.elapsed().as_millis() % 5_000;
        bridge.poll_hotkeys(true, |key| key == SIMULATED_KEY && phase < 100);

        if bridge.on_frame(herd.step(dt, world.player())) == FrameOutcome::Busy {
            busy_frames += 1;
        }

        if let Some(rest) = frame_time.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    info!(
        "Simulation done after {:.1}s, {} chunks loaded, {} frames skipped while busy",
        started.elapsed().as_secs_f64(),
        world.loaded_count(),
        busy_frames
    );
    bridge.shutdown(false);
    Ok(())
}

/// Mine an ore or drop a fresh diamond somewhere loaded.
fn edit_blocks(world: &SyntheticWorld, bridge: &Bridge, rng: &mut StdRng) {
    if !rng.random_bool(0.1) {
        return;
    }
    if rng.random_bool(0.5) {
        if let Some(pos) = world.random_ore(rng)
            && let Some(label) = world.set_block(pos, None)
        {
            debug!("Mined {pos:?}");
            bridge.on_block_changed(pos, label);
        }
        return;
    }
    let player = world.player();
    let pos = BlockPos::new(
        player.x.floor() as i32 + rng.random_range(-32..32),
        rng.random_range(BEDROCK_Y..SURFACE_Y),
        player.z.floor() as i32 + rng.random_range(-32..32),
    );
    if let Some(label) = world.set_block(pos, Some("diamond_ore")) {
        debug!("Placed diamond at {pos:?}");
        bridge.on_block_changed(pos, label);
    }
}

/// Fill a small cube with gold, then report the whole chunk from a host-side
/// scan instead of per-block events.
fn carve_vein(world: &SyntheticWorld, bridge: &Bridge, geometry: &ScanGeometry, rng: &mut StdRng) {
    let player = world.player();
    let origin = BlockPos::new(
        player.x.floor() as i32 + rng.random_range(-24..24),
        rng.random_range(BEDROCK_Y..SURFACE_Y - 4),
        player.z.floor() as i32 + rng.random_range(-24..24),
    );
    let chunk = ChunkPos::containing(origin);
    for dx in 0..3 {
        for dy in 0..3 {
            for dz in 0..3 {
                let pos = BlockPos::new(origin.x + dx, origin.y + dy, origin.z + dz);
                if pos.chunk() == chunk {
                    world.set_block(pos, Some("gold_ore"));
                }
            }
        }
    }

    let labels: Vec<Arc<str>> = bridge
        .settings()
        .watch_list
        .read()
        .iter()
        .map(|label| Arc::from(label.as_str()))
        .collect();
    let observed = scan_chunk_for(world, chunk, geometry, &labels)
        .into_iter()
        .map(|(pos, label)| (pos, label.to_string()))
        .collect();
    debug!("Carved a gold vein in {chunk:?}");
    bridge.on_scan_results(chunk, observed);
}
