//! relm demo host.
//!
//! Loads component and system declarations from `.relm` files, builds a
//! world with a camera and a field of drifting props, and drives it at a
//! fixed tick rate. Props wander out of the camera's cull radius and are
//! deactivated; each prop also loads a simulated asset in the background.

mod components;
mod systems;
mod tick;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use glam::Vec3;
use relm_ecs::{
    EntityId, FailurePolicy, Services, TypedComponent, World, WorldConfig,
};
use relm_schema::Schema;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use components::{Asset, AssetKind, AssetLoaded, Cullable, Transform, Velocity};
use systems::{
    AssetFetcher, AssetLoaderSystem, CameraCullingSystem, CullingSettings, MovementSystem,
};
use tick::{TickConfig, TickLoop};

#[derive(Parser, Debug)]
#[command(name = "relm_app", about = "Reactive ECS world demo host")]
struct Args {
    /// Directory of `.relm` schema files (defaults to the bundled schema).
    #[arg(short, long)]
    schema_dir: Option<PathBuf>,

    /// Target ticks per second.
    #[arg(short, long, default_value_t = 60.0, value_parser = parse_tick_rate)]
    tick_rate: f64,

    /// Stop after this many ticks (0 = run forever).
    #[arg(short, long, default_value_t = 600)]
    max_ticks: u64,

    /// Number of props to spawn.
    #[arg(short, long, default_value_t = 16)]
    entities: usize,

    /// Props farther than this from the camera get culled.
    #[arg(long, default_value_t = 25.0)]
    cull_radius: f32,

    /// World versions a prop may stay out of range before it is culled.
    #[arg(long, default_value_t = 30)]
    grace_ticks: u64,

    /// Keep running the remaining systems when one fails.
    #[arg(long)]
    continue_on_error: bool,
}

fn parse_tick_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|e| format!("{e}"))?;
    let config = TickConfig {
        tick_rate: rate,
        max_ticks: 0,
    };
    config.tick_duration().map_err(|e| e.to_string())?;
    Ok(rate)
}

fn bundled_schema_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("schema")
}

pub(crate) fn load_schema(dir: &Path) -> anyhow::Result<Schema> {
    let mut schema = Schema::new();
    let files = schema.load_dir(dir)?;
    if files == 0 {
        anyhow::bail!("no .relm files in {}", dir.display());
    }
    info!(dir = %dir.display(), files, components = schema.components.len(), "loaded schema");
    Ok(schema)
}

pub(crate) fn load_bundled_schema() -> anyhow::Result<Schema> {
    load_schema(&bundled_schema_dir())
}

/// Camera at the origin, props on a ring drifting outward at varied speeds.
/// Every fifth prop points at an asset that does not exist.
fn populate(world: &mut World, props: usize) -> anyhow::Result<(EntityId, Vec<EntityId>)> {
    let entities = world.entities_mut();
    let camera = entities
        .spawn()
        .named("camera")?
        .with("camera", Value::Null)?
        .with_typed(&Transform::default())?
        .activate()?;

    let mut spawned = Vec::with_capacity(props);
    for i in 0..props {
        let angle = i as f32 / props.max(1) as f32 * std::f32::consts::TAU;
        let dir = Vec3::new(angle.cos(), 0.0, angle.sin());
        let speed = 1.0 + (i % 4) as f32;
        let url = if i % 5 == 4 {
            format!("missing/prop_{i}.glb")
        } else {
            format!("props/prop_{i}.glb")
        };
        let id = entities
            .spawn()
            .named(format!("prop_{i}"))?
            .with_typed(&Transform {
                position: dir * 5.0,
                scale: 1.0,
            })?
            .with_typed(&Velocity {
                linear: dir * speed,
            })?
            .with_typed(&Cullable { last_seen: 0 })?
            .with_typed(&Asset {
                url,
                kind: AssetKind::Model,
            })?
            .activate()?;
        spawned.push(id);
    }
    Ok((camera, spawned))
}

fn summarize(world: &World, props: &[EntityId]) {
    let entities = world.entities();
    let active = props.iter().filter(|&&p| entities.is_active(p)).count();
    let loaded = entities.get_all_by_component(AssetLoaded::kind_id()).len();
    let fetching = world
        .services()
        .get::<AssetFetcher>()
        .map_or(0, AssetFetcher::in_flight);
    info!(
        version = world.version(),
        props = props.len(),
        active,
        culled = props.len() - active,
        loaded,
        fetching,
        "world summary"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relm_app=info".parse()?))
        .init();

    let args = Args::parse();
    let schema_dir = args.schema_dir.unwrap_or_else(bundled_schema_dir);
    let schema = load_schema(&schema_dir)?;

    let failure_policy = if args.continue_on_error {
        FailurePolicy::ContinueTick
    } else {
        FailurePolicy::AbortTick
    };
    let mut world = World::new(WorldConfig { failure_policy });
    let kinds = world.load_schema(&schema)?;
    info!(kinds = kinds.len(), "registered component kinds");

    world.add_system(CameraCullingSystem::from_schema(&schema)?)?;
    world.add_system(MovementSystem::from_schema(&schema)?)?;
    world.add_system(AssetLoaderSystem::from_schema(&schema)?)?;
    info!(order = ?world.system_names(), "systems scheduled");

    let services = Services::new()
        .with(AssetFetcher::new(Duration::from_millis(250)))
        .with(CullingSettings {
            radius: args.cull_radius,
            grace_ticks: args.grace_ticks,
        });
    world.init(services)?;

    let (camera, props) = populate(&mut world, args.entities)?;
    info!(%camera, props = props.len(), "world populated");

    let mut tick_loop = TickLoop::new(TickConfig {
        tick_rate: args.tick_rate,
        max_ticks: args.max_ticks,
    });
    tick_loop.run(&mut world).await?;

    let stats = tick_loop.stats();
    info!(ticks = stats.ticks, failed = stats.failed_ticks, overruns = stats.overruns, "stopped");
    summarize(&world, &props);
    Ok(())
}
