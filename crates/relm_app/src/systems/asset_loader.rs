//! Asynchronous asset loading through pending-state components.
//!
//! An entity with an `asset` and no loading state gets an `asset_loading`
//! component carrying a fresh request id, and a fetch is spawned on the tokio
//! runtime. Completions come back over a channel and are applied on a later
//! tick, but only if the entity still carries `asset_loading` with the same
//! request id. Removing `asset_loading` (or destroying the entity) therefore
//! cancels the fetch.

use std::time::Duration;

use relm_ecs::{EntityId, System, SystemContext, SystemDescriptor, TypedComponent};
use relm_schema::Schema;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::components::{Asset, AssetFailed, AssetLoaded, AssetLoading};
use crate::systems::declared;

/// Result of one fetch, as delivered back to the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub entity: EntityId,
    pub request: String,
    pub result: Result<u64, String>,
}

/// Simulated asset source. URLs under `missing/` fail; anything else
/// succeeds after `latency` with a size derived from the URL.
#[derive(Debug)]
pub struct AssetFetcher {
    latency: Duration,
    tx: mpsc::UnboundedSender<FetchOutcome>,
    rx: mpsc::UnboundedReceiver<FetchOutcome>,
    in_flight: usize,
}

impl AssetFetcher {
    pub fn new(latency: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            latency,
            tx,
            rx,
            in_flight: 0,
        }
    }

    /// Spawn a fetch. Must be called from within a tokio runtime.
    pub fn start(&mut self, entity: EntityId, request: String, url: String) {
        let tx = self.tx.clone();
        let latency = self.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let result = fetch(&url);
            if tx.send(FetchOutcome { entity, request, result }).is_err() {
                debug!(%url, "fetcher dropped before completion");
            }
        });
        self.in_flight += 1;
    }

    /// Every completion that has arrived so far.
    pub fn drain(&mut self) -> Vec<FetchOutcome> {
        let mut done = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            done.push(outcome);
        }
        self.in_flight = self.in_flight.saturating_sub(done.len());
        done
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

fn fetch(url: &str) -> Result<u64, String> {
    if url.starts_with("missing/") {
        return Err(format!("not found: {url}"));
    }
    Ok(url.len() as u64 * 1024)
}

pub struct AssetLoaderSystem {
    descriptor: SystemDescriptor,
}

impl AssetLoaderSystem {
    pub const NAME: &'static str = "asset_loader";

    pub fn from_schema(schema: &Schema) -> anyhow::Result<Self> {
        Ok(Self {
            descriptor: declared(schema, Self::NAME)?,
        })
    }

    fn resolve(ctx: &mut SystemContext<'_>, outcome: FetchOutcome) -> anyhow::Result<()> {
        let entity = outcome.entity;
        let current = if ctx.entities.contains(entity) {
            ctx.entities.read::<AssetLoading>(entity)?
        } else {
            None
        };
        match current {
            Some(loading) if loading.request == outcome.request => {}
            _ => {
                debug!(%entity, request = %outcome.request, "dropping stale asset result");
                return Ok(());
            }
        }

        ctx.entities.remove_component(entity, AssetLoading::kind_id())?;
        match outcome.result {
            Ok(bytes) => {
                ctx.entities.insert(entity, &AssetLoaded { bytes })?;
                info!(%entity, bytes, "asset loaded");
            }
            Err(reason) => {
                warn!(%entity, %reason, "asset failed to load");
                ctx.entities.insert(entity, &AssetFailed { reason })?;
            }
        }
        Ok(())
    }
}

impl System for AssetLoaderSystem {
    fn descriptor(&self) -> SystemDescriptor {
        self.descriptor.clone()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
        // Every drained outcome is applied even when one fails; the channel
        // has already given them up.
        let outcomes = ctx.services.require_mut::<AssetFetcher>()?.drain();
        let mut failures = Vec::new();
        for outcome in outcomes {
            let entity = outcome.entity;
            if let Err(err) = Self::resolve(ctx, outcome) {
                warn!(%entity, error = %err, "could not apply asset result");
                failures.push(err);
            }
        }

        for entity in ctx.query("pending")? {
            let Some(asset) = ctx.entities.read::<Asset>(entity)? else {
                continue;
            };
            let request = Uuid::new_v4().to_string();
            ctx.entities.insert(
                entity,
                &AssetLoading {
                    request: request.clone(),
                },
            )?;
            debug!(%entity, url = %asset.url, %request, "starting asset fetch");
            ctx.services
                .require_mut::<AssetFetcher>()?
                .start(entity, request, asset.url);
        }

        if let Some(first) = failures.first() {
            anyhow::bail!("{} asset result(s) could not be applied: {first}", failures.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::AssetKind;
    use crate::load_bundled_schema;
    use crate::systems::test_support;
    use relm_ecs::{EcsError, Services, World};

    fn world_with_asset(url: &str) -> (World, EntityId) {
        let schema = load_bundled_schema().unwrap();
        let mut world = test_support::world();
        world
            .add_system(AssetLoaderSystem::from_schema(&schema).unwrap())
            .unwrap();
        let e = world
            .entities_mut()
            .spawn()
            .with_typed(&Asset {
                url: url.to_string(),
                kind: AssetKind::Model,
            })
            .unwrap()
            .activate()
            .unwrap();
        let world = test_support::started(
            world,
            Services::new().with(AssetFetcher::new(Duration::ZERO)),
        );
        (world, e)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn fetcher(world: &World) -> &AssetFetcher {
        world.services().get::<AssetFetcher>().unwrap()
    }

    #[tokio::test]
    async fn test_loads_asset_on_later_tick() {
        let (mut world, e) = world_with_asset("models/tree.glb");

        world.update(0.016).unwrap();
        let loading = world.entities().read::<AssetLoading>(e).unwrap().unwrap();
        assert!(Uuid::parse_str(&loading.request).is_ok());
        assert_eq!(fetcher(&world).in_flight(), 1);

        settle().await;
        world.update(0.016).unwrap();
        assert!(world.entities().read::<AssetLoading>(e).unwrap().is_none());
        assert_eq!(
            world.entities().read::<AssetLoaded>(e).unwrap(),
            Some(AssetLoaded {
                bytes: "models/tree.glb".len() as u64 * 1024
            })
        );

        // Loaded assets are not fetched again.
        world.update(0.016).unwrap();
        assert_eq!(fetcher(&world).in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_retried() {
        let (mut world, e) = world_with_asset("missing/rock.glb");

        world.update(0.016).unwrap();
        settle().await;
        world.update(0.016).unwrap();
        let failed = world.entities().read::<AssetFailed>(e).unwrap().unwrap();
        assert!(failed.reason.contains("missing/rock.glb"));

        world.update(0.016).unwrap();
        assert_eq!(fetcher(&world).in_flight(), 0);
        assert!(world.entities().read::<AssetLoading>(e).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_result_is_dropped() {
        let (mut world, e) = world_with_asset("models/lamp.glb");

        world.update(0.016).unwrap();
        let entities = world.entities_mut();
        entities
            .remove_component(e, AssetLoading::kind_id())
            .unwrap();
        entities.remove_component(e, Asset::kind_id()).unwrap();

        settle().await;
        world.update(0.016).unwrap();
        assert!(world.entities().read::<AssetLoaded>(e).unwrap().is_none());
        assert_eq!(fetcher(&world).in_flight(), 0);
    }

    #[tokio::test]
    async fn test_restarted_fetch_ignores_older_result() {
        let (mut world, e) = world_with_asset("models/door.glb");

        world.update(0.016).unwrap();
        // Replace the pending request id; the first completion no longer
        // matches.
        world
            .entities_mut()
            .write::<AssetLoading, _>(e, |l| l.request = "superseded".into())
            .unwrap();

        settle().await;
        world.update(0.016).unwrap();
        let loading = world.entities().read::<AssetLoading>(e).unwrap().unwrap();
        assert_eq!(loading.request, "superseded");
        assert!(world.entities().read::<AssetLoaded>(e).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_bad_result_does_not_strand_the_rest() {
        let (mut world, a) = world_with_asset("models/chair.glb");
        let b = world
            .entities_mut()
            .spawn()
            .with_typed(&Asset {
                url: "models/table.glb".into(),
                kind: AssetKind::Model,
            })
            .unwrap()
            .activate()
            .unwrap();
        let c = world
            .entities_mut()
            .spawn()
            .with_typed(&Asset {
                url: "models/bench.glb".into(),
                kind: AssetKind::Model,
            })
            .unwrap()
            .activate()
            .unwrap();

        world.update(0.016).unwrap();
        assert_eq!(fetcher(&world).in_flight(), 3);
        // Something else already marked `a` as loaded, so applying its
        // result collides.
        world
            .entities_mut()
            .insert(a, &AssetLoaded { bytes: 7 })
            .unwrap();

        settle().await;
        assert!(matches!(
            world.update(0.016),
            Err(EcsError::SystemFailed { .. })
        ));
        assert_eq!(fetcher(&world).in_flight(), 0);
        for e in [b, c] {
            assert!(world.entities().read::<AssetLoading>(e).unwrap().is_none());
            assert!(world.entities().read::<AssetLoaded>(e).unwrap().is_some());
        }
        assert_eq!(
            world.entities().read::<AssetLoaded>(a).unwrap(),
            Some(AssetLoaded { bytes: 7 })
        );

        // Nothing is left to apply on the following tick.
        world.update(0.016).unwrap();
    }

    #[tokio::test]
    async fn test_missing_fetcher_fails_the_tick() {
        let schema = load_bundled_schema().unwrap();
        let mut world = test_support::world();
        world
            .add_system(AssetLoaderSystem::from_schema(&schema).unwrap())
            .unwrap();
        let mut world = test_support::started(world, Services::new());
        assert!(matches!(
            world.update(0.016),
            Err(EcsError::SystemFailed { .. })
        ));
        assert_eq!(world.version(), 1);
    }
}
