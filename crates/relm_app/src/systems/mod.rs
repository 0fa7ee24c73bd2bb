//! Demo systems hosted by the runtime.

pub mod asset_loader;
pub mod culling;
pub mod movement;

use relm_ecs::SystemDescriptor;
use relm_schema::Schema;

pub use asset_loader::{AssetFetcher, AssetLoaderSystem};
pub use culling::{CameraCullingSystem, CullingSettings};
pub use movement::MovementSystem;

/// Look up a system's declaration in the loaded schema.
pub(crate) fn declared(schema: &Schema, name: &str) -> anyhow::Result<SystemDescriptor> {
    let def = schema
        .get_system(name)
        .ok_or_else(|| anyhow::anyhow!("schema declares no system '{name}'"))?;
    Ok(SystemDescriptor::from_def(def)?)
}
