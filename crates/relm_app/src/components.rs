//! Typed views of the bundled schema's components.

use glam::Vec3;
use relm_ecs::TypedComponent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: 1.0,
        }
    }
}

impl TypedComponent for Transform {
    fn kind_name() -> &'static str {
        "transform"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec3,
}

impl TypedComponent for Velocity {
    fn kind_name() -> &'static str {
        "velocity"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cullable {
    /// World version at which the entity was last within the cull radius.
    pub last_seen: u64,
}

impl TypedComponent for Cullable {
    fn kind_name() -> &'static str {
        "cullable"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Model,
    Texture,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub url: String,
    pub kind: AssetKind,
}

impl TypedComponent for Asset {
    fn kind_name() -> &'static str {
        "asset"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetLoading {
    /// Id of the in-flight fetch this entity is waiting for.
    pub request: String,
}

impl TypedComponent for AssetLoading {
    fn kind_name() -> &'static str {
        "asset_loading"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetLoaded {
    pub bytes: u64,
}

impl TypedComponent for AssetLoaded {
    fn kind_name() -> &'static str {
        "asset_loaded"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetFailed {
    pub reason: String,
}

impl TypedComponent for AssetFailed {
    fn kind_name() -> &'static str {
        "asset_failed"
    }
}
