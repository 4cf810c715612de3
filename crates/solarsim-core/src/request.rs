//! Bevy Remote Protocol (BRP) wire types.
//!
//! BRP is JSON-RPC 2.0 over HTTP POST. Each params type implements
//! [`BrpParams`], which ties it to exactly one [`BrpMethod`] and one result
//! shape, so `BrpRequest<GetResources>` can only ever be answered by a
//! `BrpResponse<GetResourcesResult>`. Methods without a params type are
//! reserved: no request for them can be built.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The protocol version tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Every method the remote protocol defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrpMethod {
    #[serde(rename = "world.get_components")]
    GetComponents,
    #[serde(rename = "world.query")]
    Query,
    #[serde(rename = "world.spawn_entity")]
    SpawnEntity,
    #[serde(rename = "world.despawn_entity")]
    DespawnEntity,
    #[serde(rename = "world.remove_components")]
    RemoveComponents,
    #[serde(rename = "world.insert_components")]
    InsertComponents,
    #[serde(rename = "world.mutate_components")]
    MutateComponents,
    #[serde(rename = "world.reparent_entities")]
    ReparentEntities,
    #[serde(rename = "world.list_components")]
    ListComponents,
    #[serde(rename = "world.get_components+watch")]
    GetComponentsWatch,
    #[serde(rename = "world.list_components+watch")]
    ListComponentsWatch,
    #[serde(rename = "world.get_resources")]
    GetResources,
    #[serde(rename = "world.insert_resources")]
    InsertResources,
    #[serde(rename = "world.remove_resources")]
    RemoveResources,
    #[serde(rename = "world.mutate_resources")]
    MutateResources,
    #[serde(rename = "world.list_resources")]
    ListResources,
    #[serde(rename = "registry.schema")]
    RegistrySchema,
    #[serde(rename = "rpc.discover")]
    Discover,
}

impl BrpMethod {
    pub const ALL: [BrpMethod; 18] = [
        Self::GetComponents,
        Self::Query,
        Self::SpawnEntity,
        Self::DespawnEntity,
        Self::RemoveComponents,
        Self::InsertComponents,
        Self::MutateComponents,
        Self::ReparentEntities,
        Self::ListComponents,
        Self::GetComponentsWatch,
        Self::ListComponentsWatch,
        Self::GetResources,
        Self::InsertResources,
        Self::RemoveResources,
        Self::MutateResources,
        Self::ListResources,
        Self::RegistrySchema,
        Self::Discover,
    ];

    /// The method name as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetComponents => "world.get_components",
            Self::Query => "world.query",
            Self::SpawnEntity => "world.spawn_entity",
            Self::DespawnEntity => "world.despawn_entity",
            Self::RemoveComponents => "world.remove_components",
            Self::InsertComponents => "world.insert_components",
            Self::MutateComponents => "world.mutate_components",
            Self::ReparentEntities => "world.reparent_entities",
            Self::ListComponents => "world.list_components",
            Self::GetComponentsWatch => "world.get_components+watch",
            Self::ListComponentsWatch => "world.list_components+watch",
            Self::GetResources => "world.get_resources",
            Self::InsertResources => "world.insert_resources",
            Self::RemoveResources => "world.remove_resources",
            Self::MutateResources => "world.mutate_resources",
            Self::ListResources => "world.list_resources",
            Self::RegistrySchema => "registry.schema",
            Self::Discover => "rpc.discover",
        }
    }

    /// Look a method up by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    /// Returns `true` if this client has a params type for the method.
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            Self::GetComponents | Self::GetResources | Self::MutateResources
        )
    }
}

impl fmt::Display for BrpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method-specific request parameters.
///
/// The associated constant and type form the method → response table.
pub trait BrpParams: Serialize + Send + Sync + 'static {
    const METHOD: BrpMethod;
    type Result: DeserializeOwned + Send + 'static;
}

/// `world.get_resources`: read one resource by type path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetResources {
    pub resource: String,
}

/// Result of `world.get_resources`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetResourcesResult {
    pub value: Value,
}

impl BrpParams for GetResources {
    const METHOD: BrpMethod = BrpMethod::GetResources;
    type Result = GetResourcesResult;
}

/// `world.mutate_resources`: overwrite the value at `path` inside a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutateResources {
    pub resource: String,
    /// Reflection path, e.g. `.ambient_temp`.
    pub path: String,
    pub value: Value,
}

impl BrpParams for MutateResources {
    const METHOD: BrpMethod = BrpMethod::MutateResources;
    type Result = ();
}

/// `world.get_components`: read components of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetComponents {
    pub entity: String,
    pub components: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Result of `world.get_components`. The shape depends on `strict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GetComponentsResult {
    /// Returned when `strict` is `true`.
    Strict {
        components: BTreeMap<String, Value>,
        errors: BTreeMap<String, String>,
    },
    /// Returned when `strict` is `false` or absent.
    Lenient(BTreeMap<String, Value>),
}

impl BrpParams for GetComponents {
    const METHOD: BrpMethod = BrpMethod::GetComponents;
    type Result = GetComponentsResult;
}

/// A BRP request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrpRequest<P> {
    pub jsonrpc: String,
    /// Correlation id, echoed back by the server and never interpreted here.
    pub id: Value,
    pub method: BrpMethod,
    pub params: P,
}

impl<P: BrpParams> BrpRequest<P> {
    pub fn new(id: impl Into<Value>, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: id.into(),
            method: P::METHOD,
            params,
        }
    }
}

/// A method-level error object returned inside a 2xx body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrpError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for BrpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BRP error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for BrpError {}

fn default_version() -> String {
    JSONRPC_VERSION.into()
}

/// A BRP response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrpResponse<R> {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<R>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BrpError>,
}

impl<R> BrpResponse<R> {
    /// Returns `true` if the server did not report an error object.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Split into the result or the server-side error.
    ///
    /// Methods whose result is `null` on the wire yield `Ok(None)`.
    pub fn into_result(self) -> Result<Option<R>, BrpError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result),
        }
    }
}
