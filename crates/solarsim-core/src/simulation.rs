//! Simulation parameter model and the edit guard that keeps poll data from
//! overwriting a value the user is still dragging.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{FetchError, FetchErrorKind};
use crate::request::{BrpError, BrpRequest, GetResources, MutateResources};
use crate::transport::Transport;

/// Type path of the resource holding every simulation field.
pub const SIMULATION_CONFIG_RESOURCE: &str =
    "solarsim_server::simulation::simulation_config::SimulationConfig";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimulationFieldKind {
    /// Editable by the user.
    Slider,
    /// Written only by the simulation.
    #[default]
    ReadOnly,
}

/// One named parameter or result of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationField {
    pub kind: SimulationFieldKind,
    pub max: f64,
    pub min: f64,
    pub value: f64,
}

impl SimulationField {
    pub fn is_editable(&self) -> bool {
        self.kind == SimulationFieldKind::Slider
    }

    /// A copy holding `value` clamped into the field's range.
    pub fn with_value(self, value: f64) -> Self {
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        Self {
            value: value.clamp(lo, hi),
            ..self
        }
    }
}

impl fmt::Display for SimulationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.value)
    }
}

/// Every field of the simulation config, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulationFields(BTreeMap<String, SimulationField>);

impl SimulationFields {
    /// Decode the `value` of a `world.get_resources` result.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn get(&self, name: &str) -> Option<&SimulationField> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SimulationField)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Editable parameters.
    pub fn sliders(&self) -> impl Iterator<Item = (&str, &SimulationField)> {
        self.iter().filter(|(_, f)| f.is_editable())
    }

    /// Results computed by the simulation.
    pub fn read_only(&self) -> impl Iterator<Item = (&str, &SimulationField)> {
        self.iter().filter(|(_, f)| !f.is_editable())
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut SimulationField> {
        self.0.get_mut(name)
    }
}

impl FromIterator<(String, SimulationField)> for SimulationFields {
    fn from_iter<I: IntoIterator<Item = (String, SimulationField)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The request that reads the whole simulation config.
pub fn fetch_fields_request(id: impl Into<Value>, resource: &str) -> BrpRequest<GetResources> {
    BrpRequest::new(
        id,
        GetResources {
            resource: resource.to_string(),
        },
    )
}

/// Why a read of the simulation fields produced no fields.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Server(BrpError),

    #[error("server returned an empty result")]
    Empty,

    #[error("malformed simulation fields: {0}")]
    Malformed(String),
}

impl LoadError {
    /// Text shown to an end user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Fetch(e) => e.user_message(),
            Self::Server(_) | Self::Empty | Self::Malformed(_) => {
                FetchErrorKind::InvalidContent.user_message()
            }
        }
    }
}

/// Read and decode every simulation field in one round trip.
pub async fn load_fields<T: Transport>(
    transport: &T,
    resource: &str,
) -> Result<SimulationFields, LoadError> {
    let reply = transport.send(&fetch_fields_request(0, resource)).await?;
    let result = reply
        .data
        .into_result()
        .map_err(LoadError::Server)?
        .ok_or(LoadError::Empty)?;
    SimulationFields::from_value(result.value).map_err(|e| LoadError::Malformed(e.to_string()))
}

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("no simulation data has been received yet")]
    NotLoaded,

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{0}' is read-only")]
    ReadOnly(String),

    #[error("value for '{name}' is not a finite number")]
    InvalidValue { name: String },

    #[error("failed to encode field: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Local copy of the simulation fields plus the edit-in-progress flag.
///
/// While an edit is in progress, polled snapshots are dropped so the value
/// under the user's pointer does not jump back to the server's value.
#[derive(Debug, Clone)]
pub struct ControlPanel {
    resource: String,
    fields: Option<SimulationFields>,
    interacting: bool,
}

impl ControlPanel {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            fields: None,
            interacting: false,
        }
    }

    pub fn fields(&self) -> Option<&SimulationFields> {
        self.fields.as_ref()
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_interacting(&self) -> bool {
        self.interacting
    }

    /// Take a polled snapshot. Returns `false` if it was dropped because an
    /// edit is in progress.
    pub fn apply_poll(&mut self, fields: SimulationFields) -> bool {
        if self.interacting {
            tracing::trace!("edit in progress, dropping polled snapshot");
            return false;
        }
        self.fields = Some(fields);
        true
    }

    pub fn begin_edit(&mut self) {
        self.interacting = true;
    }

    /// Abandon the edit without sending anything. The next poll restores the
    /// server's values.
    pub fn cancel_edit(&mut self) {
        self.interacting = false;
    }

    /// Update the local value while the user drags. Nothing is sent.
    pub fn preview(&mut self, name: &str, value: f64) -> Result<SimulationField, PanelError> {
        let field = self.editable_mut(name, value)?;
        *field = field.with_value(value);
        Ok(*field)
    }

    /// Finish the edit and build the mutation that pushes it to the server.
    ///
    /// The edit flag is cleared even when the field is rejected.
    pub fn commit(
        &mut self,
        id: impl Into<Value>,
        name: &str,
        value: f64,
    ) -> Result<BrpRequest<MutateResources>, PanelError> {
        self.interacting = false;
        let field = self.editable_mut(name, value)?;
        *field = field.with_value(value);
        let encoded = serde_json::to_value(*field)?;

        Ok(BrpRequest::new(
            id,
            MutateResources {
                resource: self.resource.clone(),
                path: format!(".{name}"),
                value: encoded,
            },
        ))
    }

    fn editable_mut(&mut self, name: &str, value: f64) -> Result<&mut SimulationField, PanelError> {
        if !value.is_finite() {
            return Err(PanelError::InvalidValue {
                name: name.to_string(),
            });
        }
        let fields = self.fields.as_mut().ok_or(PanelError::NotLoaded)?;
        let field = fields
            .get_mut(name)
            .ok_or_else(|| PanelError::UnknownField(name.to_string()))?;
        if !field.is_editable() {
            return Err(PanelError::ReadOnly(name.to_string()));
        }
        Ok(field)
    }
}

impl Default for ControlPanel {
    fn default() -> Self {
        Self::new(SIMULATION_CONFIG_RESOURCE)
    }
}
