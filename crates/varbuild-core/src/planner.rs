//! Variant planning
//!
//! Expands a sweep into concrete variants. Explicit points come first in
//! declaration order, followed by the cartesian product of the axes with the
//! first axis varying slowest. Build modes form the outermost axis.

use crate::error::{EngineError, PlanError};
use crate::types::{Bindings, BuildMode, Expectation, ResourceAssignment, Variant, VariantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// A named list of values swept over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// Placeholder name
    pub name: String,
    /// Values, JSON scalars
    pub values: Vec<Value>,
}

/// Declared parameter space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSpec {
    /// Explicit binding sets
    #[serde(default)]
    pub points: Vec<BTreeMap<String, Value>>,
    /// Axes expanded as a cartesian product
    #[serde(default)]
    pub axes: Vec<Axis>,
    /// Build modes, outermost axis
    #[serde(default = "default_modes")]
    pub modes: Vec<BuildMode>,
    /// Devices handed to each variant
    #[serde(default = "default_devices_per_variant")]
    pub devices_per_variant: usize,
    /// Output check; `value` is rendered with each variant's bindings
    #[serde(default)]
    pub expectation: Option<Expectation>,
}

fn default_modes() -> Vec<BuildMode> {
    vec![BuildMode::Parallel]
}

fn default_devices_per_variant() -> usize {
    1
}

impl Default for SweepSpec {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            axes: Vec::new(),
            modes: default_modes(),
            devices_per_variant: default_devices_per_variant(),
            expectation: None,
        }
    }
}

impl SweepSpec {
    /// Create an empty sweep
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an explicit binding set
    #[must_use]
    pub fn with_point<K, V>(mut self, bindings: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.points.push(
            bindings
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Add an axis
    #[must_use]
    pub fn with_axis<V: Into<Value>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.axes.push(Axis {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// With build modes
    #[inline]
    #[must_use]
    pub fn with_modes(mut self, modes: impl Into<Vec<BuildMode>>) -> Self {
        self.modes = modes.into();
        self
    }

    /// With devices per variant
    #[inline]
    #[must_use]
    pub fn with_devices_per_variant(mut self, n: usize) -> Self {
        self.devices_per_variant = n;
        self
    }

    /// With output expectation
    #[inline]
    #[must_use]
    pub fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectation = Some(expectation);
        self
    }

    /// Load a sweep from a `.toml` or `.json` file
    ///
    /// # Errors
    /// I/O or decoding failure
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "toml") {
            Ok(toml::from_str(&text)?)
        } else {
            Ok(serde_json::from_str(&text)?)
        }
    }

    /// Number of variants this sweep expands to
    #[must_use]
    pub fn variant_count(&self) -> usize {
        let product = if self.axes.is_empty() {
            0
        } else {
            self.axes.iter().map(|axis| axis.values.len()).product()
        };
        (self.points.len() + product) * self.modes.len()
    }

    fn binding_sets(&self) -> Result<Vec<Bindings>, PlanError> {
        let mut seen = HashSet::new();
        for axis in &self.axes {
            if !seen.insert(axis.name.as_str()) {
                return Err(PlanError::DuplicateAxis(axis.name.clone()));
            }
        }

        let mut sets = Vec::new();
        for point in &self.points {
            let mut bindings = Bindings::new();
            for (name, value) in point {
                bindings.insert(name.clone(), scalar_text(name, value)?);
            }
            sets.push(bindings);
        }

        if self.axes.is_empty() {
            return Ok(sets);
        }

        let mut product = vec![Bindings::new()];
        for axis in &self.axes {
            let texts = axis
                .values
                .iter()
                .map(|value| scalar_text(&axis.name, value))
                .collect::<Result<Vec<_>, _>>()?;
            product = product
                .iter()
                .flat_map(|prefix| {
                    texts.iter().map(move |text| {
                        let mut bindings = prefix.clone();
                        bindings.insert(axis.name.clone(), text.clone());
                        bindings
                    })
                })
                .collect();
        }
        sets.extend(product);
        Ok(sets)
    }
}

/// Literal text of a scalar binding value
fn scalar_text(name: &str, value: &Value) -> Result<String, PlanError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err(invalid(name, "null")),
        Value::Array(_) => Err(invalid(name, "array")),
        Value::Object(_) => Err(invalid(name, "object")),
    }
}

fn invalid(name: &str, kind: &str) -> PlanError {
    PlanError::InvalidBinding {
        name: name.to_string(),
        reason: format!("{kind} is not a scalar value"),
    }
}

/// Planner state carried across `plan` calls
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlanState {
    base_id: u64,
    next_id: u64,
    devices: Vec<String>,
}

impl PlanState {
    /// Start numbering at `base_id`
    #[inline]
    #[must_use]
    pub fn new(base_id: u64) -> Self {
        Self {
            base_id,
            next_id: base_id,
            devices: Vec::new(),
        }
    }

    /// With device pool
    #[inline]
    #[must_use]
    pub fn with_devices(mut self, devices: Vec<String>) -> Self {
        self.devices = devices;
        self
    }

    /// First id handed out
    #[inline]
    #[must_use]
    pub fn base_id(&self) -> u64 {
        self.base_id
    }

    /// Id the next variant will receive
    #[inline]
    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Device pool
    #[inline]
    #[must_use]
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    fn assign(&self, id: u64, per_variant: usize) -> Option<ResourceAssignment> {
        if self.devices.is_empty() {
            return None;
        }
        let len = self.devices.len();
        let k = usize::try_from(id - self.base_id).unwrap_or(usize::MAX);
        let start = k.wrapping_mul(per_variant) % len;
        let devices = (0..per_variant)
            .map(|offset| self.devices[(start + offset) % len].clone())
            .collect();
        Some(ResourceAssignment(devices))
    }
}

/// Ordered list of planned variants
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Plan {
    /// Variants in id order
    pub variants: Vec<Variant>,
}

impl Plan {
    /// Number of variants
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Whether the plan is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Variant ids in order
    #[must_use]
    pub fn ids(&self) -> Vec<VariantId> {
        self.variants.iter().map(|v| v.id).collect()
    }

    /// Drop variants whose id satisfies `skip`
    #[must_use]
    pub fn without(mut self, skip: impl Fn(VariantId) -> bool) -> Self {
        self.variants.retain(|v| !skip(v.id));
        self
    }
}

/// Expands sweeps into variants
#[derive(Debug, Default)]
pub struct Planner {
    state: PlanState,
}

impl Planner {
    /// Create planner owning `state`
    #[inline]
    #[must_use]
    pub fn new(state: PlanState) -> Self {
        Self { state }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> &PlanState {
        &self.state
    }

    /// Expand a sweep into variants
    ///
    /// Ids continue from where the previous call stopped. On error no id is
    /// consumed.
    ///
    /// # Errors
    /// - `PlanError::ZeroDevicesPerVariant` if `devices_per_variant` is 0
    /// - `PlanError::DuplicateAxis`, `PlanError::InvalidBinding` for bad axes
    /// - `PlanError::EmptySweep` if the sweep expands to nothing
    /// - `PlanError::Expectation` if the expected value cannot be rendered
    pub fn plan(&mut self, sweep: &SweepSpec) -> Result<Plan, PlanError> {
        if sweep.devices_per_variant == 0 {
            return Err(PlanError::ZeroDevicesPerVariant);
        }
        let sets = sweep.binding_sets()?;
        if sets.is_empty() || sweep.modes.is_empty() {
            return Err(PlanError::EmptySweep);
        }

        let mut next = self.state.next_id;
        let mut variants = Vec::with_capacity(sets.len() * sweep.modes.len());
        for &mode in &sweep.modes {
            for bindings in &sets {
                let id = VariantId(next);
                let expectation = sweep
                    .expectation
                    .as_ref()
                    .map(|exp| {
                        varbuild_template::render(&exp.value, bindings)
                            .map(|value| Expectation::new(exp.locator.clone(), value))
                            .map_err(|source| PlanError::Expectation { id, source })
                    })
                    .transpose()?;
                variants.push(Variant {
                    id,
                    bindings: bindings.clone(),
                    resource: self.state.assign(next, sweep.devices_per_variant),
                    mode,
                    expectation,
                });
                next += 1;
            }
        }

        tracing::debug!(
            first_id = self.state.next_id,
            count = variants.len(),
            "sweep planned"
        );
        self.state.next_id = next;
        Ok(Plan { variants })
    }
}
