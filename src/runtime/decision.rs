//! Runtime device selection.
//!
//! Every offloaded call scores the four device classes. Chances start from
//! fixed priors, then accumulate bonuses for data already resident on a
//! device, for the total data volume, for staying on the current device and
//! penalties for unavailable devices. The highest chance wins. When the
//! winner changes, buffers on the previous device are written back before
//! the next kernel runs.

use crate::ir::chain::{CallChain, CallChainEntry};
use crate::ir::summary::{RegionSummary, RegionSummaryMap};
use crate::ir::transfer::DeviceClass;
use crate::runtime::device::{DeviceBuffer, DeviceSet};
use crate::runtime::size::resolve_transfer_size;
use crate::utils::errors::{RuntimeError, RuntimeErrorKind};
use crate::utils::intern::BufferId;
use log::{debug, info};
use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Device selection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Target {
    /// Decide per call from the chance scores
    #[default]
    Auto,
    /// Always use this device
    Fixed(DeviceClass),
}

impl FromStr for Target {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Target::Auto),
            "leg" | "legacy" => Ok(Target::Fixed(DeviceClass::Legacy)),
            "mcpu" | "cpu" => Ok(Target::Fixed(DeviceClass::MultiCore)),
            "gpu" => Ok(Target::Fixed(DeviceClass::Gpu)),
            "mic" => Ok(Target::Fixed(DeviceClass::ManyCore)),
            other => Err(RuntimeError::new(
                RuntimeErrorKind::UnknownTarget,
                format!("unknown target '{}'", other),
            )),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Auto => write!(f, "auto"),
            Target::Fixed(d) => write!(f, "{}", d),
        }
    }
}

/// Scoring constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionWeights {
    /// Starting chance per device class
    pub priors: [f64; 4],
    /// Added to the first device already holding a buffer of the call
    pub on_device_bonus: f64,
    /// Total element count above which the data counts as big
    pub big_data_threshold: i64,
    /// Added for big data, subtracted otherwise
    pub big_data_shift: [f64; 4],
    /// Added to the current device
    pub last_accelerator_bonus: f64,
    /// Subtracted from unavailable devices
    pub unavailable_penalty: f64,
}

impl Default for DecisionWeights {
    fn default() -> Self {
        Self {
            priors: [0.0, 0.05, 0.15, 0.1],
            on_device_bonus: 0.3,
            big_data_threshold: 1 << 20,
            big_data_shift: [-0.2, -0.1, 0.2, 0.15],
            last_accelerator_bonus: 0.5,
            unavailable_penalty: 3.0,
        }
    }
}

/// Outcome of one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub device: DeviceClass,
    pub previous: DeviceClass,
}

impl Decision {
    pub fn switched(&self) -> bool {
        self.device != self.previous
    }
}

/// Decision state for one accelerated execution.
pub struct DecisionContext {
    weights: DecisionWeights,
    devices: Arc<DeviceSet>,
    chances: [f64; 4],
    sum: i64,
    current: DeviceClass,
    previous: DeviceClass,
    call_count: u64,
    switch_position: Option<u64>,
}

impl DecisionContext {
    pub fn new(devices: Arc<DeviceSet>, weights: DecisionWeights) -> Self {
        Self {
            chances: weights.priors,
            weights,
            devices,
            sum: 0,
            current: DeviceClass::Legacy,
            previous: DeviceClass::Legacy,
            call_count: 0,
            switch_position: None,
        }
    }

    pub fn devices(&self) -> &DeviceSet {
        &self.devices
    }

    pub fn chance(&self, class: DeviceClass) -> f64 {
        self.chances[class.index()]
    }

    pub fn sum(&self) -> i64 {
        self.sum
    }

    pub fn current_accelerator(&self) -> DeviceClass {
        self.current
    }

    pub fn previous_accelerator(&self) -> DeviceClass {
        self.previous
    }

    pub fn call_count(&self) -> u64 {
        self.call_count
    }

    /// Call number of the last device switch.
    pub fn switch_position(&self) -> Option<u64> {
        self.switch_position
    }

    pub fn is_legacy(&self) -> bool {
        self.current == DeviceClass::Legacy
    }

    pub fn init_chance(&mut self) {
        self.chances = self.weights.priors;
        self.sum = 0;
    }

    pub fn add_to_sum(&mut self, size: i64) {
        self.sum = self.sum.saturating_add(size);
    }

    pub fn bonus_if_on_device(&mut self, buffer: BufferId) {
        if let Some(holder) = self.devices.holder_of(buffer) {
            self.chances[holder.index()] += self.weights.on_device_bonus;
        }
    }

    fn bonus_big_data(&mut self) {
        let sign = if self.sum > self.weights.big_data_threshold { 1.0 } else { -1.0 };
        for (chance, shift) in self.chances.iter_mut().zip(self.weights.big_data_shift) {
            *chance += sign * shift;
        }
    }

    fn bonus_last_accelerator(&mut self) {
        self.chances[self.current.index()] += self.weights.last_accelerator_bonus;
    }

    fn bonus_if_available(&mut self) {
        for class in DeviceClass::ACCELERATORS {
            if !self.devices.is_available(class) {
                self.chances[class.index()] -= self.weights.unavailable_penalty;
            }
        }
    }

    /// Highest chance wins; ties go to the class checked first
    /// (legacy, multi-core, GPU, many-core).
    fn best_device(&self) -> DeviceClass {
        let [leg, cpu, gpu, mic] = self.chances;
        if leg >= cpu && leg >= gpu && leg >= mic {
            DeviceClass::Legacy
        } else if cpu >= gpu && cpu >= mic {
            DeviceClass::MultiCore
        } else if gpu >= mic {
            DeviceClass::Gpu
        } else {
            DeviceClass::ManyCore
        }
    }

    fn decide_which_accelerator(&mut self) -> Result<Decision, RuntimeError> {
        self.previous = self.current;
        self.current = self.best_device();

        if self.previous != self.current {
            self.switch_position = Some(self.call_count);
            info!(
                "device switch {} -> {} at call {}",
                self.previous, self.current, self.call_count
            );
            self.devices.compile_for(self.current)?;
        }
        self.call_count += 1;
        Ok(Decision { device: self.current, previous: self.previous })
    }

    pub fn calculate_bonus_and_decide(&mut self) -> Result<Decision, RuntimeError> {
        self.bonus_big_data();
        self.bonus_last_accelerator();
        self.bonus_if_available();
        debug!(
            "chances LEG={:.2} MCPU={:.2} GPU={:.2} MIC={:.2} (sum {})",
            self.chances[0], self.chances[1], self.chances[2], self.chances[3], self.sum
        );
        self.decide_which_accelerator()
    }

    /// Use `device` without scoring.
    pub fn static_decision(&mut self, device: DeviceClass) -> Result<Decision, RuntimeError> {
        self.previous = self.current;
        self.current = device;
        self.switch_position = Some(0);
        if device != DeviceClass::Legacy {
            self.devices.compile_for(device)?;
        }
        info!("static device switch {} -> {}", self.previous, self.current);
        Ok(Decision { device: self.current, previous: self.previous })
    }

    /// Write back the previous device's buffers if the device changed.
    pub fn cleanup_buffers(&mut self) -> Result<(), RuntimeError> {
        if self.previous != self.current {
            self.devices.clean_up(self.previous)?;
        }
        Ok(())
    }

    /// Write back and release all buffers of `class`.
    pub fn clean_up_device(&self, class: DeviceClass) -> Result<(), RuntimeError> {
        self.devices.clean_up(class)
    }

    /// The whole per-call sequence: score (or apply the fixed target),
    /// decide, and write back stale buffers.
    pub fn decide_for_call(
        &mut self,
        summary: &RegionSummary,
        call: &CallChainEntry,
        scalars: &HashMap<String, i64>,
        target: Target,
    ) -> Result<Decision, RuntimeError> {
        let decision = match target {
            Target::Fixed(device) => self.static_decision(device)?,
            Target::Auto => {
                self.init_chance();
                for (region_arg, call_arg) in summary.args.iter().zip(&call.args) {
                    if !region_arg.is_pointer {
                        continue;
                    }
                    let size = call_size(call_arg.max_offset_expr.first(), scalars)?;
                    self.add_to_sum(size);
                    self.bonus_if_on_device(call_arg.buffer);
                }
                self.calculate_bonus_and_decide()?
            }
        };
        self.cleanup_buffers()?;
        Ok(decision)
    }

    /// Register the call's pointer arguments on the current device.
    pub fn stage_buffers(
        &self,
        summary: &RegionSummary,
        call: &CallChainEntry,
        scalars: &HashMap<String, i64>,
        elem_size: usize,
    ) -> Result<(), RuntimeError> {
        let Some(device) = self.devices.get(self.current) else {
            return Ok(());
        };
        for (region_arg, call_arg) in summary.args.iter().zip(&call.args) {
            if !region_arg.is_pointer {
                continue;
            }
            let info = DeviceBuffer {
                transfer: call_arg.type_optimized,
                size: call_size(call_arg.max_offset_expr.first(), scalars)?,
                elem_size,
            };
            if device.transfer_to_device(call_arg.buffer, info) {
                debug!("{} staged on {} ({} elements)", call_arg.value, self.current, info.size);
            }
        }
        Ok(())
    }

    /// Run the decision procedure over every call of a chain.
    ///
    /// `scalars[i]` holds the integer arguments of the i-th call. An
    /// interrupted chain writes back after every call, otherwise buffers
    /// stay resident until the last call finished. A call whose region has
    /// no summary stops the chain.
    pub fn execute_chain(
        &mut self,
        chain: &CallChain,
        summaries: &RegionSummaryMap,
        scalars: &[HashMap<String, i64>],
        target: Target,
        elem_size: usize,
    ) -> Result<Vec<Decision>, RuntimeError> {
        let empty = HashMap::new();
        let mut decisions = Vec::with_capacity(chain.len());
        for (i, call) in chain.entries.iter().enumerate() {
            let summary = summaries.get(&call.region).ok_or_else(|| {
                RuntimeError::new(
                    RuntimeErrorKind::UnknownRegion,
                    format!("call {} names region '{}' with no summary", call.call_index, call.region),
                )
            })?;
            let values = scalars.get(i).unwrap_or(&empty);
            let decision = self.decide_for_call(summary, call, values, target)?;
            self.stage_buffers(summary, call, values, elem_size)?;
            if chain.interrupted {
                self.clean_up_device(self.current)?;
            }
            decisions.push(decision);
        }
        if !chain.interrupted {
            self.clean_up_device(self.current)?;
        }
        Ok(decisions)
    }
}

/// Element count of one call argument; an argument without a size moves nothing.
fn call_size(expr: Option<&String>, scalars: &HashMap<String, i64>) -> Result<i64, RuntimeError> {
    let Some(expr) = expr.filter(|e| !e.is_empty()) else {
        return Ok(0);
    };
    resolve_transfer_size(expr, scalars).map_err(|e| {
        RuntimeError::new(
            RuntimeErrorKind::UnresolvedSize,
            format!("transfer size `{}`: {}", expr, e),
        )
    })
}
