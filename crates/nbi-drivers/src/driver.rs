//! Driver trait and the (vendor, intent) dispatch table

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use nbi_core::{DeviceProfile, Error, RequestSpec, Result, Vendor};

use crate::params::Params;
use crate::registry::Intent;

/// Compiles intents into RESTCONF requests for one vendor schema.
///
/// Building is pure: no I/O, no shared state. Parameter problems surface as
/// `Error::DriverBuild` before anything reaches the controller.
pub trait Driver: Send + Sync {
    /// Short name stamped on every RequestSpec
    fn name(&self) -> &'static str;

    fn vendor(&self) -> Vendor;

    fn supported_intents(&self) -> &'static [Intent];

    fn supports(&self, intent: Intent) -> bool {
        self.supported_intents().contains(&intent)
    }

    /// Build the request. Callers go through [`Driver::build`], which checks
    /// the declared set first.
    fn compile(&self, device: &DeviceProfile, intent: Intent, params: &Params) -> Result<RequestSpec>;

    fn build(&self, device: &DeviceProfile, intent: Intent, params: &Params) -> Result<RequestSpec> {
        if !self.supports(intent) {
            return Err(Error::unsupported_intent(format!(
                "{} (driver {})",
                intent,
                self.name()
            )));
        }
        let spec = self.compile(device, intent, params)?;
        Ok(spec.tagged(intent.as_str(), self.name()))
    }
}

/// Every registered driver, indexed by (vendor, intent)
#[derive(Clone, Default)]
pub struct DriverRegistry {
    routes: HashMap<(Vendor, Intent), Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in vendor driver
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for driver in crate::drivers::all() {
            registry.register(driver);
        }
        registry
    }

    /// Claim every intent the driver declares. A later driver claiming the
    /// same (vendor, intent) replaces the earlier one.
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        let vendor = driver.vendor();
        for intent in driver.supported_intents() {
            if let Some(previous) = self.routes.insert((vendor, *intent), driver.clone()) {
                debug!(
                    "{} {} moved from driver {} to {}",
                    vendor,
                    intent,
                    previous.name(),
                    driver.name()
                );
            }
        }
    }

    pub fn select(&self, vendor: Vendor, intent: Intent) -> Result<Arc<dyn Driver>> {
        self.routes.get(&(vendor, intent)).cloned().ok_or_else(|| {
            Error::unsupported_intent(format!("{} is not supported for vendor {}", intent, vendor))
        })
    }

    pub fn supports(&self, vendor: Vendor, intent: Intent) -> bool {
        self.routes.contains_key(&(vendor, intent))
    }

    /// Select and build in one step
    pub fn build(&self, device: &DeviceProfile, intent: Intent, params: &Params) -> Result<RequestSpec> {
        self.select(device.vendor, intent)?.build(device, intent, params)
    }

    /// Sorted intents per vendor
    pub fn intents_by_vendor(&self) -> BTreeMap<Vendor, Vec<Intent>> {
        let mut out: BTreeMap<Vendor, Vec<Intent>> = BTreeMap::new();
        for (vendor, intent) in self.routes.keys() {
            out.entry(*vendor).or_default().push(*intent);
        }
        for intents in out.values_mut() {
            intents.sort();
        }
        out
    }

    pub fn pairs(&self) -> impl Iterator<Item = (Vendor, Intent)> + '_ {
        self.routes.keys().copied()
    }
}
