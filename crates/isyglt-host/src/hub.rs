use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use futures::future::join_all;
use isyglt_devices::{BitTarget, ButtonPress, Device, LightCommand};
use isyglt_icd::{DeviceKind, HubConfig};
use modbus_queue::{
    BusConfig, BusQueue, BusRegistry, FacadeConfig, Registers, Transport,
};
use tokio::task::JoinHandle;

use crate::HostError;

pub type HostMutex = CriticalSectionRawMutex;

/// Outcome of one refresh of every device on a hub.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RoundReport {
    pub available: usize,
    pub unavailable: usize,
    /// Button presses by device unique id.
    pub presses: Vec<(String, ButtonPress)>,
}

/// The devices of one configured hub, wired to the hub's bus queue.
pub struct Hub {
    config: HubConfig,
    queue: Arc<BusQueue<HostMutex>>,
    owns_worker: bool,
    facade: FacadeConfig,
    devices: Vec<Device<HostMutex>>,
}

impl Hub {
    /// Validate `config` and attach its devices to the hub's bus in
    /// `registry`.
    pub fn new(
        registry: &BusRegistry<HostMutex>,
        config: HubConfig,
        facade: FacadeConfig,
    ) -> Result<Self, HostError> {
        config.validate()?;

        for range in config.bulk_ranges() {
            tracing::debug!(
                "{}: bulk range {}+{}",
                config.hub,
                range.start,
                range.count
            );
        }

        let bus = BusConfig { poll_interval: config.poll_interval() };
        let slot = registry.get_or_create(&config.hub, bus)?;
        let owns_worker = slot.is_created();
        let queue = slot.into_queue();

        let devices = config
            .devices
            .iter()
            .map(|device| {
                let regs = Registers::new(queue.clone(), facade);
                Device::new(&config, device.clone(), regs)
            })
            .collect::<Vec<_>>();
        tracing::info!("{}: {} devices", config.hub, devices.len());

        Ok(Self { config, queue, owns_worker, facade, devices })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<BusQueue<HostMutex>> {
        &self.queue
    }

    pub fn devices(&self) -> &[Device<HostMutex>] {
        &self.devices
    }

    pub fn device_mut(
        &mut self,
        unique_id: &str,
    ) -> Option<&mut Device<HostMutex>> {
        self.devices.iter_mut().find(|d| d.unique_id() == unique_id)
    }

    /// Start the bus worker on the current [`tokio::task::LocalSet`].
    ///
    /// Returns `None` if another hub already created the bus and so owns
    /// its worker.
    pub fn spawn_worker<T>(&self, transport: T) -> Option<JoinHandle<()>>
    where
        T: Transport + 'static,
    {
        if !self.owns_worker {
            return None;
        }
        let queue = self.queue.clone();
        Some(tokio::task::spawn_local(async move {
            queue.run(transport).await;
        }))
    }

    /// Run a second instance of device `unique_id` on the current
    /// [`tokio::task::LocalSet`]. It refreshes on its scan interval and on
    /// every "registers updated" broadcast of the bus, calling
    /// `on_refresh` after each attempt.
    pub fn spawn_watcher<F>(
        &self,
        unique_id: &str,
        on_refresh: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnMut(&Device<HostMutex>, &[ButtonPress]) + 'static,
    {
        let config = self
            .config
            .devices
            .iter()
            .find(|device| self.config.unique_id(device) == unique_id)?;
        let regs = Registers::new(self.queue.clone(), self.facade);
        let mut device = Device::new(&self.config, config.clone(), regs);
        tracing::debug!("{}: watching", unique_id);
        Some(tokio::task::spawn_local(async move {
            match device.run(on_refresh).await {}
        }))
    }

    /// Refresh every device concurrently.
    pub async fn refresh_all(&mut self) -> RoundReport {
        let results =
            join_all(self.devices.iter_mut().map(|device| async move {
                let result = device.refresh().await;
                (device.unique_id().to_owned(), result)
            }))
            .await;

        let mut report = RoundReport::default();
        for (unique_id, result) in results {
            match result {
                Ok(presses) => {
                    report.available += 1;
                    report.presses.extend(
                        presses.into_iter().map(|p| (unique_id.clone(), p)),
                    );
                }
                Err(_) => report.unavailable += 1,
            }
        }
        report
    }

    /// Switch every light of the hub. Returns the number of failures.
    pub async fn switch_lights(&mut self, command: LightCommand) -> usize {
        let lights = self
            .devices
            .iter_mut()
            .filter(|device| device.config().kind.is_light());
        let results = join_all(lights.map(|device| async move {
            let result = device.set_light(command).await;
            if let Err(err) = &result {
                tracing::warn!("{}: {}", device.unique_id(), err);
            }
            result
        }))
        .await;
        results.iter().filter(|result| result.is_err()).count()
    }

    /// Set output `output` of every IO module. Returns the number of
    /// failures.
    pub async fn switch_outputs(&mut self, output: u8, on: bool) -> usize {
        let modules = self
            .devices
            .iter_mut()
            .filter(|device| device.config().kind == DeviceKind::IoModule);
        let results = join_all(modules.map(|device| async move {
            let result = device.set_bit(BitTarget::Output(output), on).await;
            if let Err(err) = &result {
                tracing::warn!("{}: {}", device.unique_id(), err);
            }
            result
        }))
        .await;
        results.iter().filter(|result| result.is_err()).count()
    }
}
