use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use isyglt_host::devices::{ButtonPress, DeviceState, LightCommand};
use isyglt_host::icd::{ConfigError, HubConfig};
use isyglt_host::{load_config, HostError, Hub, RegisterFile};
use modbus_queue::{BusRegistry, FacadeConfig};
use tokio::task::LocalSet;

fn sample_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config/hub.json")
}

fn sample() -> HubConfig {
    load_config(&sample_path()).unwrap()
}

fn temp_config(name: &str, json: &str) -> PathBuf {
    let path = std::env::temp_dir()
        .join(format!("isyglt-{}-{}.json", name, std::process::id()));
    std::fs::write(&path, json).unwrap();
    path
}

#[test]
fn sample_config_loads() {
    let config = sample();
    assert_eq!(config.hub, "isyglt");
    assert_eq!(config.devices.len(), 7);
}

#[test]
fn load_config_reports_each_failure() {
    let missing = Path::new("/nonexistent/isyglt.json");
    assert!(matches!(load_config(missing), Err(HostError::Io(_))));

    let path = temp_config("malformed", "{ \"hub\": ");
    assert!(matches!(load_config(&path), Err(HostError::Json(_))));

    let path = temp_config("empty", r#"{ "hub": "isyglt", "devices": [] }"#);
    assert!(matches!(
        load_config(&path),
        Err(HostError::Config(ConfigError::NoDevices))
    ));
}

#[tokio::test]
async fn every_device_refreshes() {
    let registry = BusRegistry::new();
    let field = RegisterFile::new(Duration::ZERO);
    let mut hub =
        Hub::new(&registry, sample(), FacadeConfig::default()).unwrap();

    LocalSet::new()
        .run_until(async {
            assert!(hub.spawn_worker(field.clone()).is_some());
            let report = hub.refresh_all().await;
            assert_eq!((report.available, report.unavailable), (7, 0));
        })
        .await;

    assert!(hub.devices().iter().all(|device| device.is_available()));
    assert_eq!(hub.queue().executed(), 8);
}

#[tokio::test]
async fn lights_switch_through_the_bus() {
    let registry = BusRegistry::new();
    let field = RegisterFile::new(Duration::ZERO);
    let mut hub =
        Hub::new(&registry, sample(), FacadeConfig::default()).unwrap();

    let failed = LocalSet::new()
        .run_until(async {
            hub.spawn_worker(field.clone());
            hub.refresh_all().await;
            hub.switch_lights(LightCommand::on().brightness(200)).await
        })
        .await;

    assert_eq!(failed, 0);
    // RGB: power, dim and colour enabled.
    assert_eq!(field.get(0), 0x07);
    assert_eq!(field.get(1), 200);
    // White at its mid temperature leaves the CCT channel disabled.
    assert_eq!((field.get(5), field.get(6), field.get(7)), (0x05, 127, 200));
    // Dimmer.
    assert_eq!((field.get(8), field.get(9)), (0x03, 200));
    // One broadcast per write, each two poll cycles out.
    assert_eq!(hub.queue().scheduled_updates(), 3);
}

#[tokio::test]
async fn unreachable_device_does_not_affect_the_others() {
    let registry = BusRegistry::new();
    let field = RegisterFile::new(Duration::from_millis(1));
    field.set_offline(100, true);
    let mut hub =
        Hub::new(&registry, sample(), FacadeConfig::default()).unwrap();

    let failed = LocalSet::new()
        .run_until(async {
            hub.spawn_worker(field.clone());
            let report = hub.refresh_all().await;
            assert_eq!((report.available, report.unavailable), (6, 1));
            hub.switch_outputs(1, true).await
        })
        .await;

    assert_eq!(failed, 1);
    let relays = hub
        .devices()
        .iter()
        .find(|device| device.config().address == 100)
        .unwrap();
    assert!(!relays.is_available());
}

#[tokio::test]
async fn button_presses_are_reported_by_device() {
    let registry = BusRegistry::new();
    let field = RegisterFile::new(Duration::ZERO);
    let mut hub =
        Hub::new(&registry, sample(), FacadeConfig::default()).unwrap();

    let report = LocalSet::new()
        .run_until(async {
            hub.spawn_worker(field.clone());
            hub.refresh_all().await;
            field.set(20, &[0b10]);
            hub.refresh_all().await
        })
        .await;

    assert_eq!(
        report.presses,
        [(
            String::from("isyglt_entry_panel_button_grid"),
            ButtonPress { button: 2 }
        )]
    );
    let grid = hub.device_mut("isyglt_entry_panel_button_grid").unwrap();
    let DeviceState::ButtonGrid(state) = *grid.state() else {
        panic!("unexpected state {:?}", grid.state());
    };
    assert!(state.pressed(2));
}

#[tokio::test]
async fn hubs_with_the_same_name_share_one_worker() {
    let registry = BusRegistry::new();
    let field = RegisterFile::new(Duration::ZERO);
    let first =
        Hub::new(&registry, sample(), FacadeConfig::default()).unwrap();
    let mut second =
        Hub::new(&registry, sample(), FacadeConfig::default()).unwrap();

    assert!(Arc::ptr_eq(first.queue(), second.queue()));
    assert_eq!(registry.len(), 1);

    LocalSet::new()
        .run_until(async {
            assert!(second.spawn_worker(field.clone()).is_none());
            assert!(first.spawn_worker(field.clone()).is_some());
            let report = second.refresh_all().await;
            assert_eq!(report.available, 7);
        })
        .await;
}

#[tokio::test]
async fn watcher_follows_writes_of_other_devices() {
    let registry = BusRegistry::new();
    let field = RegisterFile::new(Duration::ZERO);
    let mut config = sample();
    config.poll_interval = 0.1;
    let mut hub =
        Hub::new(&registry, config, FacadeConfig::default()).unwrap();
    let seen = Rc::new(Cell::new((0u32, 0u8)));

    LocalSet::new()
        .run_until(async {
            hub.spawn_worker(field.clone());
            let observed = seen.clone();
            let watcher = hub.spawn_watcher(
                "isyglt_spots_dimmer",
                move |device, _| {
                    let DeviceState::Dimmer(state) = *device.state() else {
                        return;
                    };
                    let (refreshes, _) = observed.get();
                    observed.set((refreshes + 1, state.brightness));
                },
            );
            assert!(watcher.is_some());
            assert!(hub.spawn_watcher("isyglt_unknown", |_, _| {}).is_none());

            tokio::time::sleep(Duration::from_millis(50)).await;
            hub.refresh_all().await;
            let failed =
                hub.switch_lights(LightCommand::on().brightness(150)).await;
            assert_eq!(failed, 0);
            // Settle delay of two poll cycles, then the refresh.
            tokio::time::sleep(Duration::from_millis(350)).await;
        })
        .await;

    let (refreshes, brightness) = seen.get();
    assert!(refreshes >= 2);
    assert_eq!(brightness, 150);
    assert!(hub.queue().broadcasts() >= 3);
}
