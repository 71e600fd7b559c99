use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use isyglt_host::devices::{DeviceState, LightCommand};
use isyglt_host::icd::DeviceKind;
use isyglt_host::{init_tracing, load_config, Hub, RegisterFile};
use modbus_queue::{BusRegistry, FacadeConfig};
use tokio::task::{JoinHandle, LocalSet};

#[derive(Parser)]
#[command(
    name = "isyglt-sim",
    about = "Poll and switch the devices of an ISYGLT hub against a \
             simulated register file"
)]
struct Args {
    /// Hub configuration (JSON)
    config: PathBuf,

    /// Number of poll rounds
    #[arg(short, long, default_value_t = 6)]
    rounds: u32,

    /// Simulated latency of one bus transaction, in milliseconds
    #[arg(short, long, default_value_t = 5)]
    latency_ms: u64,

    /// Maximum age of cached register blocks, in milliseconds (0 = off)
    #[arg(long, default_value_t = 0)]
    cache_ttl_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();
    let args = Args::parse();

    let config = load_config(&args.config)?;
    let facade = FacadeConfig {
        cache_ttl: embassy_time::Duration::from_millis(args.cache_ttl_ms),
    };
    let field = RegisterFile::new(Duration::from_millis(args.latency_ms));
    let registry = BusRegistry::new();
    let mut hub = Hub::new(&registry, config, facade)?;

    let watched = Rc::new(Cell::new(0u64));
    LocalSet::new()
        .run_until(async {
            let _worker = hub.spawn_worker(field.clone());
            let _watchers = watch(&hub, &watched);
            simulate(&mut hub, &field, args.rounds).await;
        })
        .await;

    let queue = hub.queue();
    println!(
        "{} transactions executed ({} reads, {} writes on the wire), \
         {} update broadcasts, {} watcher refreshes",
        queue.executed(),
        field.reads(),
        field.writes(),
        queue.broadcasts(),
        watched.get()
    );
    for device in hub.devices() {
        let status =
            if device.is_available() { "ok" } else { "unavailable" };
        let state = describe(device.state());
        println!("{:<40} {:<12} {}", device.unique_id(), status, state);
    }
    Ok(())
}

/// Follow the first light and the first IO module with devices running
/// their own refresh loop, which also wakes on every update broadcast.
fn watch(hub: &Hub, refreshes: &Rc<Cell<u64>>) -> Vec<JoinHandle<()>> {
    let light = hub.config().devices.iter().find(|d| d.kind.is_light());
    let io = hub
        .config()
        .devices
        .iter()
        .find(|d| d.kind == DeviceKind::IoModule);

    light
        .into_iter()
        .chain(io)
        .filter_map(|device| {
            let unique_id = hub.config().unique_id(device);
            let refreshes = refreshes.clone();
            hub.spawn_watcher(&unique_id, move |device, _| {
                refreshes.set(refreshes.get() + 1);
                tracing::info!(
                    "watch {}: {}",
                    device.unique_id(),
                    describe(device.state())
                );
            })
        })
        .collect()
}

async fn simulate(hub: &mut Hub, field: &RegisterFile, rounds: u32) {
    let scan = Duration::from_micros(hub.config().scan_interval().as_micros());

    for round in 0..rounds {
        let report = hub.refresh_all().await;
        tracing::info!(
            "round {}: {} available, {} unavailable",
            round,
            report.available,
            report.unavailable
        );
        for (unique_id, press) in &report.presses {
            tracing::info!("{}: button {} pressed", unique_id, press.button);
        }

        // Alternate lights and the first output of every IO module, and
        // press the first button of every grid on odd rounds.
        let on = round % 2 == 0;
        let command = if on {
            LightCommand::on().brightness(200)
        } else {
            LightCommand::off()
        };
        let failed = hub.switch_lights(command).await
            + hub.switch_outputs(1, on).await;
        if failed > 0 {
            tracing::warn!("round {}: {} commands failed", round, failed);
        }
        for device in hub.config().devices.iter() {
            if device.kind == DeviceKind::ButtonGrid {
                field.set(device.address, &[u16::from(!on)]);
            }
        }

        tokio::time::sleep(scan).await;
    }
}

fn describe(state: &DeviceState) -> String {
    match state {
        DeviceState::Rgb(s) => format!(
            "on={} brightness={} rgb={:?}",
            s.on, s.brightness, s.rgb
        ),
        DeviceState::White(s) => format!(
            "on={} brightness={} kelvin={}",
            s.on, s.brightness, s.kelvin
        ),
        DeviceState::Dimmer(s) => {
            format!("on={} brightness={}", s.on, s.brightness)
        }
        DeviceState::Motion(s) => format!(
            "presence={} led={} lux={:?}",
            s.presence(),
            s.led(),
            s.illuminance
        ),
        DeviceState::ButtonGrid(s) => {
            format!("buttons={:#04x} leds={:#04x}", s.buttons, s.leds)
        }
        DeviceState::Io(s) => {
            format!("outputs={:#04x} inputs={:#04x}", s.outputs, s.inputs)
        }
        DeviceState::Group(s) => format!("on={}", s.on),
    }
}
