mod common;

use std::sync::Arc;

use common::{drive, Call, MockTransport};
use embassy_futures::join::join;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::Duration;
use modbus_queue::{
    BusConfig, BusError, BusRegistry, FacadeConfig, Registers, MAX_BUS_ID_LEN,
};

type Registry = BusRegistry<NoopRawMutex>;

fn poll(ms: u64) -> BusConfig {
    BusConfig { poll_interval: Duration::from_millis(ms) }
}

#[test]
fn second_request_gets_the_same_queue() {
    let registry = Registry::new();

    let first = registry.get_or_create("hub-a", poll(1000)).unwrap();
    let second = registry.get_or_create("hub-a", poll(1000)).unwrap();

    assert!(first.is_created());
    assert!(!second.is_created());
    assert!(Arc::ptr_eq(first.queue(), second.queue()));
    assert_eq!(registry.len(), 1);
}

#[test]
fn distinct_ids_get_distinct_queues() {
    let registry = Registry::new();

    let a = registry.get_or_create("hub-a", poll(1000)).unwrap();
    let b = registry.get_or_create("hub-b", poll(1000)).unwrap();

    assert!(a.is_created() && b.is_created());
    assert!(!Arc::ptr_eq(a.queue(), b.queue()));

    let ids: Vec<_> =
        registry.ids().iter().map(|id| id.as_str().to_owned()).collect();
    assert_eq!(ids, ["hub-a", "hub-b"]);
}

#[test]
fn first_configuration_wins() {
    let registry = Registry::new();

    registry.get_or_create("hub", poll(500)).unwrap();
    let later = registry.get_or_create("hub", poll(2000)).unwrap();

    assert_eq!(later.queue().config(), &poll(500));
    assert_eq!(later.queue().config().settle_delay(), Duration::from_secs(1));
}

#[test]
fn settle_delay_saturates() {
    let huge = BusConfig { poll_interval: Duration::MAX };
    assert_eq!(huge.settle_delay(), Duration::MAX);

    let half = BusConfig {
        poll_interval: Duration::from_ticks(u64::MAX / 2 + 1),
    };
    assert_eq!(half.settle_delay(), Duration::MAX);
}

#[test]
fn invalid_ids_are_rejected() {
    let registry = Registry::new();
    let too_long = "x".repeat(MAX_BUS_ID_LEN + 1);

    assert!(matches!(
        registry.get_or_create("", poll(1000)),
        Err(BusError::InvalidBusId)
    ));
    assert!(matches!(
        registry.get_or_create(&too_long, poll(1000)),
        Err(BusError::InvalidBusId)
    ));
    assert!(registry.is_empty());
    assert!(registry.get("").is_none());
}

#[test]
fn lookup_without_creating() {
    let registry = Registry::default();
    assert!(registry.get("hub").is_none());

    let created = registry.get_or_create("hub", poll(1000)).unwrap();
    let found = registry.get("hub").unwrap();
    assert!(Arc::ptr_eq(created.queue(), &found));
    assert_eq!(found.id().as_str(), "hub");
}

#[futures_test::test]
async fn devices_on_one_hub_share_its_worker() {
    let registry = Registry::new();
    let mock = MockTransport::new();

    let queue = registry.get_or_create("hub", poll(1000)).unwrap().into_queue();
    let other = registry.get_or_create("hub", poll(1000)).unwrap().into_queue();

    let mut light = Registers::new(queue.clone(), FacadeConfig::default());
    let mut sensor = Registers::new(other, FacadeConfig::default());

    let both = join(light.write(0, &[1]), sensor.read(10, 2));
    let (w, r) = drive(&queue, mock.clone(), both).await;

    assert_eq!(w, Ok(()));
    assert_eq!(r, Ok(vec![0, 0]));
    assert_eq!(
        mock.calls(),
        vec![Call::Write(0, vec![1]), Call::Read(10, 2)]
    );
}
