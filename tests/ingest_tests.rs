// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod common;

use std::sync::Arc;
use tempfile::TempDir;

use common::*;
use edge_datasync::bridge::{ConnectionState, LinkStateWriter, RemoteLinkState, TopicSet};
use edge_datasync::config::{MqttConfig, ServerConfig};
use edge_datasync::ingest::Ingestor;
use edge_datasync::protocol::MeasurementClass;
use edge_datasync::storage::DurableStore;

fn topics() -> TopicSet {
    TopicSet::from_config(&MqttConfig {
        client_id: DEVICE.to_string(),
        ..Default::default()
    })
}

struct Fixture {
    _dir: TempDir,
    store: Arc<DurableStore>,
    remote: Arc<FakePublisher>,
    link: LinkStateWriter,
    ingestor: Ingestor,
}

async fn fixture(server: ServerConfig) -> Fixture {
    let dir = TempDir::new().unwrap();
    let (store, _clock) = open_store(&dir, utc(2024, 5, 10)).await;
    let remote = FakePublisher::new();
    let (link_state, link) = RemoteLinkState::new();
    let ingestor = Ingestor::new(
        server,
        topics(),
        Arc::clone(&store),
        remote.clone(),
        link_state,
    );
    Fixture {
        _dir: dir,
        store,
        remote,
        link,
        ingestor,
    }
}

#[tokio::test]
async fn test_forwarded_pollutant_is_stored_acknowledged() {
    let f = fixture(ServerConfig::default()).await;
    f.link.set(ConnectionState::Connected);

    let payload = pollutant_payload(1000);
    let outcome = f
        .ingestor
        .ingest(MeasurementClass::Pollutant, payload.clone().into())
        .await;
    assert!(outcome.forwarded);

    let published = f.remote.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, topics().pollutant);
    assert_eq!(published[0].1, payload);

    let id = outcome.stored.unwrap();
    let record = f
        .store
        .active()
        .await
        .unwrap()
        .record(MeasurementClass::Pollutant, id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.timestamp, 1000);
    assert!(record.acknowledged);
    assert_eq!(record.payload, payload);
}

#[tokio::test]
async fn test_failed_forward_is_stored_unacknowledged() {
    let f = fixture(ServerConfig::default()).await;
    f.link.set(ConnectionState::Connected);
    f.remote.fail_all(true);

    let outcome = f
        .ingestor
        .ingest(MeasurementClass::Raw, raw_payload(42).into())
        .await;
    assert!(!outcome.forwarded);
    assert_eq!(f.remote.attempts(), 1);

    let record = f
        .store
        .active()
        .await
        .unwrap()
        .record(MeasurementClass::Raw, outcome.stored.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(!record.acknowledged);
}

#[tokio::test]
async fn test_disconnected_link_skips_publish() {
    let f = fixture(ServerConfig::default()).await;

    let outcome = f
        .ingestor
        .ingest(MeasurementClass::Raw, raw_payload(7).into())
        .await;
    assert!(!outcome.forwarded);
    assert_eq!(f.remote.attempts(), 0);
    assert!(outcome.stored.is_some());
}

#[tokio::test]
async fn test_forward_without_logging() {
    let server = ServerConfig {
        log_raw: false,
        ..Default::default()
    };
    let f = fixture(server).await;
    f.link.set(ConnectionState::Connected);

    let outcome = f
        .ingestor
        .ingest(MeasurementClass::Raw, raw_payload(7).into())
        .await;
    assert!(outcome.forwarded);
    assert_eq!(outcome.stored, None);

    let file = f.store.active().await.unwrap();
    assert!(file.records(MeasurementClass::Raw).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_log_without_forwarding() {
    let server = ServerConfig {
        send_pollutant_data: false,
        ..Default::default()
    };
    let f = fixture(server).await;
    f.link.set(ConnectionState::Connected);

    let outcome = f
        .ingestor
        .ingest(MeasurementClass::Pollutant, pollutant_payload(9).into())
        .await;
    assert!(!outcome.forwarded);
    assert_eq!(f.remote.attempts(), 0);

    let file = f.store.active().await.unwrap();
    let records = file.records(MeasurementClass::Pollutant).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].acknowledged);
}

#[tokio::test]
async fn test_both_disabled_drops_message() {
    let server = ServerConfig {
        log_raw: false,
        send_raw_data: false,
        ..Default::default()
    };
    let f = fixture(server).await;
    f.link.set(ConnectionState::Connected);

    let outcome = f
        .ingestor
        .ingest(MeasurementClass::Raw, raw_payload(9).into())
        .await;
    assert!(!outcome.forwarded);
    assert_eq!(outcome.stored, None);
    assert_eq!(f.remote.attempts(), 0);
}

#[tokio::test]
async fn test_undecodable_payload_is_forwarded_but_not_stored() {
    let f = fixture(ServerConfig::default()).await;
    f.link.set(ConnectionState::Connected);

    let outcome = f
        .ingestor
        .ingest(MeasurementClass::Raw, b"not msgpack".to_vec().into())
        .await;
    assert!(outcome.forwarded);
    assert_eq!(outcome.stored, None);

    let file = f.store.active().await.unwrap();
    assert!(file.records(MeasurementClass::Raw).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_classes_are_independent() {
    let f = fixture(ServerConfig::default()).await;
    f.link.set(ConnectionState::Connected);

    f.ingestor
        .ingest(MeasurementClass::Raw, raw_payload(1).into())
        .await;
    f.ingestor
        .ingest(MeasurementClass::Pollutant, pollutant_payload(2).into())
        .await;

    let topics = topics();
    let published: Vec<_> = f.remote.published().into_iter().map(|(t, _)| t).collect();
    assert_eq!(published, vec![topics.raw.clone(), topics.pollutant.clone()]);

    let file = f.store.active().await.unwrap();
    assert_eq!(file.records(MeasurementClass::Raw).await.unwrap().len(), 1);
    assert_eq!(
        file.records(MeasurementClass::Pollutant).await.unwrap().len(),
        1
    );
}
