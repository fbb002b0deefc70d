use crate::domain::{
    AccessPolicy, Admission, NodeRecord, SessionLookup, active_talkgroup, encode_config,
    encode_traffic,
};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

/// Latest-wins outbound slot for one observer: a reader that falls behind only ever finds
/// the newest snapshot waiting.
pub type ObserverSender = watch::Sender<String>;

/// What a connection needs after registering: the CONFIG greeting to send first, then every
/// later snapshot from `updates`.
#[derive(Debug)]
pub struct ObserverHandle {
    pub conn_id: Uuid,
    pub greeting: Option<String>,
    pub updates: watch::Receiver<String>,
}

#[derive(Debug)]
struct Observer {
    address: IpAddr,
    page: String,
    admission: Admission,
    tx: ObserverSender,
    last_seen: OffsetDateTime,
}

/// Fans table snapshots out to connected observers.
pub struct Dispatcher {
    observers: RwLock<HashMap<Uuid, Observer>>,
    latest: RwLock<Vec<NodeRecord>>,
    policy: AccessPolicy,
    sessions: Arc<dyn SessionLookup>,
}

impl Dispatcher {
    pub fn new(
        policy: AccessPolicy,
        sessions: Arc<dyn SessionLookup>,
        initial: Vec<NodeRecord>,
    ) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            latest: RwLock::new(initial),
            policy,
            sessions,
        }
    }

    /// Known page sessions are trusted before the allow-list is consulted.
    pub fn admit(&self, address: IpAddr, page: &str, now: OffsetDateTime) -> Admission {
        if self.sessions.is_page_session(address.to_canonical()) {
            return Admission::Page;
        }
        self.policy.admit(address, page, now)
    }

    /// Adds an admitted observer greeted with the latest snapshot.
    pub async fn register(&self, address: IpAddr, page: &str, admission: Admission) -> ObserverHandle {
        let conn_id = Uuid::new_v4();
        let (tx, updates) = watch::channel(String::new());

        // The greeting is read under the registry lock: `publish` stores its snapshot before
        // fanning out, so a concurrent publish either lands in the greeting or reaches us.
        let mut observers = self.observers.write().await;
        let greeting = match encode_config(&self.latest.read().await) {
            Ok(text) => Some(text),
            Err(error) => {
                tracing::warn!(event = "ws.config_encode", error = %error, "cannot encode greeting");
                None
            }
        };
        observers.insert(
            conn_id,
            Observer {
                address: address.to_canonical(),
                page: page.to_string(),
                admission,
                tx,
                last_seen: OffsetDateTime::now_utc(),
            },
        );

        ObserverHandle {
            conn_id,
            greeting,
            updates,
        }
    }

    pub async fn unregister(&self, conn_id: Uuid) {
        self.observers.write().await.remove(&conn_id);
    }

    pub async fn touch(&self, conn_id: Uuid) {
        if let Some(observer) = self.observers.write().await.get_mut(&conn_id) {
            observer.last_seen = OffsetDateTime::now_utc();
        }
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    pub async fn node_count(&self) -> usize {
        self.latest.read().await.len()
    }

    pub async fn last_seen(&self, conn_id: Uuid) -> Option<OffsetDateTime> {
        self.observers
            .read()
            .await
            .get(&conn_id)
            .map(|observer| observer.last_seen)
    }

    /// Delivers one snapshot. Returns how many observers were handed a message.
    pub async fn publish(&self, snapshot: Vec<NodeRecord>, now: OffsetDateTime) -> usize {
        *self.latest.write().await = snapshot.clone();

        let mut dropped = Vec::new();
        let mut delivered = 0;
        {
            let observers = self.observers.read().await;
            let page_message = encode_traffic(&snapshot, Some(observers.len()));
            let service_message = encode_traffic(&snapshot, None);
            let (page_message, service_message) = match (page_message, service_message) {
                (Ok(page), Ok(service)) => (page, service),
                (Err(error), _) | (_, Err(error)) => {
                    tracing::warn!(event = "publish.encode", error = %error, "cannot encode snapshot");
                    return 0;
                }
            };
            let active = active_talkgroup(&snapshot);

            for (conn_id, observer) in observers.iter() {
                let message = match observer.admission {
                    Admission::Page => &page_message,
                    Admission::Service => {
                        if !self
                            .policy
                            .allows_snapshot(observer.address, &observer.page, active, now)
                        {
                            continue;
                        }
                        &service_message
                    }
                    Admission::Rejected => continue,
                };
                // Replaces whatever the observer has not sent yet.
                if observer.tx.send(message.clone()).is_err() {
                    dropped.push(*conn_id);
                } else {
                    delivered += 1;
                }
            }
        }

        if !dropped.is_empty() {
            let mut observers = self.observers.write().await;
            for conn_id in &dropped {
                observers.remove(conn_id);
            }
        }

        tracing::debug!(
            event = "publish.done",
            delivered,
            dropped = dropped.len(),
            "snapshot published"
        );
        delivered
    }
}
