//! etcd-backed [`Coordinator`].

use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, LeaseKeepAliveStream, LeaseKeeper, PutOptions};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::Instrument;

use crate::discovery::{CoordinationError, Coordinator, KeepAliveAck, LeaseId};

/// Acks buffered between the keepalive task and the lease monitor.
const ACK_BUFFER: usize = 16;

/// Endpoint record in the form etcd's gRPC naming resolver reads.
#[derive(Debug, Serialize)]
struct EndpointUpdate<'a> {
    #[serde(rename = "Op")]
    op: u8,
    #[serde(rename = "Addr")]
    addr: &'a str,
    #[serde(rename = "Metadata")]
    metadata: Option<serde_json::Value>,
}

/// Add operation code in the naming record.
const OP_ADD: u8 = 0;

fn encode_endpoint(addr: &str) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&EndpointUpdate {
        op: OP_ADD,
        addr,
        metadata: None,
    })
}

/// One keepalive round trip.
#[async_trait]
trait LeaseRenewer: Send {
    /// Renew once. `None` means the keepalive stream has ended.
    async fn renew(&mut self) -> Result<Option<KeepAliveAck>, CoordinationError>;
}

struct EtcdRenewer {
    keeper: LeaseKeeper,
    stream: LeaseKeepAliveStream,
}

#[async_trait]
impl LeaseRenewer for EtcdRenewer {
    async fn renew(&mut self) -> Result<Option<KeepAliveAck>, CoordinationError> {
        self.keeper.keep_alive().await?;
        let response = self.stream.message().await?;
        Ok(response.map(|r| KeepAliveAck {
            lease: r.id(),
            ttl: r.ttl(),
        }))
    }
}

/// Renew `lease` every third of its TTL, forwarding acks to `tx`.
///
/// Returns, closing `tx`, once the lease is gone: a failed or expired
/// renewal, the stream ending, or no ack before the last granted TTL runs
/// out. The monitor reads the closed channel as lease loss.
async fn renew_until_lost(
    mut renewer: impl LeaseRenewer,
    lease: LeaseId,
    ttl: Duration,
    tx: mpsc::Sender<KeepAliveAck>,
) {
    let period = (ttl / 3).max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    let mut deadline = Instant::now() + ttl;

    loop {
        ticker.tick().await;
        let ack = match tokio::time::timeout_at(deadline, renewer.renew()).await {
            Ok(Ok(Some(ack))) if ack.ttl > 0 => ack,
            Ok(Ok(Some(_))) => {
                tracing::warn!(lease, "Lease expired");
                return;
            }
            Ok(Ok(None)) => {
                tracing::warn!(lease, "Lease keepalive stream closed");
                return;
            }
            Ok(Err(e)) => {
                tracing::warn!(lease, error = %e, "Lease keepalive failed");
                return;
            }
            Err(_) => {
                tracing::warn!(lease, "No lease keepalive response before the TTL ran out");
                return;
            }
        };
        deadline = Instant::now() + Duration::from_secs(ack.ttl as u64);
        if tx.send(ack).await.is_err() {
            return;
        }
    }
}

#[derive(Clone)]
pub struct EtcdCoordinator {
    client: Client,
}

impl EtcdCoordinator {
    pub async fn connect(endpoints: &[String]) -> Result<Self, CoordinationError> {
        let client = Client::connect(endpoints, None).await?;
        tracing::info!(endpoints = ?endpoints, "Connected to etcd");
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Coordinator for EtcdCoordinator {
    async fn grant(&self, ttl_secs: i64) -> Result<LeaseId, CoordinationError> {
        let response = self.client.clone().lease_grant(ttl_secs, None).await?;
        Ok(response.id())
    }

    async fn keep_alive(
        &self,
        lease: LeaseId,
    ) -> Result<mpsc::Receiver<KeepAliveAck>, CoordinationError> {
        let (keeper, stream) = self.client.clone().lease_keep_alive(lease).await?;
        let (tx, rx) = mpsc::channel(ACK_BUFFER);
        let ttl = Duration::from_secs(super::LEASE_TTL_SECS as u64);

        tokio::spawn(
            renew_until_lost(EtcdRenewer { keeper, stream }, lease, ttl, tx)
                .instrument(tracing::Span::current()),
        );

        Ok(rx)
    }

    async fn add_endpoint(
        &self,
        key: &str,
        addr: &str,
        lease: LeaseId,
    ) -> Result<(), CoordinationError> {
        let value = encode_endpoint(addr)?;
        self.client
            .clone()
            .put(key, value, Some(PutOptions::new().with_lease(lease)))
            .await?;
        Ok(())
    }

    async fn delete_endpoint(&self, key: &str) -> Result<(), CoordinationError> {
        self.client.clone().delete(key, None).await?;
        Ok(())
    }

    async fn revoke(&self, lease: LeaseId) -> Result<(), CoordinationError> {
        self.client.clone().lease_revoke(lease).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    enum Round {
        Ack(i64),
        Fail,
        End,
        Hang,
    }

    struct ScriptedRenewer {
        rounds: VecDeque<Round>,
    }

    impl ScriptedRenewer {
        fn new(rounds: Vec<Round>) -> Self {
            Self {
                rounds: rounds.into(),
            }
        }
    }

    #[async_trait]
    impl LeaseRenewer for ScriptedRenewer {
        async fn renew(&mut self) -> Result<Option<KeepAliveAck>, CoordinationError> {
            match self.rounds.pop_front().unwrap_or(Round::End) {
                Round::Ack(ttl) => Ok(Some(KeepAliveAck { lease: 1, ttl })),
                Round::Fail => Err(CoordinationError::Unavailable("connection reset".into())),
                Round::End => Ok(None),
                Round::Hang => std::future::pending().await,
            }
        }
    }

    const TTL: Duration = Duration::from_secs(30);

    async fn run(rounds: Vec<Round>) -> Vec<i64> {
        let (tx, mut rx) = mpsc::channel(ACK_BUFFER);
        tokio::spawn(renew_until_lost(ScriptedRenewer::new(rounds), 1, TTL, tx));
        let mut ttls = Vec::new();
        while let Some(ack) = rx.recv().await {
            ttls.push(ack.ttl);
        }
        ttls
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_acks_until_stream_ends() {
        assert_eq!(run(vec![Round::Ack(30), Round::Ack(29), Round::End]).await, [30, 29]);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_or_failed_renewal_closes_channel() {
        assert_eq!(run(vec![Round::Ack(30), Round::Ack(0), Round::Ack(30)]).await, [30]);
        assert_eq!(run(vec![Round::Fail, Round::Ack(30)]).await, Vec::<i64>::new());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_renewal_closes_channel_when_ttl_runs_out() {
        let started = Instant::now();
        assert_eq!(run(vec![Round::Ack(30), Round::Hang]).await, [30]);

        // First ack at t=0, its TTL runs out at t=30s.
        let elapsed = started.elapsed();
        assert!(elapsed >= TTL, "closed early: {elapsed:?}");
        assert!(elapsed < TTL + Duration::from_secs(1), "closed late: {elapsed:?}");
    }

    #[test]
    fn endpoint_uses_naming_record_format() {
        let encoded = encode_endpoint("10.0.0.7:8090").unwrap();
        assert_eq!(
            std::str::from_utf8(&encoded).unwrap(),
            r#"{"Op":0,"Addr":"10.0.0.7:8090","Metadata":null}"#
        );
    }
}
