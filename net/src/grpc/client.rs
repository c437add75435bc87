use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_stream::StreamExt;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::error::{Error, Result};
use crate::messages::{beacon_from_proto, ChainInfoMsg, DkgAckMsg, DkgEnvelopeMsg, PartialBeaconMsg, StatusMsg};
use crate::pb;
use crate::peer::Peer;
use crate::service::{BeaconClient, BeaconEntryStream};

/// A per-RPC inactivity/connect timeout (§5 "Cancellation and timeouts": "a
/// few seconds").
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// tonic-backed [`BeaconClient`]. Caches one channel per peer address so
/// repeated broadcasts within a round reuse the same HTTP/2 connection.
/// Dials `tls: true` peers over real TLS, verified against public CA
/// roots (certificate provisioning for the listener side is the host
/// process's job, per §1's "TLS certificate management" scope cut).
pub struct TonicBeaconClient {
    channels: Mutex<HashMap<String, Channel>>,
}

impl Default for TonicBeaconClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TonicBeaconClient {
    pub fn new() -> Self {
        TonicBeaconClient {
            channels: Mutex::new(HashMap::new()),
        }
    }

    async fn channel(&self, peer: &Peer) -> Result<Channel> {
        if let Some(ch) = self.channels.lock().get(&peer.address).cloned() {
            return Ok(ch);
        }
        let mut endpoint = Endpoint::from_shared(peer.uri())
            .map_err(|e| Error::Malformed(e.to_string()))?
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(CONNECT_TIMEOUT);
        if peer.tls {
            let tls = ClientTlsConfig::new()
                .with_webpki_roots()
                .domain_name(peer.domain_name());
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| Error::Malformed(e.to_string()))?;
        }
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        self.channels.lock().insert(peer.address.clone(), channel.clone());
        Ok(channel)
    }

    async fn stub(&self, peer: &Peer) -> Result<pb::rand_beacon_client::RandBeaconClient<Channel>> {
        let channel = self.channel(peer).await?;
        Ok(pb::rand_beacon_client::RandBeaconClient::new(channel))
    }
}

#[async_trait]
impl BeaconClient for TonicBeaconClient {
    async fn partial_beacon(&self, peer: &Peer, beacon_id: &str, msg: PartialBeaconMsg) -> Result<()> {
        let mut stub = self.stub(peer).await?;
        stub.partial_beacon(pb::PartialBeaconRequest {
            beacon_id: beacon_id.to_string(),
            round: msg.round,
            previous_signature: msg.previous_signature,
            signer_index: msg.signer_index,
            partial_sig: msg.partial_sig,
        })
        .await
        .map_err(Error::from)?;
        Ok(())
    }

    async fn sync_chain(&self, peer: &Peer, beacon_id: &str, from_round: u64) -> Result<BeaconEntryStream> {
        let mut stub = self.stub(peer).await?;
        let stream = stub
            .sync_chain(pb::SyncChainRequest {
                beacon_id: beacon_id.to_string(),
                from_round,
            })
            .await
            .map_err(Error::from)?
            .into_inner();
        let mapped = stream.map(|item| item.map(beacon_from_proto).map_err(Error::from));
        Ok(Box::pin(mapped))
    }

    async fn chain_info(&self, peer: &Peer, beacon_id: &str) -> Result<ChainInfoMsg> {
        let mut stub = self.stub(peer).await?;
        let reply = stub
            .chain_info(pb::ChainInfoRequest {
                beacon_id: beacon_id.to_string(),
            })
            .await
            .map_err(Error::from)?
            .into_inner();
        Ok(ChainInfoMsg {
            public_key: reply.public_key,
            period_seconds: reply.period_seconds,
            genesis_time: reply.genesis_time,
            hash: reply.hash,
            genesis_seed: reply.genesis_seed,
            scheme_id: reply.scheme_id,
        })
    }

    async fn status(&self, peer: &Peer, beacon_id: &str) -> Result<StatusMsg> {
        let mut stub = self.stub(peer).await?;
        let reply = stub
            .status(pb::StatusRequest {
                beacon_id: beacon_id.to_string(),
            })
            .await
            .map_err(Error::from)?
            .into_inner();
        Ok(StatusMsg {
            running: reply.running,
            serving: reply.serving,
            chain_head: reply.chain_head,
            known_peers: reply.known_peers,
        })
    }

    async fn dkg_propose(&self, peer: &Peer, beacon_id: &str, envelope: DkgEnvelopeMsg) -> Result<DkgAckMsg> {
        self.dkg_call(peer, beacon_id, envelope, DkgMethod::Propose).await
    }

    async fn dkg_accept(&self, peer: &Peer, beacon_id: &str, envelope: DkgEnvelopeMsg) -> Result<DkgAckMsg> {
        self.dkg_call(peer, beacon_id, envelope, DkgMethod::Accept).await
    }

    async fn dkg_deal(&self, peer: &Peer, beacon_id: &str, envelope: DkgEnvelopeMsg) -> Result<DkgAckMsg> {
        self.dkg_call(peer, beacon_id, envelope, DkgMethod::Deal).await
    }

    async fn dkg_response(&self, peer: &Peer, beacon_id: &str, envelope: DkgEnvelopeMsg) -> Result<DkgAckMsg> {
        self.dkg_call(peer, beacon_id, envelope, DkgMethod::Response).await
    }
}

enum DkgMethod {
    Propose,
    Accept,
    Deal,
    Response,
}

impl TonicBeaconClient {
    async fn dkg_call(
        &self,
        peer: &Peer,
        beacon_id: &str,
        envelope: DkgEnvelopeMsg,
        method: DkgMethod,
    ) -> Result<DkgAckMsg> {
        let mut stub = self.stub(peer).await?;
        let request = pb::DkgEnvelope {
            beacon_id: beacon_id.to_string(),
            sender_index: envelope.sender_index,
            phase: envelope.phase,
            payload: envelope.payload,
        };
        let reply = match method {
            DkgMethod::Propose => stub.propose(request).await,
            DkgMethod::Accept => stub.accept(request).await,
            DkgMethod::Deal => stub.deal(request).await,
            DkgMethod::Response => stub.response(request).await,
        }
        .map_err(Error::from)?
        .into_inner();
        Ok(DkgAckMsg {
            ok: reply.ok,
            error: reply.error,
        })
    }
}
