use std::pin::Pin;
use std::sync::Arc;

use tokio_stream::StreamExt;
use tonic::{Request, Response, Status};

use crate::messages::{beacon_to_proto, ChainInfoMsg, DkgAckMsg, DkgEnvelopeMsg, PartialBeaconMsg, StatusMsg};
use crate::pb;
use crate::service::{BeaconService, DkgService};

/// Looks up the per-beacon-id handlers a multi-beacon-id host (the `node`
/// crate) serves. One process, one `GrpcServer`, many beacon ids (§9
/// "Global state").
pub trait BeaconRegistry: Send + Sync {
    fn beacon_service(&self, beacon_id: &str) -> Result<Arc<dyn BeaconService>, Status>;
    fn dkg_service(&self, beacon_id: &str) -> Result<Arc<dyn DkgService>, Status>;
}

/// The gRPC server: adapts the generated `RandBeacon` service trait onto a
/// [`BeaconRegistry`], converting wire messages to/from the core's
/// transport-agnostic [`crate::messages`] types at the boundary.
pub struct GrpcServer<R> {
    registry: Arc<R>,
}

impl<R> GrpcServer<R> {
    pub fn new(registry: Arc<R>) -> Self {
        GrpcServer { registry }
    }

    pub fn into_service(self) -> pb::rand_beacon_server::RandBeaconServer<Self>
    where
        R: BeaconRegistry + 'static,
    {
        pb::rand_beacon_server::RandBeaconServer::new(self)
    }
}

fn envelope_from_proto(e: pb::DkgEnvelope) -> DkgEnvelopeMsg {
    DkgEnvelopeMsg {
        sender_index: e.sender_index,
        phase: e.phase,
        payload: e.payload,
    }
}

fn ack_to_proto(a: DkgAckMsg) -> pb::DkgAck {
    pb::DkgAck {
        ok: a.ok,
        error: a.error,
    }
}

#[tonic::async_trait]
impl<R: BeaconRegistry + 'static> pb::rand_beacon_server::RandBeacon for GrpcServer<R> {
    async fn partial_beacon(
        &self,
        request: Request<pb::PartialBeaconRequest>,
    ) -> Result<Response<pb::Empty>, Status> {
        let req = request.into_inner();
        let service = self.registry.beacon_service(&req.beacon_id)?;
        service
            .partial_beacon(PartialBeaconMsg {
                round: req.round,
                previous_signature: req.previous_signature,
                signer_index: req.signer_index,
                partial_sig: req.partial_sig,
            })
            .await
            .map_err(Into::into)?;
        Ok(Response::new(pb::Empty {}))
    }

    type SyncChainStream =
        Pin<Box<dyn tokio_stream::Stream<Item = Result<pb::BeaconReply, Status>> + Send + 'static>>;

    async fn sync_chain(
        &self,
        request: Request<pb::SyncChainRequest>,
    ) -> Result<Response<Self::SyncChainStream>, Status> {
        let req = request.into_inner();
        let service = self.registry.beacon_service(&req.beacon_id)?;
        let inner = service.sync_chain(req.from_round).await.map_err(Status::from)?;
        let mapped = inner.map(|item| item.map(|b| beacon_to_proto(&b)).map_err(Status::from));
        Ok(Response::new(Box::pin(mapped)))
    }

    async fn chain_info(
        &self,
        request: Request<pb::ChainInfoRequest>,
    ) -> Result<Response<pb::ChainInfoReply>, Status> {
        let req = request.into_inner();
        let service = self.registry.beacon_service(&req.beacon_id)?;
        let info: ChainInfoMsg = service.chain_info().await.map_err(Status::from)?;
        Ok(Response::new(pb::ChainInfoReply {
            public_key: info.public_key,
            period_seconds: info.period_seconds,
            genesis_time: info.genesis_time,
            hash: info.hash,
            genesis_seed: info.genesis_seed,
            scheme_id: info.scheme_id,
        }))
    }

    async fn status(
        &self,
        request: Request<pb::StatusRequest>,
    ) -> Result<Response<pb::StatusReply>, Status> {
        let req = request.into_inner();
        let service = self.registry.beacon_service(&req.beacon_id)?;
        let status: StatusMsg = service.status().await.map_err(Status::from)?;
        Ok(Response::new(pb::StatusReply {
            running: status.running,
            serving: status.serving,
            chain_head: status.chain_head,
            known_peers: status.known_peers,
        }))
    }

    async fn propose(&self, request: Request<pb::DkgEnvelope>) -> Result<Response<pb::DkgAck>, Status> {
        let req = request.into_inner();
        let dkg = self.registry.dkg_service(&req.beacon_id)?;
        let ack = dkg.propose(envelope_from_proto(req)).await.map_err(Status::from)?;
        Ok(Response::new(ack_to_proto(ack)))
    }

    async fn accept(&self, request: Request<pb::DkgEnvelope>) -> Result<Response<pb::DkgAck>, Status> {
        let req = request.into_inner();
        let dkg = self.registry.dkg_service(&req.beacon_id)?;
        let ack = dkg.accept(envelope_from_proto(req)).await.map_err(Status::from)?;
        Ok(Response::new(ack_to_proto(ack)))
    }

    async fn deal(&self, request: Request<pb::DkgEnvelope>) -> Result<Response<pb::DkgAck>, Status> {
        let req = request.into_inner();
        let dkg = self.registry.dkg_service(&req.beacon_id)?;
        let ack = dkg.deal(envelope_from_proto(req)).await.map_err(Status::from)?;
        Ok(Response::new(ack_to_proto(ack)))
    }

    async fn response(&self, request: Request<pb::DkgEnvelope>) -> Result<Response<pb::DkgAck>, Status> {
        let req = request.into_inner();
        let dkg = self.registry.dkg_service(&req.beacon_id)?;
        let ack = dkg.response(envelope_from_proto(req)).await.map_err(Status::from)?;
        Ok(Response::new(ack_to_proto(ack)))
    }
}
