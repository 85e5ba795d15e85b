//! gRPC transport layer for simrelay.
//!
//! Every RPC carries JSON bytes of the library types, so the wire surface
//! stays the same as the Rust API. `run` and `stop` may block (agent client
//! construction, joining the runner) and are moved off the async workers.

use std::sync::Arc;

use serde::Serialize;
use tonic::{Request, Response, Status};

use crate::config::SimConfig;
use crate::dispatcher::RequestDispatcher;
use crate::error::SimError;

/// Generated protobuf types.
#[allow(missing_docs)]
pub mod proto {
    tonic::include_proto!("simrelay");
}

use proto::sim_relay_service_server::{SimRelayService, SimRelayServiceServer};

/// Maximum size of a `SimConfig` JSON payload.
const MAX_CONFIG_JSON_BYTES: usize = 64 * 1024;

/// Maximum size of a response JSON payload.
const MAX_RESPONSE_JSON_BYTES: usize = 4 * 1024 * 1024; // 4 MiB

/// gRPC service implementation backed by a [`RequestDispatcher`].
pub struct SimRelayServiceImpl {
    dispatcher: Arc<RequestDispatcher>,
}

impl SimRelayServiceImpl {
    /// Service over `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Wraps the service for `tonic::transport::Server`.
    #[must_use]
    pub fn into_server(self) -> SimRelayServiceServer<Self> {
        SimRelayServiceServer::new(self)
    }
}

fn invalid_argument(msg: impl Into<String>) -> Status {
    Status::invalid_argument(msg.into())
}

fn parse_config(bytes: &[u8]) -> Result<SimConfig, Status> {
    if bytes.is_empty() {
        return Err(invalid_argument("config_json is required"));
    }
    if bytes.len() > MAX_CONFIG_JSON_BYTES {
        return Err(invalid_argument("config_json exceeds maximum size"));
    }
    serde_json::from_slice(bytes).map_err(|e| invalid_argument(format!("invalid SimConfig JSON: {e}")))
}

fn encode_json<T: Serialize>(value: &T) -> Result<proto::JsonResponse, Status> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| Status::internal(format!("failed to serialize response JSON: {e}")))?;
    if bytes.len() > MAX_RESPONSE_JSON_BYTES {
        return Err(Status::resource_exhausted("serialized JSON exceeds size limit"));
    }
    Ok(proto::JsonResponse { response_json: bytes })
}

fn status_from_sim_error(err: SimError) -> Status {
    match err {
        SimError::Config(e) => Status::invalid_argument(e.to_string()),
        e @ SimError::RunRejected { .. } => Status::failed_precondition(e.to_string()),
        e => Status::internal(e.to_string()),
    }
}

fn join_error(err: tokio::task::JoinError) -> Status {
    Status::internal(format!("blocking task failed: {err}"))
}

#[tonic::async_trait]
impl SimRelayService for SimRelayServiceImpl {
    async fn list_maps(
        &self,
        _request: Request<proto::ListMapsRequest>,
    ) -> Result<Response<proto::JsonResponse>, Status> {
        Ok(Response::new(encode_json(&self.dispatcher.list_maps())?))
    }

    async fn sim_status(
        &self,
        _request: Request<proto::SimStatusRequest>,
    ) -> Result<Response<proto::JsonResponse>, Status> {
        Ok(Response::new(encode_json(&self.dispatcher.sim_status())?))
    }

    async fn observe(
        &self,
        _request: Request<proto::ObserveRequest>,
    ) -> Result<Response<proto::JsonResponse>, Status> {
        Ok(Response::new(encode_json(&self.dispatcher.observe())?))
    }

    async fn run(
        &self,
        request: Request<proto::RunRequest>,
    ) -> Result<Response<proto::JsonResponse>, Status> {
        let config = parse_config(&request.into_inner().config_json)?;
        let dispatcher = Arc::clone(&self.dispatcher);
        let status = tokio::task::spawn_blocking(move || dispatcher.run(config))
            .await
            .map_err(join_error)?
            .map_err(status_from_sim_error)?;
        Ok(Response::new(encode_json(&status)?))
    }

    async fn stop(
        &self,
        _request: Request<proto::StopRequest>,
    ) -> Result<Response<proto::JsonResponse>, Status> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let status = tokio::task::spawn_blocking(move || dispatcher.stop())
            .await
            .map_err(join_error)?;
        Ok(Response::new(encode_json(&status)?))
    }
}
