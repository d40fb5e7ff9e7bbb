//! gRPC transport for the standalone scheduler backend: bridges
//! `scheduler_core`'s transport-agnostic wire protocol to a tonic
//! bidirectional-streaming RPC, one stream per executor connection.

pub mod grpc;
