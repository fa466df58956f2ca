pub mod err;
pub mod latency;
pub mod loadgen;
pub mod rpc;
pub mod utils;

pub use err::{RPCResult, RpcError, StatusCode};
pub use rpc::msg::{HelloReply, HelloRequest};
pub use rpc::{CallTarget, Caller, CallerKind};
