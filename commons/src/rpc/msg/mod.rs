// Wire-compatible with helloworld.proto:
//   message HelloRequest { string name = 1; }
//   message HelloReply { string message = 1; }

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct HelloRequest {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct HelloReply {
    #[prost(string, tag = "1")]
    pub message: String,
}

impl HelloRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// greeter_client::GreeterClient and greeter_server::{Greeter, GreeterServer}
include!(concat!(env!("OUT_DIR"), "/helloworld.Greeter.rs"));
