fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");

    // The message types are hand-written prost structs in src/rpc/msg, so only the
    // service stubs are generated here and no protoc is needed.
    let greeter = tonic_build::manual::Service::builder()
        .name("Greeter")
        .package("helloworld")
        .method(
            tonic_build::manual::Method::builder()
                .name("say_hello")
                .route_name("SayHello")
                .input_type("crate::rpc::msg::HelloRequest")
                .output_type("crate::rpc::msg::HelloReply")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .build();

    tonic_build::manual::Builder::new()
        .build_server(true)
        .build_client(true)
        .compile(&[greeter]);
    Ok(())
}
