const PROTO: &str = "proto/simrelay.proto";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={PROTO}");

    // The library and its tests talk to the orchestrator in-process; only the
    // gRPC service needs generated code.
    if std::env::var_os("CARGO_FEATURE_TRANSPORT_GRPC").is_none() {
        return Ok(());
    }

    let protoc_path = protoc_bin_vendored::protoc_bin_path()
        .map_err(|e| format!("failed to locate vendored protoc: {e}"))?;
    std::env::set_var("PROTOC", protoc_path);

    // Server stubs only. Callers bring their own client from the .proto.
    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&[PROTO], &["proto/"])?;
    Ok(())
}
