//! Build script for curalink-proto
//!
//! Compiles protobuf definitions using tonic-build.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = "../../proto";

    let protos = [
        "curalink/v1/common.proto",
        "curalink/v1/auth.proto",
        "curalink/v1/rooms.proto",
        "curalink/v1/signaling.proto",
        "curalink/v1/health.proto",
    ];

    let proto_paths: Vec<_> = protos
        .iter()
        .map(|p| format!("{}/{}", proto_root, p))
        .collect();

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .build_transport(false)
        .compile_protos(&proto_paths, &[proto_root.to_string()])?;

    Ok(())
}
