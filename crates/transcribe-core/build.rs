//! Compiles the ASR provider's `.proto` contract into Rust bindings.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protoc = protoc_bin_vendored::protoc_bin_path()?;
    std::env::set_var("PROTOC", protoc);

    tonic_build::configure()
        .build_server(false)
        .compile_protos(&["proto/asr_stream.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/asr_stream.proto");
    Ok(())
}
