fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto");

    // compiled in-process by protox
    let file_descriptors = protox::compile(["dex/api.proto"], ["proto"])?;

    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .include_file("mod.rs")
        .compile_fds(file_descriptors)?;

    Ok(())
}
