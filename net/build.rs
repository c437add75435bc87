fn main() {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(&["proto/randbeacon.proto"], &["proto"])
        .expect("failed to compile randbeacon.proto");
}
