//! Helpers shared by unit and integration tests.

/// First bytes of a PNG file; stands in for generated images in mocks.
pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3];

/// httpmock needs a loopback listener; some sandboxes refuse one.
pub fn should_skip_httpmock() -> bool {
    match std::net::TcpListener::bind(("127.0.0.1", 0)) {
        Ok(_) => false,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping mock upstream test: loopback bind denied");
            true
        }
        Err(err) => panic!("failed to bind loopback for mock upstream: {err}"),
    }
}
