use pkgspec_host::{Artifact, ArtifactSource, Capabilities, LoadErrorKind, Validator};
use std::io::{Read, Write};
use std::net::TcpListener;

/// Answers a single HTTP request with the given status line and body.
fn serve_once(status: &'static str, body: Vec<u8>) -> (String, std::thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/validator.wasm", listener.local_addr().unwrap());

    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buffer = [0u8; 1024];
        while !request.windows(4).any(|window| window == b"\r\n\r\n") {
            let count = stream.read(&mut buffer).unwrap();
            if count == 0 {
                break;
            }
            request.extend_from_slice(&buffer[..count]);
        }

        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/wasm\r\nContent-Length: {}\r\n\
            Connection: close\r\n\r\n",
            body.len()
        );

        // The client may hang up early on error statuses.
        let _ = stream
            .write_all(head.as_bytes())
            .and_then(|()| stream.write_all(&body));
    });

    (url, server)
}

#[test]
fn load_from_url() {
    let wasm = wat::parse_str(include_str!("guest.wat")).unwrap();
    let (url, server) = serve_once("200 OK", wasm);

    let artifact = Artifact::load(&ArtifactSource::Url(url.clone())).unwrap();
    server.join().unwrap();
    assert_eq!(artifact.location(), url);

    let mut validator = Validator::instantiate(&artifact, Capabilities::sandboxed()).unwrap();
    validator
        .validate_from_archive("pkg.zip", crate::VALID)
        .unwrap();
}

#[test]
fn not_found() {
    let (url, server) = serve_once("404 Not Found", b"no such module".to_vec());

    let error = Artifact::load(&ArtifactSource::Url(url)).unwrap_err();
    server.join().unwrap();
    assert_eq!(error.kind(), &LoadErrorKind::Fetch);
}

#[test]
fn unreachable() {
    // Nothing listens on the port once the listener is dropped.
    let address = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let error =
        Artifact::load(&ArtifactSource::Url(format!("http://{address}/validator.wasm")))
            .unwrap_err();
    assert_eq!(error.kind(), &LoadErrorKind::Fetch);
    assert!(error.to_string().starts_with("could not load validation module http://"), "{error}");
}
