//! Shared test scaffolding: self-signed certificate pairs for the TLS
//! mutual-auth handshake, each peer trusting the other's own leaf cert
//! directly as its root (no intermediate CA needed for a two-party
//! tunnel).

use std::path::PathBuf;

use rcgen::{generate_simple_self_signed, CertifiedKey};

pub struct PeerCert {
    dir: PathBuf,
}

impl PeerCert {
    fn new(name: &str, san: &str) -> (Self, Vec<u8>) {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec![san.to_string()]).expect("self-signed cert");
        let dir = std::env::temp_dir().join(format!(
            "meridian-test-{}-{}-{}",
            name,
            std::process::id(),
            rand_suffix()
        ));
        std::fs::create_dir_all(&dir).expect("create cert dir");
        std::fs::write(dir.join("cert.pem"), cert.pem()).expect("write cert");
        std::fs::write(dir.join("key.pem"), key_pair.serialize_pem()).expect("write key");
        let cert_pem = cert.pem().into_bytes();
        (Self { dir }, cert_pem)
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.join("cert.pem")
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join("key.pem")
    }
}

impl Drop for PeerCert {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn rand_suffix() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .subsec_nanos() as u64
}

/// Builds a mutually-trusting pair of identities for a server and a
/// client: each side's `TlsMaterial` points at its own cert/key plus
/// the other side's cert as its sole trust root.
pub struct TunnelIdentities {
    pub server: PeerCert,
    pub client: PeerCert,
    /// Trust bundle the server uses to verify the client (contains the
    /// client's own cert).
    server_trust_path: PathBuf,
    /// Trust bundle the client uses to verify the server.
    client_trust_path: PathBuf,
}

impl TunnelIdentities {
    pub fn generate() -> Self {
        let (server, server_pem) = PeerCert::new("server", "localhost");
        let (client, client_pem) = PeerCert::new("client", "tunnel-client");

        let server_ca_dir = std::env::temp_dir().join(format!(
            "meridian-test-server-ca-{}-{}",
            std::process::id(),
            rand_suffix()
        ));
        std::fs::create_dir_all(&server_ca_dir).unwrap();
        let server_ca_path = server_ca_dir.join("trust.pem");
        std::fs::write(&server_ca_path, &client_pem).unwrap();

        let client_ca_dir = std::env::temp_dir().join(format!(
            "meridian-test-client-ca-{}-{}",
            std::process::id(),
            rand_suffix()
        ));
        std::fs::create_dir_all(&client_ca_dir).unwrap();
        let client_ca_path = client_ca_dir.join("trust.pem");
        std::fs::write(&client_ca_path, &server_pem).unwrap();

        Self {
            server,
            client,
            server_trust_path: server_ca_path,
            client_trust_path: client_ca_path,
        }
    }

    pub fn server_material(&self) -> meridian_transport::TlsMaterial {
        meridian_transport::TlsMaterial {
            cert_path: self.server.cert_path(),
            key_path: self.server.key_path(),
            ca_path: self.server_trust_path.clone(),
        }
    }

    pub fn client_material(&self) -> meridian_transport::TlsMaterial {
        meridian_transport::TlsMaterial {
            cert_path: self.client.cert_path(),
            key_path: self.client.key_path(),
            ca_path: self.client_trust_path.clone(),
        }
    }
}

pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .unwrap()
        .port()
}
