use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;
use tempfile::TempDir;

/// Find a free TCP port by binding to port 0
pub fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to port 0");
    listener.local_addr().unwrap().port()
}

/// Wait for a TCP port to accept connections
pub async fn wait_for_port(port: u16, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if tokio::time::Instant::now() > deadline {
            panic!("Timed out waiting for port {} to be ready", port);
        }
        if tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port))
            .await
            .is_ok()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Get the path to a compiled binary in the target directory
fn cargo_bin(name: &str) -> PathBuf {
    // Look for the binary in target/debug (standard cargo test location)
    let mut path = std::env::current_exe()
        .expect("Failed to get current exe")
        .parent()
        .expect("No parent")
        .parent()
        .expect("No grandparent")
        .to_path_buf();
    path.push(name);
    if path.exists() {
        return path;
    }

    // Fallback: try target/debug directly
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // integration-tests -> workspace root
    path.push("target");
    path.push("debug");
    path.push(name);
    if path.exists() {
        return path;
    }

    panic!(
        "Binary '{}' not found. Run `cargo build --workspace` first.",
        name
    );
}

/// A spawned ipamd-server process with its own temp-dir database
pub struct TestServer {
    pub port: u16,
    server: Child,
    db_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestServer {
    /// Start a server on an ephemeral port
    pub async fn new() -> Self {
        Self::with_args(&[]).await
    }

    /// Start a server with extra flags (e.g. a gateway convention)
    pub async fn with_args(extra: &[&str]) -> Self {
        let port = find_free_port();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("ipamd.db");

        let server = Command::new(cargo_bin("ipamd-server"))
            .args(["--bind", &format!("127.0.0.1:{}", port)])
            .args(["--db-path", db_path.to_str().unwrap()])
            .args(["--log-level", "debug"])
            .args(extra)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .expect("Failed to start server");

        wait_for_port(port, Duration::from_secs(10)).await;

        Self {
            port,
            server,
            db_path,
            _temp_dir: temp_dir,
        }
    }

    /// Get the API base URL
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Restart the server (same DB path, new port)
    pub async fn restart(&mut self) -> u16 {
        let _ = self.server.kill();
        let _ = self.server.wait();

        let port = find_free_port();

        self.server = Command::new(cargo_bin("ipamd-server"))
            .args(["--bind", &format!("127.0.0.1:{}", port)])
            .args(["--db-path", self.db_path.to_str().unwrap()])
            .args(["--log-level", "debug"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .expect("Failed to restart server");

        wait_for_port(port, Duration::from_secs(10)).await;

        self.port = port;
        port
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.server.kill();
        let _ = self.server.wait();
    }
}

/// Response types for deserialization
#[derive(Debug, serde::Deserialize)]
pub struct Subnet {
    pub id: String,
    pub router_id: String,
    pub cidr: String,
    pub kind: String,
    pub name: Option<String>,
    pub gateway: Option<String>,
    pub gateway_address: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct ListSubnetsResponse {
    pub subnets: Vec<Subnet>,
}

#[derive(Debug, serde::Deserialize)]
pub struct CheckOverlapResponse {
    pub overlaps: bool,
    pub subnets: Vec<Conflict>,
}

#[derive(Debug, serde::Deserialize)]
pub struct Conflict {
    pub id: String,
    pub name: Option<String>,
    pub cidr: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct GeneratePoolResponse {
    pub count: u64,
    pub regenerated: bool,
}

#[derive(Debug, serde::Deserialize)]
pub struct Utilization {
    pub total: u64,
    pub assigned: u64,
    pub free: u64,
    pub percent: u64,
}

#[derive(Debug, serde::Deserialize)]
pub struct IpAddress {
    pub id: String,
    pub subnet_id: String,
    pub address: String,
    pub status: String,
    pub reason: Option<String>,
    pub customer_id: Option<String>,
    pub service_id: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ListAddressesResponse {
    pub addresses: Vec<IpAddress>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    pub suggested_cidr: Option<String>,
    pub conflicts: Option<Vec<Conflict>>,
    pub counts: Option<serde_json::Value>,
}

/// Create a subnet and return it, panicking on any failure
pub async fn create_subnet(client: &reqwest::Client, base: &str, cidr: &str, name: &str) -> Subnet {
    let resp = client
        .post(format!("{}/api/subnets", base))
        .json(&serde_json::json!({
            "router_id": "router-1",
            "cidr": cidr,
            "kind": "private",
            "name": name,
        }))
        .send()
        .await
        .expect("Failed to create subnet");
    assert_eq!(resp.status().as_u16(), 201, "subnet create should be 201");
    resp.json().await.expect("Failed to parse subnet")
}

/// Generate the pool for a subnet, panicking on any failure
pub async fn generate_pool(
    client: &reqwest::Client,
    base: &str,
    subnet_id: &str,
    regenerate: bool,
) -> GeneratePoolResponse {
    let resp = client
        .post(format!("{}/api/subnets/{}/generate-ips", base, subnet_id))
        .json(&serde_json::json!({ "regenerate": regenerate }))
        .send()
        .await
        .expect("Failed to generate pool");
    assert_eq!(resp.status().as_u16(), 200, "pool generation should be 200");
    resp.json().await.expect("Failed to parse generate response")
}

/// List a subnet's addresses, optionally filtered by status
pub async fn list_addresses(
    client: &reqwest::Client,
    base: &str,
    subnet_id: &str,
    status: Option<&str>,
) -> Vec<IpAddress> {
    let mut req = client
        .get(format!("{}/api/ip-addresses", base))
        .query(&[("subnet_id", subnet_id)]);
    if let Some(status) = status {
        req = req.query(&[("status", status)]);
    }
    let resp: ListAddressesResponse = req
        .send()
        .await
        .expect("Failed to list addresses")
        .json()
        .await
        .expect("Failed to parse addresses");
    resp.addresses
}
