use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kvbench::{Barrier, MasterCoordinator, Node};
use tokio::net::TcpListener;

/// Bind an ephemeral loopback listener, or `None` when the sandbox forbids sockets.
#[allow(dead_code)]
pub async fn ephemeral_listener() -> Option<TcpListener> {
    match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => Some(listener),
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            eprintln!("skipping network test (permission denied binding socket: {err})");
            None
        }
        Err(err) => panic!("bind ephemeral listener: {err}"),
    }
}

/// Address that was bound once and released, so nothing listens on it.
#[allow(dead_code)]
pub async fn dead_address() -> Option<SocketAddr> {
    let listener = ephemeral_listener().await?;
    let addr = listener.local_addr().expect("read listener addr");
    drop(listener);
    Some(addr)
}

/// Start a master for a run of `total_nodes` on an ephemeral port.
#[allow(dead_code)]
pub async fn start_master(
    total_nodes: u32,
    settle_timeout: Option<Duration>,
) -> Option<(Arc<MasterCoordinator>, Arc<Barrier>)> {
    let listener = ephemeral_listener().await?;
    let addr = listener.local_addr().expect("read listener addr");
    let barrier = Arc::new(Barrier::new());
    let master = MasterCoordinator::start(
        Node::new(1, addr.to_string()),
        total_nodes,
        barrier.clone(),
        listener,
        settle_timeout,
    )
    .expect("start master");
    Some((Arc::new(master), barrier))
}

#[allow(dead_code)]
pub fn endpoint(addr: SocketAddr) -> String {
    format!("http://{addr}")
}
