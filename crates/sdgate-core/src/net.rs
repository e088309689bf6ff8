//! Listen socket helper.

use tokio::net::TcpListener;
use tracing::{debug, error};

use crate::error::{StoreError, StoreResult};

/// Create a TCP listener on the given address and port.
///
/// Port 0 binds an ephemeral port; read it back with `local_addr()`.
pub async fn create_listen_socket(bind_addr: &str, port: u16) -> StoreResult<TcpListener> {
    let addr = format!("{}:{}", bind_addr, port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!("failed to bind to {}: {}", addr, e);
        StoreError::Config(format!("cannot bind {}: {}", addr, e))
    })?;

    debug!("listening on {}", addr);
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral() {
        let listener = create_listen_socket("127.0.0.1", 0).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_unassigned_address() {
        // TEST-NET-1 is never assigned to a local interface
        let err = create_listen_socket("192.0.2.1", 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }
}
