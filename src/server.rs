use std::{net::SocketAddr, sync::Arc};

use tokio::{
    net::{TcpListener, TcpStream},
    sync::{OwnedSemaphorePermit, Semaphore},
};

use crate::{ledger::SharedLedger, protocol::connection::Connection, session::Session};

/// Accepts terminals forever, each one is served by its own task
///
/// when `max_sessions` is set, new connections are only accepted
/// while fewer than that many sessions are active.
pub async fn serve(listener: TcpListener, ledger: SharedLedger, max_sessions: Option<usize>) {
    let pool = max_sessions.map(|permits| Arc::new(Semaphore::new(permits.max(1))));

    loop {
        let permit = match &pool {
            Some(pool) => match pool.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                // the semaphore is never closed
                Err(_) => None,
            },
            None => None,
        };

        let (conn, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!("failed to accept a connection: {}", err);
                continue;
            }
        };

        tokio::spawn(handle_connection(conn, addr, ledger.clone(), permit));
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ledger: SharedLedger,
    // released once the session is over
    _permit: Option<OwnedSemaphorePermit>,
) {
    tracing::info!("new connection: {}", addr);

    let session = Session::new(ledger);
    if let Err(err) = session.run(Connection::new(stream)).await {
        tracing::warn!("connection {} failed: {}", addr, err);
    }

    tracing::info!("connection closed: {}", addr);
}
