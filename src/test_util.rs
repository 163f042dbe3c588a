//! Pushgateway stand-in shared by unit and integration tests

use std::net::TcpListener;
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;
use tiny_http::{Response, Server};

/// A request received by [`FakeGateway`]
#[derive(Clone, Debug)]
pub struct RecordedPush {
    /// HTTP method, e.g. `PUT`
    pub method: String,
    /// Request path, starting at `/metrics/job/...`
    pub url: String,
    /// Request body
    pub body: String,
}

/// Pushgateway stand-in, answering every request with a fixed status
///
/// Each request is recorded before it is answered, so once a push call has
/// returned its request is available from [`FakeGateway::try_recv`].
pub struct FakeGateway {
    server: Arc<Server>,
    received: mpsc::Receiver<RecordedPush>,
    thread: Option<JoinHandle<()>>,
}
impl FakeGateway {
    /// Listens on a free local port, answering with `status`
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound
    #[must_use]
    pub fn start(status: u16) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("free port"));
        let (tx, received) = mpsc::channel();
        let thread = {
            let server = Arc::clone(&server);
            std::thread::spawn(move || {
                for mut request in server.incoming_requests() {
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    let _ = tx.send(RecordedPush {
                        method: request.method().to_string(),
                        url: request.url().to_string(),
                        body,
                    });
                    let _ = request.respond(Response::empty(status));
                }
            })
        };
        Self {
            server,
            received,
            thread: Some(thread),
        }
    }

    /// The `host:port` to push to
    ///
    /// # Panics
    ///
    /// Panics if the server is not listening on TCP
    #[must_use]
    pub fn address(&self) -> String {
        let addr = self.server.server_addr().to_ip().expect("tcp listener");
        addr.to_string()
    }

    /// Waits up to 5 seconds for the next request
    ///
    /// # Panics
    ///
    /// Panics if no request arrives in time
    #[track_caller]
    #[must_use]
    pub fn recv(&self) -> RecordedPush {
        self.received
            .recv_timeout(Duration::from_secs(5))
            .expect("push received")
    }

    /// Next request already received, without waiting
    #[must_use]
    pub fn try_recv(&self) -> Option<RecordedPush> {
        self.received.try_recv().ok()
    }
}
impl Drop for FakeGateway {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Address with nothing listening on it
///
/// # Panics
///
/// Panics if no local port can be bound
#[must_use]
pub fn unreachable_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("free port");
    let addr = listener.local_addr().expect("bound");
    drop(listener);
    addr.to_string()
}
