use crate::client::Client;
use crate::error::ClientError;
use crate::store::Store;
use crate::types::{Operation, Request, Response, ValueHolder, ValueType};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of the dispatcher control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Constructed, loop not yet running
    Idle,
    /// Serving requests
    Running,
    /// Store persisted and shutdown acknowledged; terminal
    Stopped,
}

/// Single-writer actor owning the [`Store`]
///
/// Every read and write goes through one control loop, so the map needs no
/// lock and requests are applied in the order they arrive on the channel.
pub struct Dispatcher {
    store: Store,
    requests: mpsc::Receiver<Request>,
    shutdown: mpsc::Receiver<oneshot::Sender<()>>,
    state: watch::Sender<DispatcherState>,
}

/// Cloneable handle used to submit requests and to stop the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    requests: mpsc::Sender<Request>,
    shutdown: mpsc::Sender<oneshot::Sender<()>>,
    state: watch::Receiver<DispatcherState>,
}

impl Dispatcher {
    /// Create a dispatcher around `store` with a request queue of `capacity`
    pub fn new(store: Store, capacity: usize) -> (Self, DispatcherHandle) {
        let (requests_tx, requests_rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(DispatcherState::Idle);

        let dispatcher = Self {
            store,
            requests: requests_rx,
            shutdown: shutdown_rx,
            state: state_tx,
        };
        let handle = DispatcherHandle {
            requests: requests_tx,
            shutdown: shutdown_tx,
            state: state_rx,
        };
        (dispatcher, handle)
    }

    /// Spawn the control loop, loading the store from disk first
    ///
    /// The file is read on the blocking pool. A failed load is logged and the
    /// dispatcher serves whatever was loaded.
    pub fn start(mut self) -> JoinHandle<()> {
        info!("Starting keystore dispatcher");
        tokio::spawn(async move {
            let mut store = std::mem::take(&mut self.store);
            match tokio::task::spawn_blocking(move || {
                let loaded = store.load();
                (store, loaded)
            })
            .await
            {
                Ok((store, loaded)) => {
                    self.store = store;
                    if let Err(e) = loaded {
                        error!("Failed to load keystore: {}", e);
                    }
                }
                Err(e) => error!("Keystore load task failed: {}", e),
            }
            self.run().await
        })
    }

    /// Run the control loop until shutdown is requested or every handle is gone
    pub async fn run(mut self) {
        self.state.send_replace(DispatcherState::Running);

        loop {
            tokio::select! {
                Some(request) = self.requests.recv() => self.handle(request),
                Some(complete) = self.shutdown.recv() => {
                    info!("Stopping keystore dispatcher");
                    self.persist();
                    self.state.send_replace(DispatcherState::Stopped);
                    let _ = complete.send(());
                    return;
                }
                else => break,
            }
        }

        warn!("All dispatcher handles dropped, stopping");
        self.persist();
        self.state.send_replace(DispatcherState::Stopped);
    }

    // Saves inline: the loop serves nothing more once shutdown begins
    fn persist(&self) {
        if let Err(e) = self.store.save() {
            error!("Error saving values to disk: {}", e);
        }
    }

    fn handle(&mut self, request: Request) {
        debug!(
            "{} key={} type={}",
            request.op, request.key, request.value.value_type
        );

        let response = match request.op {
            Operation::Read => self.read(&request.key, request.value.value_type),
            Operation::Write => self.write(&request.key, &request.value),
            Operation::Delete => self.delete(&request.key),
        };

        // A oneshot send never waits on the receiver, so a slow caller cannot
        // hold up the loop.
        if !request.respond(response) {
            debug!("Requester went away before the response was delivered");
        }
    }

    fn read(&self, key: &str, value_type: ValueType) -> Response {
        match self.store.get_typed(key, value_type) {
            Ok(value) => {
                let result_type = match value_type {
                    ValueType::None => ValueType::of(value),
                    declared => declared,
                };
                Response::ok(ValueHolder::new(result_type, value.clone()))
            }
            Err(e) => Response::failure(e.to_string(), ValueHolder::empty(value_type)),
        }
    }

    fn write(&mut self, key: &str, value: &ValueHolder) -> Response {
        match self.store.set_typed(key, value.value_type, value.val.clone()) {
            Ok(()) => Response::ok(ValueHolder::empty(value.value_type)),
            Err(e) => Response::failure(e.to_string(), ValueHolder::empty(value.value_type)),
        }
    }

    fn delete(&mut self, key: &str) -> Response {
        self.store.delete(key);
        Response::ok(ValueHolder::empty(ValueType::None))
    }
}

impl DispatcherHandle {
    /// Sender side of the request channel, for transport servers
    pub fn requests(&self) -> mpsc::Sender<Request> {
        self.requests.clone()
    }

    /// A façade talking to this dispatcher directly
    pub fn client(&self) -> Client {
        Client::new(self.requests.clone())
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    /// Ask the dispatcher to persist and exit, waiting for the acknowledgment
    pub async fn stop(&self) -> Result<(), ClientError> {
        let (complete, done) = oneshot::channel();
        self.shutdown
            .send(complete)
            .await
            .map_err(|_| ClientError::Closed)?;
        done.await.map_err(|_| ClientError::Closed)
    }

    /// Wait until the control loop has reached [`DispatcherState::Stopped`]
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == DispatcherState::Stopped).await;
    }
}
