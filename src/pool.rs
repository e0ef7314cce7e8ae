//! Connection pool: a bounded set of reusable clients per
//! `(host, port, transport)` key, with transparent redirection
//! handling and protocol upgrade hand-off.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use rand::Rng as _;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use crate::client::{
    self, ClientExit, ClientHandle, ClientId, ClientOptions, ClientReply, Credentials, Delegated,
    ExitReason,
};
use crate::connect::Transport;
use crate::error::Error;
use crate::netrc;
use crate::protocol::Protocol;
use crate::registry;
use crate::request::Request;
use crate::response::Response;
use crate::uri;

/// Pool identifier, a short interned name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolId(Arc<str>);

impl PoolId {
    pub fn new(id: impl AsRef<str>) -> PoolId {
        PoolId(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PoolId {
    fn default() -> Self {
        PoolId::new("default")
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PoolId {
    fn from(id: &str) -> Self {
        PoolId::new(id)
    }
}

/// Connection deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.transport)
    }
}

#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Merged into every client the pool creates; `host`, `port` and
    /// `transport` are always overridden per connection.
    pub client_options: ClientOptions,
    pub max_connections_per_key: usize,
    /// Consult the credential store for matching hosts.
    pub use_netrc: bool,
    /// Credential store location, `~/.netrc` when unset.
    pub netrc_path: Option<PathBuf>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            client_options: ClientOptions::default(),
            max_connections_per_key: 1,
            use_netrc: false,
            netrc_path: None,
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Target pool for [`crate::send_request`].
    pub pool: Option<PoolId>,
    pub follow_redirections: bool,
    pub max_nb_redirections: u32,
    /// Upgrade protocol; its presence makes the client treat a 101
    /// response as a hand-off.
    pub protocol: Option<Arc<dyn Protocol>>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        RequestOptions {
            pool: None,
            follow_redirections: true,
            max_nb_redirections: 5,
            protocol: None,
        }
    }
}

/// Result of a pool request.
#[derive(Debug)]
pub enum Outcome {
    Response(Response),
    /// A validated protocol upgrade; the connection no longer belongs
    /// to the pool.
    Upgraded(Response, crate::protocol::Upgraded),
}

impl Outcome {
    /// The response, discarding an upgrade hand-off if any.
    pub fn into_response(self) -> Response {
        match self {
            Outcome::Response(resp) => resp,
            Outcome::Upgraded(resp, _) => resp,
        }
    }
}

/// Index sizes, for observation and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub clients: usize,
    pub keys: usize,
}

enum PoolMsg {
    Acquire {
        key: ClientKey,
        credentials: Option<Credentials>,
        reply: oneshot::Sender<Result<ClientHandle, Error>>,
    },
    Stats {
        reply: oneshot::Sender<PoolStats>,
    },
    Stop,
}

/// Handle to a running pool.
///
/// Cloning is cheap; all clones drive the same pool task. The pool
/// stops when [`stop`](Pool::stop) is called or every handle is
/// dropped.
#[derive(Debug, Clone)]
pub struct Pool {
    id: PoolId,
    tx: mpsc::Sender<PoolMsg>,
    shared: Arc<PoolShared>,
}

#[derive(Debug)]
struct PoolShared {
    options: PoolOptions,
    netrc: Vec<netrc::Entry>,
}

impl Pool {
    /// Spawn a pool task. Must be called within a tokio runtime.
    pub fn start(id: PoolId, options: PoolOptions) -> Pool {
        let entries = if options.use_netrc {
            load_netrc(&id, options.netrc_path.clone())
        } else {
            Vec::new()
        };

        let shared = Arc::new(PoolShared {
            options,
            netrc: entries,
        });

        let (tx, rx) = mpsc::channel(32);
        let (exit_tx, exit_rx) = mpsc::channel(32);

        let task = PoolTask {
            id: id.clone(),
            shared: Arc::clone(&shared),
            clients_by_key: HashMap::new(),
            clients_by_id: HashMap::new(),
            rx,
            exit_tx,
            exit_rx,
        };
        tokio::spawn(task.run());

        Pool { id, tx, shared }
    }

    pub fn id(&self) -> &PoolId {
        &self.id
    }

    /// Send a request, following redirections up to the configured
    /// budget and surfacing protocol upgrades.
    pub async fn send_request(
        &self,
        req: Request,
        options: RequestOptions,
    ) -> Result<Outcome, Error> {
        let canonical = uri::canonicalize(&req.target)?;

        if let Some(protocol) = &options.protocol {
            protocol.validate_target(&canonical)?;
        }

        let mut req = req;
        let mut url = canonical;
        let mut redirections_left = options.max_nb_redirections;

        loop {
            let (credentials, port_override) = self.credentials_for(&url);
            let key = uri::client_key(&url, port_override)?;
            req.target = uri::send_target(&url);

            let reply = loop {
                let client = self.acquire(key.clone(), credentials.clone()).await?;
                match client.send_request(req.clone(), options.protocol.clone()).await {
                    // the client terminated before accepting the
                    // request; acquisition opens a fresh one
                    Delegated::Gone(returned) => req = returned,
                    Delegated::Reply(reply) => break reply,
                }
            };

            let resp = match reply? {
                ClientReply::Upgraded(resp, upgraded) => {
                    return Ok(Outcome::Upgraded(resp, upgraded));
                }
                ClientReply::Response(resp) => resp,
            };

            let redirected = options.follow_redirections
                && resp.status.is_redirection()
                && resp.header.contains("Location");
            if !redirected {
                return Ok(Outcome::Response(resp));
            }

            if redirections_left == 0 {
                return Err(Error::TooManyRedirections);
            }
            redirections_left -= 1;

            // the reference resolves against the canonical URI of
            // this hop, not the origin-form send target
            let location = resp.header.find("Location").expect("checked above");
            let next = url
                .join(location)
                .map_err(|err| Error::InvalidTarget(err.to_string()))?;

            log::debug!(
                target: "gannet::pool",
                "pool {}: following {} redirection to {next}",
                self.id,
                resp.status.as_u16(),
            );

            // RFC 7231 §6.4: 303 rewrites to a bodyless GET, the
            // other redirections preserve method and body
            if resp.status == StatusCode::SEE_OTHER {
                req.method = Method::GET;
                req.body = Bytes::new();
                req.header.remove_all(&["Content-Length", "Transfer-Encoding"]);
            }

            if !uri::same_origin(&url, &next) {
                req.header.remove("Authorization");
            }

            url = next;
        }
    }

    /// Current index sizes. Zero after the pool stopped.
    pub async fn stats(&self) -> PoolStats {
        let empty = PoolStats { clients: 0, keys: 0 };
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(PoolMsg::Stats { reply: reply_tx }).await.is_err() {
            return empty;
        }
        reply_rx.await.unwrap_or(empty)
    }

    /// Stop the pool task; its clients terminate with it.
    pub async fn stop(&self) {
        let _ = self.tx.send(PoolMsg::Stop).await;
    }

    async fn acquire(
        &self,
        key: ClientKey,
        credentials: Option<Credentials>,
    ) -> Result<ClientHandle, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PoolMsg::Acquire {
                key,
                credentials,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::ClientError("pool stopped".into()))?;
        reply_rx
            .await
            .map_err(|_| Error::ClientError("pool stopped".into()))?
    }

    fn credentials_for(&self, url: &Url) -> (Option<Credentials>, Option<u16>) {
        if !self.shared.options.use_netrc {
            return (None, None);
        }
        let Some(host) = url.host_str() else {
            return (None, None);
        };
        match netrc::lookup(&self.shared.netrc, host) {
            Some(entry) => (entry.credentials(), entry.port_override()),
            None => (None, None),
        }
    }
}

fn load_netrc(id: &PoolId, path: Option<PathBuf>) -> Vec<netrc::Entry> {
    let Some(path) = path.or_else(netrc::default_path) else {
        log::warn!(target: "gannet::pool", "pool {id}: no home directory, credential store disabled");
        return Vec::new();
    };
    match netrc::load(&path) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!(target: "gannet::pool", "pool {id}: cannot load {path:?}: {err}");
            Vec::new()
        }
    }
}

struct PoolTask {
    id: PoolId,
    shared: Arc<PoolShared>,
    clients_by_key: HashMap<ClientKey, Vec<ClientHandle>>,
    clients_by_id: HashMap<ClientId, ClientKey>,
    rx: mpsc::Receiver<PoolMsg>,
    exit_tx: mpsc::Sender<ClientExit>,
    exit_rx: mpsc::Receiver<ClientExit>,
}

impl PoolTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    None | Some(PoolMsg::Stop) => break,
                    Some(PoolMsg::Acquire { key, credentials, reply }) => {
                        let result = self.acquire(key, credentials).await;
                        let _ = reply.send(result);
                    }
                    Some(PoolMsg::Stats { reply }) => {
                        let _ = reply.send(self.stats());
                    }
                },
                exit = self.exit_rx.recv() => {
                    if let Some(exit) = exit {
                        self.prune(exit);
                    }
                }
            }
        }
        log::trace!(target: "gannet::pool", "pool {} stopping", self.id);
    }

    /// Reuse a pooled client below the per-key cap, spawning a new
    /// one when the bucket has room; pick uniformly at random when it
    /// is full.
    async fn acquire(
        &mut self,
        key: ClientKey,
        credentials: Option<Credentials>,
    ) -> Result<ClientHandle, Error> {
        self.harvest(&key);

        let max = self.shared.options.max_connections_per_key.max(1);
        let len = self.clients_by_key.get(&key).map_or(0, Vec::len);

        if len < max {
            let options = self.client_options_for(&key, credentials);
            let handle = client::open(options, Some(self.exit_tx.clone())).await?;
            log::trace!(
                target: "gannet::pool",
                "pool {}: client {} connected to {key}",
                self.id,
                handle.id(),
            );
            self.clients_by_id.insert(handle.id(), key.clone());
            self.clients_by_key.entry(key).or_default().push(handle.clone());
            Ok(handle)
        } else {
            let bucket = &self.clients_by_key[&key];
            let index = rand::thread_rng().gen_range(0..bucket.len());
            Ok(bucket[index].clone())
        }
    }

    /// Drop handles whose task is already gone; their exit notices
    /// may still be in flight.
    fn harvest(&mut self, key: &ClientKey) {
        let Some(bucket) = self.clients_by_key.get_mut(key) else {
            return;
        };
        let mut dead = Vec::new();
        bucket.retain(|handle| {
            if handle.is_closed() {
                dead.push(handle.id());
                false
            } else {
                true
            }
        });
        if bucket.is_empty() {
            self.clients_by_key.remove(key);
        }
        for id in dead {
            self.clients_by_id.remove(&id);
        }
    }

    fn prune(&mut self, exit: ClientExit) {
        if let ExitReason::Failed(err) = &exit.reason {
            log::warn!(
                target: "gannet::pool",
                "pool {}: client {} terminated: {err}",
                self.id,
                exit.id,
            );
        }

        let Some(key) = self.clients_by_id.remove(&exit.id) else {
            log::warn!(
                target: "gannet::pool",
                "pool {}: exit notice for unknown client {}",
                self.id,
                exit.id,
            );
            return;
        };
        if let Some(bucket) = self.clients_by_key.get_mut(&key) {
            bucket.retain(|handle| handle.id() != exit.id);
            if bucket.is_empty() {
                self.clients_by_key.remove(&key);
            }
        }
    }

    fn stats(&self) -> PoolStats {
        debug_assert_eq!(
            self.clients_by_id.len(),
            self.clients_by_key.values().map(Vec::len).sum::<usize>(),
        );
        PoolStats {
            clients: self.clients_by_id.len(),
            keys: self.clients_by_key.len(),
        }
    }

    fn client_options_for(
        &self,
        key: &ClientKey,
        credentials: Option<Credentials>,
    ) -> ClientOptions {
        let mut options = self.shared.options.client_options.clone();
        options.host = key.host.clone();
        options.port = key.port;
        options.transport = key.transport;
        options.pool = Some(self.id.clone());
        if credentials.is_some() {
            options.credentials = credentials;
        }
        if options.ca_certificate_bundle_path.is_none() {
            options.ca_certificate_bundle_path = registry::ca_certificate_bundle_path();
        }
        options
    }
}
