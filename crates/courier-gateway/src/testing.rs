//! Test doubles: an in-memory store, in-process connection pipes and frame
//! builders.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::{Result, bail};
use axum::extract::ws::Message;
use chrono::Utc;
use futures_util::Sink;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha1::{Digest, Sha1};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use courier_db::{Registration as Outcome, Store, StoredMessage};
use courier_types::{
    Authentication, MailboxMessage, NewIdentity, OutboundMessage, Registration, Response,
    ResponseFlag,
};

use crate::connection::{Connection, ConnectionClosed};
use crate::gateway::Gateway;
use crate::notify::{Notice, Notifier, NullNotifier};

// -- Store --

struct Identity {
    secret: Vec<u8>,
    name: String,
    last_address: Option<String>,
}

#[derive(Default)]
struct State {
    identities: HashMap<String, Identity>,
    mailboxes: HashMap<String, Vec<StoredMessage>>,
    next_id: i64,
}

/// In-memory [`Store`] with switches for the failure modes the sessions
/// have to survive.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    offline: AtomicBool,
    failing_probes: AtomicUsize,
    probes: AtomicUsize,
    failing_deletes: AtomicBool,
    failing_address_writes: AtomicBool,
    failing_mailbox_lists: AtomicBool,
    failing_mailbox_deletes: AtomicBool,
    racing_registration: AtomicBool,
}

impl MemoryStore {
    /// Register `username` with the secret from [`secret_for`] and an empty
    /// mailbox.
    pub fn add_identity(&self, username: &str) {
        let mut state = self.state.lock().unwrap();
        state.identities.insert(
            username.to_string(),
            Identity {
                secret: secret_for(username),
                name: username.to_string(),
                last_address: None,
            },
        );
        state.mailboxes.insert(username.to_string(), Vec::new());
    }

    /// Every call, probe included, fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_next_probes(&self, count: usize) {
        self.failing_probes.store(count, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn fail_identity_deletes(&self, fail: bool) {
        self.failing_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_address_writes(&self, fail: bool) {
        self.failing_address_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mailbox_lists(&self, fail: bool) {
        self.failing_mailbox_lists.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mailbox_deletes(&self, fail: bool) {
        self.failing_mailbox_deletes.store(fail, Ordering::SeqCst);
    }

    /// The next create reports the username as taken, as if another
    /// registration won the insert.
    pub fn race_next_registration(&self) {
        self.racing_registration.store(true, Ordering::SeqCst);
    }

    pub fn queue(&self, recipient: &str, sender: &str, text: &str) {
        let message = MailboxMessage {
            timestamp: Utc::now(),
            text: text.to_string(),
            sender: sender.to_string(),
        };
        self.enqueue_mailbox_message(recipient, &message).unwrap();
    }

    pub fn mailbox(&self, username: &str) -> Vec<MailboxMessage> {
        self.state
            .lock()
            .unwrap()
            .mailboxes
            .get(username)
            .map(|queued| queued.iter().map(|stored| stored.message.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has_identity(&self, username: &str) -> bool {
        self.state.lock().unwrap().identities.contains_key(username)
    }

    pub fn has_mailbox(&self, username: &str) -> bool {
        self.state.lock().unwrap().mailboxes.contains_key(username)
    }

    pub fn display_name(&self, username: &str) -> Option<String> {
        self.state.lock().unwrap().identities.get(username).map(|i| i.name.clone())
    }

    pub fn last_address(&self, username: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .identities
            .get(username)
            .and_then(|i| i.last_address.clone())
    }

    fn online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("store offline");
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn identity_exists_by_secret(&self, secret: &[u8]) -> Result<bool> {
        self.online()?;
        let state = self.state.lock().unwrap();
        Ok(state.identities.values().any(|i| i.secret == secret))
    }

    fn username_for_secret(&self, secret: &[u8]) -> Result<Option<String>> {
        self.online()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .identities
            .iter()
            .find(|(_, i)| i.secret == secret)
            .map(|(username, _)| username.clone()))
    }

    fn identity_exists_by_username(&self, username: &str) -> Result<bool> {
        self.online()?;
        Ok(self.state.lock().unwrap().identities.contains_key(username))
    }

    fn create_identity_and_mailbox(&self, identity: &NewIdentity) -> Result<Outcome> {
        self.online()?;
        if self.racing_registration.swap(false, Ordering::SeqCst) {
            return Ok(Outcome::UsernameTaken);
        }

        let mut state = self.state.lock().unwrap();
        if state.identities.values().any(|i| i.secret == identity.client_secret) {
            return Ok(Outcome::SecretTaken);
        }
        if state.identities.contains_key(&identity.username) {
            return Ok(Outcome::UsernameTaken);
        }
        state.identities.insert(
            identity.username.clone(),
            Identity {
                secret: identity.client_secret.clone(),
                name: identity.name.clone(),
                last_address: identity.last_address.clone(),
            },
        );
        state.mailboxes.insert(identity.username.clone(), Vec::new());
        Ok(Outcome::Created)
    }

    fn delete_identity_and_mailbox(&self, username: &str) -> Result<()> {
        self.online()?;
        if self.failing_deletes.load(Ordering::SeqCst) {
            bail!("delete of {} rolled back", username);
        }
        let mut state = self.state.lock().unwrap();
        if state.identities.remove(username).is_none() {
            bail!("no identity {}", username);
        }
        state.mailboxes.remove(username);
        Ok(())
    }

    fn set_last_known_address(&self, username: &str, address: &str) -> Result<()> {
        self.online()?;
        if self.failing_address_writes.load(Ordering::SeqCst) {
            bail!("address write for {} failed", username);
        }
        let mut state = self.state.lock().unwrap();
        match state.identities.get_mut(username) {
            Some(identity) => {
                identity.last_address = Some(address.to_string());
                Ok(())
            }
            None => bail!("no identity {}", username),
        }
    }

    fn list_mailbox(&self, username: &str) -> Result<Vec<StoredMessage>> {
        self.online()?;
        if self.failing_mailbox_lists.load(Ordering::SeqCst) {
            bail!("mailbox of {} unreadable", username);
        }
        let state = self.state.lock().unwrap();
        Ok(state.mailboxes.get(username).cloned().unwrap_or_default())
    }

    fn delete_mailbox_message(&self, username: &str, message: &StoredMessage) -> Result<()> {
        self.online()?;
        if self.failing_mailbox_deletes.load(Ordering::SeqCst) {
            bail!("delete of message {} failed", message.id);
        }
        let mut state = self.state.lock().unwrap();
        if let Some(queued) = state.mailboxes.get_mut(username) {
            queued.retain(|stored| stored.id != message.id);
        }
        Ok(())
    }

    fn enqueue_mailbox_message(&self, username: &str, message: &MailboxMessage) -> Result<()> {
        self.online()?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        match state.mailboxes.get_mut(username) {
            Some(queued) => {
                queued.push(StoredMessage {
                    id,
                    message: message.clone(),
                });
                Ok(())
            }
            None => bail!("no mailbox for {}", username),
        }
    }

    fn probe(&self) -> Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.online()?;
        if self
            .failing_probes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            bail!("probe timed out");
        }
        Ok(())
    }
}

// -- Notifier --

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

pub fn gateway_with(store: Arc<MemoryStore>) -> Gateway {
    Gateway::new(store, Arc::new(NullNotifier))
}

pub fn gateway_with_notifier(store: Arc<MemoryStore>, notifier: Arc<RecordingNotifier>) -> Gateway {
    Gateway::new(store, notifier)
}

// -- Connections --

/// Server side of a pipe. Closing it sends a close frame, like a real
/// WebSocket. With a budget, sends fail once the budget is spent.
struct PipeSink {
    tx: Option<UnboundedSender<Message>>,
    budget: Option<usize>,
}

impl Sink<Message> for PipeSink {
    type Error = axum::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        let this = self.get_mut();
        if let Some(budget) = this.budget.as_mut() {
            if *budget == 0 {
                return Err(axum::Error::new(ConnectionClosed));
            }
            *budget -= 1;
        }
        match &this.tx {
            Some(tx) => tx.send(item).map_err(|_| axum::Error::new(ConnectionClosed)),
            None => Err(axum::Error::new(ConnectionClosed)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if let Some(tx) = self.get_mut().tx.take() {
            let _ = tx.send(Message::Close(None));
        }
        Poll::Ready(Ok(()))
    }
}

/// A server-side [`Connection`] wired to a [`TestPeer`] playing the client.
pub fn pipe() -> (Connection, TestPeer) {
    build_pipe(None)
}

/// Like [`pipe`], but the server can send only `frames` frames.
pub fn pipe_limited(frames: usize) -> (Connection, TestPeer) {
    build_pipe(Some(frames))
}

fn build_pipe(budget: Option<usize>) -> (Connection, TestPeer) {
    let (inbound_tx, inbound_rx) = unbounded_channel::<Message>();
    let (outbound_tx, outbound_rx) = unbounded_channel::<Message>();

    let frames = futures_util::stream::unfold(inbound_rx, |mut rx| async move {
        rx.recv().await.map(|message| (Ok(message), rx))
    });
    let sink = PipeSink {
        tx: Some(outbound_tx),
        budget,
    };

    let addr: SocketAddr = ([127, 0, 0, 1], 40000).into();
    let conn = Connection::new(Box::pin(sink), Box::pin(frames), addr);
    let peer = TestPeer {
        inbound: inbound_tx,
        outbound: outbound_rx,
    };
    (conn, peer)
}

/// The client end of a pipe.
pub struct TestPeer {
    inbound: UnboundedSender<Message>,
    outbound: UnboundedReceiver<Message>,
}

impl TestPeer {
    pub fn send(&self, message: Message) {
        // The server may already have hung up
        let _ = self.inbound.send(message);
    }

    pub fn send_text(&self, text: &str) {
        self.send(Message::Text(text.to_string().into()));
    }

    pub fn send_json<T: Serialize>(&self, value: &T) {
        self.send_text(&serde_json::to_string(value).unwrap());
    }

    /// Send a close frame.
    pub fn close(&self) {
        self.send(Message::Close(None));
    }

    /// Next frame from the server, `None` once the server side is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        tokio::time::timeout(Duration::from_secs(2), self.outbound.recv())
            .await
            .expect("timed out waiting for a frame")
    }

    pub async fn recv_json<T: DeserializeOwned>(&mut self) -> T {
        match self.recv().await {
            Some(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    pub async fn recv_response(&mut self) -> ResponseFlag {
        self.recv_json::<Response>().await.value
    }

    /// The server closed the connection without sending another data frame.
    pub async fn expect_closed(&mut self) {
        match self.recv().await {
            None | Some(Message::Close(_)) => {}
            Some(other) => panic!("expected close, got {:?}", other),
        }
    }

    /// No data frame arrives for a short while.
    pub async fn expect_silence(&mut self) {
        match tokio::time::timeout(Duration::from_millis(50), self.outbound.recv()).await {
            Err(_) | Ok(None) | Ok(Some(Message::Close(_))) => {}
            Ok(Some(other)) => panic!("expected silence, got {:?}", other),
        }
    }

    /// Make every further server send fail, as if the client vanished.
    pub fn break_outbound(&mut self) {
        let (_tx, closed) = unbounded_channel();
        self.outbound = closed;
    }
}

// -- Frames --

/// The client secret the test identities use: SHA-1 of the username.
pub fn secret_for(username: &str) -> Vec<u8> {
    Sha1::digest(username.as_bytes()).to_vec()
}

pub fn auth_frame(username: &str, secret: &[u8]) -> serde_json::Value {
    serde_json::to_value(Authentication {
        client_secret: secret.to_vec(),
        username: username.to_string(),
    })
    .unwrap()
}

pub fn registration_frame(username: &str, secret: &[u8], name: &str) -> serde_json::Value {
    serde_json::to_value(Registration {
        client_secret: secret.to_vec(),
        username: username.to_string(),
        name: name.to_string(),
    })
    .unwrap()
}

pub fn outbound(to: &[&str], text: &str) -> OutboundMessage {
    OutboundMessage {
        timestamp: Utc::now(),
        text: text.to_string(),
        to: to.iter().map(|user| user.to_string()).collect(),
    }
}

pub fn outbound_frame(to: &[&str], text: &str) -> serde_json::Value {
    serde_json::to_value(outbound(to, text)).unwrap()
}
