//! In-memory fakes of the ports, shared by the unit tests of this crate.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io::Cursor,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, ReadBuf},
    sync::mpsc,
};

use crate::{
    domain::{
        AssetRef, BotId, BotIdentity, ChannelRef, ChatId, MembershipStatus, MessageId,
        MessageRef, UserId,
    },
    messaging::{
        port::{EventSource, MessagingPort, PlatformConnector, PlatformSession},
        types::{InboundEvent, InlineKeyboard, TextFormat, Upload},
    },
    storage::{ObjectBody, ObjectStore},
    Error, Result,
};

/// Poll `f` until it returns true (about two seconds at most).
pub async fn eventually(mut f: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

pub fn identity(id: &str) -> BotIdentity {
    BotIdentity {
        id: BotId(id.to_string()),
        name: None,
        token: format!("tok-{id}"),
        channel: ChannelRef::Id(-100),
        button_label: "Get".to_string(),
        welcome_text: "Welcome!".to_string(),
        welcome_image: None,
        not_subscribed_text: "Subscribe first".to_string(),
        success_text: "Thanks!".to_string(),
        enabled: true,
    }
}

/// One successful outbound action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat: i64,
        text: String,
        format: TextFormat,
        keyboard: Option<InlineKeyboard>,
    },
    Photo {
        chat: i64,
        file_name: String,
        caption: String,
        format: TextFormat,
        keyboard: Option<InlineKeyboard>,
    },
    Document {
        chat: i64,
        file_name: String,
    },
}

impl Sent {
    pub fn text(chat: i64, text: &str, format: TextFormat) -> Self {
        Sent::Text {
            chat,
            text: text.to_string(),
            format,
            keyboard: None,
        }
    }

    pub fn photo(chat: i64, file_name: &str, caption: &str, format: TextFormat) -> Self {
        Sent::Photo {
            chat,
            file_name: file_name.to_string(),
            caption: caption.to_string(),
            format,
            keyboard: None,
        }
    }

    pub fn document(chat: i64, file_name: &str) -> Self {
        Sent::Document {
            chat,
            file_name: file_name.to_string(),
        }
    }

    pub fn with_button(self, label: &str) -> Self {
        let kb = Some(InlineKeyboard::subscribe_check(label));
        match self {
            Sent::Text {
                chat, text, format, ..
            } => Sent::Text {
                chat,
                text,
                format,
                keyboard: kb,
            },
            Sent::Photo {
                chat,
                file_name,
                caption,
                format,
                ..
            } => Sent::Photo {
                chat,
                file_name,
                caption,
                format,
                keyboard: kb,
            },
            other => other,
        }
    }
}

type ErrorFactory = fn() -> Error;

pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sent: Mutex<Vec<Sent>>,
    attempts: AtomicUsize,
    acks: Mutex<Vec<String>>,
    queries: Mutex<Vec<(ChannelRef, UserId)>>,
    reject_markup: AtomicBool,
    fail_plain_photos: AtomicBool,
    fail_markup_photos: AtomicBool,
    hang_sends: AtomicBool,
    text_failure: Mutex<Option<ErrorFactory>>,
    failing_documents: Mutex<HashSet<String>>,
    /// `None` makes the membership query fail.
    membership: Mutex<Option<MembershipStatus>>,
}

impl Default for FakeMessenger {
    fn default() -> Self {
        Self {
            next_id: Mutex::new(1),
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            acks: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            reject_markup: AtomicBool::new(false),
            fail_plain_photos: AtomicBool::new(false),
            fail_markup_photos: AtomicBool::new(false),
            hang_sends: AtomicBool::new(false),
            text_failure: Mutex::new(None),
            failing_documents: Mutex::new(HashSet::new()),
            membership: Mutex::new(Some(MembershipStatus::Member)),
        }
    }
}

impl FakeMessenger {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn acks(&self) -> Vec<String> {
        self.acks.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<(ChannelRef, UserId)> {
        self.queries.lock().unwrap().clone()
    }

    pub fn reject_markup(&self) {
        self.reject_markup.store(true, Ordering::SeqCst);
    }

    pub fn fail_plain_photos(&self) {
        self.fail_plain_photos.store(true, Ordering::SeqCst);
    }

    /// Markup photo sends fail with a transport error (not a format rejection).
    pub fn fail_markup_photos(&self) {
        self.fail_markup_photos.store(true, Ordering::SeqCst);
    }

    pub fn hang_sends(&self) {
        self.hang_sends.store(true, Ordering::SeqCst);
    }

    pub fn fail_texts_with(&self, f: ErrorFactory) {
        *self.text_failure.lock().unwrap() = Some(f);
    }

    pub fn fail_document(&self, file_name: &str) {
        self.failing_documents
            .lock()
            .unwrap()
            .insert(file_name.to_string());
    }

    pub fn set_membership(&self, status: MembershipStatus) {
        *self.membership.lock().unwrap() = Some(status);
    }

    pub fn fail_membership(&self) {
        *self.membership.lock().unwrap() = None;
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        let id = *guard;
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(id),
        }
    }

    async fn begin_send(&self, format: TextFormat) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.hang_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if format == TextFormat::Markup && self.reject_markup.load(Ordering::SeqCst) {
            return Err(Error::FormatRejected(
                "Bad Request: can't parse entities".to_string(),
            ));
        }
        Ok(())
    }

    fn record(&self, chat_id: ChatId, sent: Sent) -> MessageRef {
        self.sent.lock().unwrap().push(sent);
        self.alloc(chat_id)
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef> {
        self.begin_send(format).await?;
        let failure = *self.text_failure.lock().unwrap();
        if let Some(f) = failure {
            return Err(f());
        }
        Ok(self.record(
            chat_id,
            Sent::Text {
                chat: chat_id.0,
                text: text.to_string(),
                format,
                keyboard: keyboard.cloned(),
            },
        ))
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: Upload,
        caption: &str,
        format: TextFormat,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef> {
        self.begin_send(format).await?;
        if format == TextFormat::Plain && self.fail_plain_photos.load(Ordering::SeqCst) {
            return Err(Error::External("upload failed".to_string()));
        }
        if format == TextFormat::Markup && self.fail_markup_photos.load(Ordering::SeqCst) {
            return Err(Error::External("upload failed".to_string()));
        }
        Ok(self.record(
            chat_id,
            Sent::Photo {
                chat: chat_id.0,
                file_name: photo.file_name,
                caption: caption.to_string(),
                format,
                keyboard: keyboard.cloned(),
            },
        ))
    }

    async fn send_document(&self, chat_id: ChatId, document: Upload) -> Result<MessageRef> {
        self.begin_send(TextFormat::Plain).await?;
        let failing = self
            .failing_documents
            .lock()
            .unwrap()
            .contains(&document.file_name);
        if failing {
            return Err(Error::External("upload failed".to_string()));
        }
        Ok(self.record(
            chat_id,
            Sent::Document {
                chat: chat_id.0,
                file_name: document.file_name,
            },
        ))
    }

    async fn answer_callback_query(&self, callback_id: &str) -> Result<()> {
        self.acks.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }

    async fn membership(
        &self,
        channel: &ChannelRef,
        user_id: UserId,
    ) -> Result<MembershipStatus> {
        self.queries.lock().unwrap().push((channel.clone(), user_id));
        let status = *self.membership.lock().unwrap();
        status.ok_or_else(|| Error::External("chat member query failed".to_string()))
    }
}

/// Reader that keeps a count of open object handles.
struct TrackedReader {
    inner: Cursor<Vec<u8>>,
    live: Arc<AtomicUsize>,
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing_gets: Mutex<HashSet<String>>,
    /// Keys with a limited number of successful opens left.
    opens_left: Mutex<HashMap<String, usize>>,
    fail_list: AtomicBool,
    opens: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn with(objects: &[(&str, &[u8])]) -> Self {
        let store = Self::default();
        {
            let mut map = store.objects.lock().unwrap();
            for (k, v) in objects {
                map.insert(k.to_string(), v.to_vec());
            }
        }
        store
    }

    pub fn fail_get(&self, key: &str) {
        self.failing_gets.lock().unwrap().insert(key.to_string());
    }

    /// Let `key` be opened `n` more times, then fail every further `get`.
    pub fn fail_get_after(&self, key: &str, n: usize) {
        self.opens_left.lock().unwrap().insert(key.to_string(), n);
    }

    pub fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    /// Successful `get` calls so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Bodies handed out and not yet dropped.
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<ObjectBody> {
        if self.failing_gets.lock().unwrap().contains(key) {
            return Err(Error::Storage(format!("get {key}: connection reset")));
        }
        if let Some(left) = self.opens_left.lock().unwrap().get_mut(key) {
            if *left == 0 {
                return Err(Error::Storage(format!("get {key}: connection reset")));
            }
            *left -= 1;
        }
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))?;

        self.opens.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        let size = data.len() as u64;
        let reader = TrackedReader {
            inner: Cursor::new(data),
            live: self.live.clone(),
        };
        Ok(ObjectBody::new(Box::new(reader), size))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<AssetRef>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("list {prefix}: timeout")));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| {
                k.strip_prefix(prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .map(|(k, v)| AssetRef {
                key: k.clone(),
                size: v.len() as u64,
            })
            .collect())
    }
}

pub struct FakeEventSource {
    rx: mpsc::UnboundedReceiver<InboundEvent>,
}

#[async_trait]
impl EventSource for FakeEventSource {
    async fn next_event(&mut self) -> Option<InboundEvent> {
        self.rx.recv().await
    }
}

/// Connector whose sessions are driven by the test.
///
/// Tokens starting with `bad` are rejected. Every accepted token gets its own
/// messenger and an event channel; dropping the sender closes the stream.
#[derive(Default)]
pub struct FakeConnector {
    messengers: Mutex<HashMap<String, Arc<FakeMessenger>>>,
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<InboundEvent>>>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn messenger(&self, token: &str) -> Arc<FakeMessenger> {
        self.messengers
            .lock()
            .unwrap()
            .entry(token.to_string())
            .or_default()
            .clone()
    }

    pub fn push(&self, token: &str, event: InboundEvent) -> bool {
        self.senders
            .lock()
            .unwrap()
            .get(token)
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    pub fn close_stream(&self, token: &str) {
        self.senders.lock().unwrap().remove(token);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformConnector for FakeConnector {
    async fn connect(&self, token: &str) -> Result<PlatformSession> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if token.starts_with("bad") {
            return Err(Error::Auth("Unauthorized: invalid token".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().insert(token.to_string(), tx);
        Ok(PlatformSession {
            username: format!("{token}_bot"),
            messenger: self.messenger(token),
            events: Box::new(FakeEventSource { rx }),
        })
    }
}
