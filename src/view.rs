//! View-facing notifications.
//!
//! The session loop never calls into the view directly. It pushes
//! [`ViewNotice`]s into per-category FIFO queues ([`ViewQueues`]) and the
//! view drains them at its own pace through a [`ViewFeed`], so a slow or
//! not-yet-ready view never blocks the network path.
//!
//! Order is FIFO within a category. The game-start and game-end categories
//! are additionally drained in arrival order relative to each other: a
//! delayed "game begins" also holds back any "game ends" queued after it.
//! No order is promised across the remaining categories.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::warn;

use crate::protocol::{GameOutcome, Scoreboard, VariantPayload};

/// Default per-category queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Something the view should present.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewNotice {
    /// A fresh room directory snapshot.
    RoomsUpdated(Vec<String>),
    /// A game started; `payload` carries what the challenge needs to render.
    GameBegins { variant: String, payload: Value },
    /// The running game ended.
    GameEnds(GameOutcome),
    /// The local player submitted game input.
    GameInput(VariantPayload),
    /// Chat text or a server notice.
    ChatText(String),
    /// A user-visible alert (server rejection or persistent connection trouble).
    Error(String),
    /// The user must pick a display name.
    NeedIdentity,
    /// The user must pick a room.
    NeedRoom,
}

/// Callbacks implemented by the view layer.
pub trait ViewCallbacks {
    /// The room directory changed.
    fn on_rooms_updated(&mut self, rooms: Vec<String>);
    /// A game begins; render its challenge.
    fn on_game_begins(&mut self, variant: String, payload: Value);
    /// The running game ended with this scoreboard.
    fn on_game_ends(&mut self, variant: String, scoreboard: Scoreboard);
    /// Chat text arrived.
    fn on_chat_text(&mut self, text: String);
    /// Show an alert.
    fn on_error(&mut self, message: String);
    /// Ask the user for a display name.
    fn on_need_identity(&mut self);
    /// Ask the user for a room.
    fn on_need_room(&mut self);
    /// The local player's input was sent. Ignored by default.
    fn on_game_input(&mut self, _variant: String, _input: Value) {}
}

impl ViewNotice {
    /// Hand this notice to the matching callback.
    pub fn deliver(self, view: &mut (impl ViewCallbacks + ?Sized)) {
        match self {
            Self::RoomsUpdated(rooms) => view.on_rooms_updated(rooms),
            Self::GameBegins { variant, payload } => view.on_game_begins(variant, payload),
            Self::GameEnds(outcome) => view.on_game_ends(outcome.variant, outcome.scoreboard),
            Self::GameInput(input) => view.on_game_input(input.variant, input.payload),
            Self::ChatText(text) => view.on_chat_text(text),
            Self::Error(message) => view.on_error(message),
            Self::NeedIdentity => view.on_need_identity(),
            Self::NeedRoom => view.on_need_room(),
        }
    }

    fn category(&self) -> Category {
        match self {
            Self::RoomsUpdated(_) => Category::Rooms,
            Self::ChatText(_) => Category::Chat,
            Self::GameBegins { .. } => Category::GameStart,
            Self::GameEnds(_) => Category::GameEnd,
            Self::GameInput(_) => Category::GameInput,
            Self::Error(_) | Self::NeedIdentity | Self::NeedRoom => Category::Alerts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Rooms,
    Chat,
    GameStart,
    GameEnd,
    GameInput,
    Alerts,
}

#[derive(Debug)]
struct Queued {
    seq: u64,
    ready_at: Instant,
    notice: ViewNotice,
}

/// Per-category FIFO queues of pending view notices.
#[derive(Debug)]
pub struct ViewQueues {
    rooms: VecDeque<Queued>,
    chat: VecDeque<Queued>,
    game_start: VecDeque<Queued>,
    game_end: VecDeque<Queued>,
    game_input: VecDeque<Queued>,
    alerts: VecDeque<Queued>,
    capacity: usize,
    next_seq: u64,
    closed: bool,
}

impl Default for ViewQueues {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ViewQueues {
    /// Create empty queues.
    ///
    /// `capacity` bounds every category except game start/end, which must
    /// never lose a notification. Values below 1 are clamped to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: VecDeque::new(),
            chat: VecDeque::new(),
            game_start: VecDeque::new(),
            game_end: VecDeque::new(),
            game_input: VecDeque::new(),
            alerts: VecDeque::new(),
            capacity: capacity.max(1),
            next_seq: 0,
            closed: false,
        }
    }

    /// Queue `notice` for delivery as soon as possible.
    pub fn push(&mut self, notice: ViewNotice, now: Instant) {
        self.schedule(notice, now);
    }

    /// Queue `notice` for delivery no earlier than `ready_at`.
    ///
    /// If the category is full the notice is dropped with a warning.
    pub fn schedule(&mut self, notice: ViewNotice, ready_at: Instant) {
        let category = notice.category();
        let capacity = self.capacity;
        let seq = self.next_seq;
        let queue = self.queue_mut(category);
        let bounded = !matches!(category, Category::GameStart | Category::GameEnd);
        if bounded && queue.len() >= capacity {
            warn!(?category, "view queue full, dropping notice");
            return;
        }
        queue.push_back(Queued {
            seq,
            ready_at,
            notice,
        });
        self.next_seq += 1;
    }

    /// Number of queued notices across all categories.
    pub fn len(&self) -> usize {
        self.rooms.len()
            + self.chat.len()
            + self.game_start.len()
            + self.game_end.len()
            + self.game_input.len()
            + self.alerts.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the session loop has exited.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[cfg_attr(not(feature = "tokio-runtime"), allow(dead_code))]
    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    /// Remove every notice that is ready at `now`, in delivery order.
    pub fn take_ready(&mut self, now: Instant) -> Vec<ViewNotice> {
        let mut ready = Vec::new();
        for category in [Category::Alerts, Category::Rooms, Category::Chat] {
            drain_fifo(self.queue_mut(category), now, &mut ready);
        }
        self.drain_game(now, &mut ready);
        drain_fifo(&mut self.game_input, now, &mut ready);
        ready
    }

    /// Deliver every ready notice to `view`. Returns how many were delivered.
    pub fn drain_ready(&mut self, now: Instant, view: &mut (impl ViewCallbacks + ?Sized)) -> usize {
        let ready = self.take_ready(now);
        let count = ready.len();
        for notice in ready {
            notice.deliver(view);
        }
        count
    }

    fn drain_game(&mut self, now: Instant, out: &mut Vec<ViewNotice>) {
        loop {
            let start = self.game_start.front().map(|q| (q.seq, q.ready_at));
            let end = self.game_end.front().map(|q| (q.seq, q.ready_at));
            let queue = match (start, end) {
                (Some((s, _)), Some((e, _))) if e < s => &mut self.game_end,
                (Some(_), _) => &mut self.game_start,
                (None, Some(_)) => &mut self.game_end,
                (None, None) => return,
            };
            let ready = queue.front().is_some_and(|q| q.ready_at <= now);
            if !ready {
                return;
            }
            if let Some(queued) = queue.pop_front() {
                out.push(queued.notice);
            }
        }
    }

    fn queue_mut(&mut self, category: Category) -> &mut VecDeque<Queued> {
        match category {
            Category::Rooms => &mut self.rooms,
            Category::Chat => &mut self.chat,
            Category::GameStart => &mut self.game_start,
            Category::GameEnd => &mut self.game_end,
            Category::GameInput => &mut self.game_input,
            Category::Alerts => &mut self.alerts,
        }
    }
}

fn drain_fifo(queue: &mut VecDeque<Queued>, now: Instant, out: &mut Vec<ViewNotice>) {
    while queue.front().is_some_and(|q| q.ready_at <= now) {
        if let Some(queued) = queue.pop_front() {
            out.push(queued.notice);
        }
    }
}

/// Queues shared between the session loop (producer) and the view (consumer).
pub(crate) type SharedQueues = Arc<Mutex<ViewQueues>>;

/// Lock the shared queues, recovering from a poisoned lock.
///
/// A panic inside a view callback never happens under this lock (notices are
/// taken out before delivery), so the queue data stays consistent.
pub(crate) fn lock(queues: &SharedQueues) -> MutexGuard<'_, ViewQueues> {
    match queues.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Clock used for every scheduling decision, honoring tokio's paused time.
#[cfg(feature = "tokio-runtime")]
pub(crate) fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

#[cfg(not(feature = "tokio-runtime"))]
pub(crate) fn now() -> Instant {
    Instant::now()
}

/// Consumer side of the view queues, returned by
/// [`ParlorClient::start`](crate::client::ParlorClient::start).
#[derive(Debug, Clone)]
pub struct ViewFeed {
    queues: SharedQueues,
    #[cfg_attr(not(feature = "tokio-runtime"), allow(dead_code))]
    poll_interval: Duration,
}

impl ViewFeed {
    #[cfg_attr(not(feature = "tokio-runtime"), allow(dead_code))]
    pub(crate) fn new(queues: SharedQueues, poll_interval: Duration) -> Self {
        Self {
            queues,
            poll_interval,
        }
    }

    /// Deliver every notice that is ready now. Returns how many were delivered.
    ///
    /// Callbacks run after the queue lock is released.
    pub fn drain(&self, view: &mut (impl ViewCallbacks + ?Sized)) -> usize {
        let ready = lock(&self.queues).take_ready(now());
        let count = ready.len();
        for notice in ready {
            notice.deliver(view);
        }
        count
    }

    /// Returns `true` once the session loop has exited.
    pub fn is_closed(&self) -> bool {
        lock(&self.queues).is_closed()
    }

    /// Number of notices waiting, ready or not.
    pub fn pending(&self) -> usize {
        lock(&self.queues).len()
    }

    /// Poll the queues every `view_poll_interval` and deliver to `view` until
    /// the session loop exits. Notices still delayed at that point are dropped.
    #[cfg(feature = "tokio-runtime")]
    pub async fn run(&self, view: &mut (impl ViewCallbacks + ?Sized)) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.drain(view);
            if self.is_closed() {
                self.drain(view);
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn begins(variant: &str) -> ViewNotice {
        ViewNotice::GameBegins {
            variant: variant.into(),
            payload: Value::Null,
        }
    }

    fn ends(variant: &str) -> ViewNotice {
        ViewNotice::GameEnds(GameOutcome {
            variant: variant.into(),
            scoreboard: Scoreboard::new(),
        })
    }

    #[derive(Default)]
    struct Log(Vec<String>);

    impl ViewCallbacks for Log {
        fn on_rooms_updated(&mut self, rooms: Vec<String>) {
            self.0.push(format!("rooms {}", rooms.join(",")));
        }
        fn on_game_begins(&mut self, variant: String, _payload: Value) {
            self.0.push(format!("begins {variant}"));
        }
        fn on_game_ends(&mut self, variant: String, _scoreboard: Scoreboard) {
            self.0.push(format!("ends {variant}"));
        }
        fn on_chat_text(&mut self, text: String) {
            self.0.push(format!("chat {text}"));
        }
        fn on_error(&mut self, message: String) {
            self.0.push(format!("error {message}"));
        }
        fn on_need_identity(&mut self) {
            self.0.push("need identity".into());
        }
        fn on_need_room(&mut self) {
            self.0.push("need room".into());
        }
    }

    #[test]
    fn categories_are_fifo() {
        let now = Instant::now();
        let mut queues = ViewQueues::default();
        queues.push(ViewNotice::ChatText("one".into()), now);
        queues.push(ViewNotice::ChatText("two".into()), now);
        queues.push(ViewNotice::RoomsUpdated(vec!["lobby".into()]), now);

        let mut log = Log::default();
        assert_eq!(queues.drain_ready(now, &mut log), 3);
        assert_eq!(log.0, vec!["rooms lobby", "chat one", "chat two"]);
        assert!(queues.is_empty());
    }

    #[test]
    fn delayed_begin_waits_for_its_time() {
        let now = Instant::now();
        let later = now + Duration::from_millis(100);
        let mut queues = ViewQueues::default();
        queues.schedule(begins("RockPaperScissors"), later);

        assert!(queues.take_ready(now).is_empty());
        assert_eq!(queues.take_ready(later), vec![begins("RockPaperScissors")]);
    }

    #[test]
    fn game_notices_keep_arrival_order() {
        let now = Instant::now();
        let later = now + Duration::from_millis(100);
        let mut queues = ViewQueues::default();
        queues.schedule(begins("A"), later);
        queues.push(ends("A"), now);

        // The end must not overtake the still-delayed begin.
        assert!(queues.take_ready(now).is_empty());
        assert_eq!(queues.take_ready(later), vec![begins("A"), ends("A")]);
    }

    #[test]
    fn end_then_delayed_begin() {
        let now = Instant::now();
        let later = now + Duration::from_millis(100);
        let mut queues = ViewQueues::default();
        queues.push(ends("A"), now);
        queues.schedule(begins("B"), later);

        assert_eq!(queues.take_ready(now), vec![ends("A")]);
        assert_eq!(queues.take_ready(later), vec![begins("B")]);
    }

    #[test]
    fn full_category_drops_new_notices_but_games_are_unbounded() {
        let now = Instant::now();
        let mut queues = ViewQueues::new(1);
        queues.push(ViewNotice::ChatText("kept".into()), now);
        queues.push(ViewNotice::ChatText("dropped".into()), now);
        queues.push(begins("A"), now);
        queues.push(ends("A"), now);
        queues.push(begins("B"), now);
        assert_eq!(queues.len(), 4);
        assert_eq!(
            queues.take_ready(now).first(),
            Some(&ViewNotice::ChatText("kept".into()))
        );
    }

    #[test]
    fn game_input_defaults_to_ignored() {
        let mut log = Log::default();
        ViewNotice::GameInput(VariantPayload::new("RockPaperScissors", json!("Rock")))
            .deliver(&mut log);
        assert!(log.0.is_empty());
    }

    #[test]
    fn feed_drains_shared_queues() {
        let queues: SharedQueues = Arc::new(Mutex::new(ViewQueues::default()));
        lock(&queues).push(ViewNotice::NeedIdentity, now());
        let feed = ViewFeed::new(Arc::clone(&queues), Duration::from_millis(50));
        assert_eq!(feed.pending(), 1);

        let mut log = Log::default();
        assert_eq!(feed.drain(&mut log), 1);
        assert_eq!(log.0, vec!["need identity"]);
        assert!(!feed.is_closed());
    }
}
