//! Routes inbound events and local intents to the state machines.
//!
//! The dispatcher is the only place where the [`Session`] and the
//! [`GameSubsession`] meet. It keeps the session's is-a-game-active flag in
//! sync, turns transitions into [`ViewNotice`]s on the shared queues and
//! hands back the commands the connection manager should send.
//!
//! Nothing here is fatal: a frame or event that does not fit is logged and
//! discarded, and the returned error only tells the caller why.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::codec;
use crate::error::Result;
use crate::game::GameSubsession;
use crate::protocol::{Frame, InboundEvent, OutboundCommand, VariantPayload};
use crate::session::{Effects, Session};
use crate::view::{lock, SharedQueues, ViewNotice};

/// A request from the view layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Set or change the display name.
    SetName(String),
    /// Join or switch rooms.
    JoinRoom(String),
    /// Send chat text to the room.
    SendChat(String),
    /// Play in the running game.
    SubmitGameInput { variant: String, input: Value },
    /// Ask for the room directory.
    ListRooms,
}

/// Router between the wire, the state machines and the view queues.
#[derive(Debug)]
pub struct Dispatcher {
    session: Session,
    game: GameSubsession,
    queues: SharedQueues,
}

impl Dispatcher {
    #[cfg_attr(not(feature = "tokio-runtime"), allow(dead_code))]
    pub(crate) fn new(session: Session, game: GameSubsession, queues: SharedQueues) -> Self {
        Self {
            session,
            game,
            queues,
        }
    }

    /// Read-only view of the session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Read-only view of the game subsession.
    pub fn game(&self) -> &GameSubsession {
        &self.game
    }

    /// Decode and route one frame from the transport.
    ///
    /// Keepalive frames are ignored.
    ///
    /// # Errors
    ///
    /// The reason the frame was discarded
    /// ([`ParlorError::Decode`](crate::ParlorError::Decode) or
    /// [`ParlorError::Game`](crate::ParlorError::Game)). It has already been
    /// logged.
    pub fn on_frame(&mut self, frame: &Frame, now: Instant) -> Result<()> {
        match codec::decode_frame(frame) {
            Ok(Some(event)) => self.on_event(event, now),
            Ok(None) => Ok(()),
            Err(e) => {
                warn!("discarding inbound frame: {e}");
                Err(e.into())
            }
        }
    }

    /// Route one decoded event.
    ///
    /// # Errors
    ///
    /// [`ParlorError::Game`](crate::ParlorError::Game) when the game
    /// subsession refused the event.
    pub fn on_event(&mut self, event: InboundEvent, now: Instant) -> Result<()> {
        debug!(%event, "routing inbound event");
        match event {
            InboundEvent::RoomsUpdated(rooms) => {
                let effects = self.session.on_rooms_updated(rooms);
                self.notify(effects.notices, now);
            }
            InboundEvent::TextReceived(text) => {
                self.notify(vec![ViewNotice::ChatText(text)], now);
            }
            InboundEvent::ErrorReceived(message) => {
                let effects = self.session.on_error(message);
                self.notify(effects.notices, now);
            }
            InboundEvent::GameStarted(start) => {
                let scheduled = self.game.on_game_started(start, now).map_err(|e| {
                    warn!("ignoring game start: {e}");
                    e
                })?;
                self.session.set_game_active(true);
                if scheduled.deliver_at > now {
                    debug!(
                        variant = %scheduled.variant,
                        "game start inside suppression window, delaying notice"
                    );
                }
                lock(&self.queues).schedule(
                    ViewNotice::GameBegins {
                        variant: scheduled.variant,
                        payload: scheduled.payload,
                    },
                    scheduled.deliver_at,
                );
            }
            InboundEvent::GameEnded(outcome) => {
                let outcome = self.game.on_game_ended(outcome, now).map_err(|e| {
                    warn!("ignoring game end: {e}");
                    e
                })?;
                self.session.set_game_active(false);
                self.notify(vec![ViewNotice::GameEnds(outcome)], now);
            }
        }
        Ok(())
    }

    /// Apply a local intent and return the commands to send.
    ///
    /// # Errors
    ///
    /// [`ParlorError::Session`](crate::ParlorError::Session) or
    /// [`ParlorError::Game`](crate::ParlorError::Game) when the intent does
    /// not fit the current state. Nothing is sent in that case.
    pub fn on_intent(&mut self, intent: Intent, now: Instant) -> Result<Vec<OutboundCommand>> {
        let effects = match intent {
            Intent::SetName(name) => self.session.set_name(name),
            Intent::JoinRoom(room) => self.session.join_room(room)?,
            Intent::SendChat(text) => Effects {
                commands: vec![OutboundCommand::SendMessage(text)],
                notices: Vec::new(),
            },
            Intent::SubmitGameInput { variant, input } => {
                let command = self.game.submit_input(&variant, input.clone())?;
                Effects {
                    commands: vec![command],
                    notices: vec![ViewNotice::GameInput(VariantPayload::new(variant, input))],
                }
            }
            Intent::ListRooms => Effects {
                commands: vec![OutboundCommand::ListRooms],
                notices: Vec::new(),
            },
        };
        self.notify(effects.notices, now);
        Ok(effects.commands)
    }

    /// The connection opened: replay identity and room.
    pub fn on_connection_opened(&mut self, now: Instant) -> Vec<OutboundCommand> {
        let effects = self.session.on_connection_opened();
        self.notify(effects.notices, now);
        effects.commands
    }

    /// The connection was lost or closed. A running game is abandoned.
    pub fn on_connection_lost(&mut self, now: Instant) {
        if let Some(outcome) = self.game.abandon(now) {
            debug!(variant = %outcome.variant, "connection lost mid-game, abandoning game");
            self.session.set_game_active(false);
            self.notify(vec![ViewNotice::GameEnds(outcome)], now);
        }
    }

    /// Surface a client-side alert to the view.
    pub fn alert(&mut self, message: impl Into<String>, now: Instant) {
        self.notify(vec![ViewNotice::Error(message.into())], now);
    }

    fn notify(&self, notices: Vec<ViewNotice>, now: Instant) {
        if notices.is_empty() {
            return;
        }
        let mut queues = lock(&self.queues);
        for notice in notices {
            queues.push(notice, now);
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
    use crate::error::{DecodeError, GameError, ParlorError, SessionError};
    use crate::game::GamePhase;
    use crate::games::{GameRegistry, RockPaperScissors};
    use crate::view::ViewQueues;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_millis(100);

    fn dispatcher() -> (Dispatcher, SharedQueues) {
        let queues: SharedQueues = Arc::new(Mutex::new(ViewQueues::default()));
        let dispatcher = Dispatcher::new(
            Session::new(false),
            GameSubsession::new(GameRegistry::default(), WINDOW),
            Arc::clone(&queues),
        );
        (dispatcher, queues)
    }

    fn text(json: &str) -> Frame {
        Frame::Text(json.to_string())
    }

    #[test]
    fn rooms_reach_the_view_in_order() {
        let (mut d, queues) = dispatcher();
        let now = Instant::now();
        d.on_frame(&text(r#"{"Rooms":["lobby","arena"]}"#), now)
            .unwrap();
        assert_eq!(
            lock(&queues).take_ready(now),
            vec![ViewNotice::RoomsUpdated(vec!["lobby".into(), "arena".into()])]
        );
        assert_eq!(d.session().directory(), ["lobby", "arena"]);
    }

    #[test]
    fn malformed_and_keepalive_frames_produce_nothing() {
        let (mut d, queues) = dispatcher();
        let now = Instant::now();
        assert!(matches!(
            d.on_frame(&text("{{{"), now),
            Err(ParlorError::Decode(DecodeError::Malformed(_)))
        ));
        assert!(matches!(
            d.on_frame(&text(r#"{"Nope":1}"#), now),
            Err(ParlorError::Decode(DecodeError::UnknownShape(_)))
        ));
        d.on_frame(&codec::keepalive_frame(), now).unwrap();
        assert!(lock(&queues).is_empty());
    }

    #[test]
    fn duplicate_game_start_is_an_anomaly() {
        let (mut d, queues) = dispatcher();
        let now = Instant::now();
        let start = text(r#"{"GameStarted":{"RockPaperScissors":null}}"#);
        d.on_frame(&start, now).unwrap();
        assert!(matches!(
            d.on_frame(&start, now),
            Err(ParlorError::Game(GameError::AlreadyActive { .. }))
        ));
        assert_eq!(
            lock(&queues).take_ready(now),
            vec![ViewNotice::GameBegins {
                variant: RockPaperScissors::TAG.into(),
                payload: Value::Null
            }]
        );
        assert!(d.session().game_active());
    }

    #[test]
    fn game_input_is_sent_and_echoed() {
        let (mut d, queues) = dispatcher();
        let now = Instant::now();
        d.on_frame(&text(r#"{"GameStarted":"RockPaperScissors"}"#), now)
            .unwrap();
        lock(&queues).take_ready(now);

        let commands = d
            .on_intent(
                Intent::SubmitGameInput {
                    variant: RockPaperScissors::TAG.into(),
                    input: json!("Rock"),
                },
                now,
            )
            .unwrap();
        assert_eq!(
            commands,
            vec![OutboundCommand::SendGameInput(VariantPayload::new(
                RockPaperScissors::TAG,
                json!("Rock")
            ))]
        );
        assert_eq!(
            lock(&queues).take_ready(now),
            vec![ViewNotice::GameInput(VariantPayload::new(
                RockPaperScissors::TAG,
                json!("Rock")
            ))]
        );
        assert_eq!(d.game().phase(), GamePhase::Active);
    }

    #[test]
    fn rejected_input_sends_nothing() {
        let (mut d, queues) = dispatcher();
        let result = d.on_intent(
            Intent::SubmitGameInput {
                variant: RockPaperScissors::TAG.into(),
                input: json!("Rock"),
            },
            Instant::now(),
        );
        assert!(matches!(result, Err(ParlorError::Game(GameError::NotActive))));
        assert!(lock(&queues).is_empty());
    }

    #[test]
    fn end_then_quick_restart_is_delayed() {
        let (mut d, queues) = dispatcher();
        let t0 = Instant::now();
        d.on_frame(&text(r#"{"GameStarted":{"RockPaperScissors":null}}"#), t0)
            .unwrap();
        d.on_frame(
            &text(r#"{"GameEnded":["RockPaperScissors",{"alice":1}]}"#),
            t0,
        )
        .unwrap();
        assert!(!d.session().game_active());

        let t1 = t0 + Duration::from_millis(10);
        d.on_frame(&text(r#"{"GameStarted":{"RockPaperScissors":null}}"#), t1)
            .unwrap();
        assert_eq!(d.game().phase(), GamePhase::Active);

        let first = lock(&queues).take_ready(t1);
        assert_eq!(first.len(), 2);
        assert!(matches!(first[0], ViewNotice::GameBegins { .. }));
        assert!(matches!(first[1], ViewNotice::GameEnds(_)));

        assert!(lock(&queues).take_ready(t1 + WINDOW / 2).is_empty());
        let second = lock(&queues).take_ready(t1 + WINDOW);
        assert!(matches!(second.as_slice(), [ViewNotice::GameBegins { .. }]));
    }

    #[test]
    fn join_during_game_is_refused() {
        let (mut d, _queues) = dispatcher();
        let now = Instant::now();
        d.on_intent(Intent::SetName("alice".into()), now).unwrap();
        d.on_intent(Intent::JoinRoom("lobby".into()), now).unwrap();
        d.on_frame(&text(r#"{"GameStarted":{"RockPaperScissors":null}}"#), now)
            .unwrap();
        assert!(matches!(
            d.on_intent(Intent::JoinRoom("arena".into()), now),
            Err(ParlorError::Session(SessionError::GameInProgress { .. }))
        ));
    }

    #[test]
    fn connection_loss_abandons_the_game() {
        let (mut d, queues) = dispatcher();
        let now = Instant::now();
        d.on_frame(&text(r#"{"GameStarted":{"RockPaperScissors":null}}"#), now)
            .unwrap();
        d.on_connection_lost(now);
        assert_eq!(d.game().phase(), GamePhase::Idle);
        assert!(!d.session().game_active());
        let notices = lock(&queues).take_ready(now);
        assert!(matches!(notices.last(), Some(ViewNotice::GameEnds(_))));
    }

    #[test]
    fn server_error_is_an_alert() {
        let (mut d, queues) = dispatcher();
        let now = Instant::now();
        d.on_frame(&text(r#"{"Error":"Must join room first"}"#), now)
            .unwrap();
        assert_eq!(
            lock(&queues).take_ready(now),
            vec![ViewNotice::Error("Must join room first".into())]
        );
    }
}
