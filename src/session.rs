//! Session state machine: identity and room membership.
//!
//! The session moves `Unidentified → Identified → InRoom` on local intents.
//! Identity and room survive reconnects for the lifetime of the process and
//! are replayed, name first, every time the connection opens, which rebuilds
//! the server-side session without asking the user again.
//!
//! Methods return [`Effects`]: commands to send and notices for the view.
//! The session never touches the connection itself; commands issued while
//! the connection is down are dropped by the connection manager and the
//! stored identity/room is replayed on the next open.

use crate::error::SessionError;
use crate::protocol::OutboundCommand;
use crate::view::ViewNotice;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No display name has been set yet.
    Unidentified,
    /// A display name is set but no room is joined.
    Identified,
    /// A display name is set and a room is joined.
    InRoom,
}

/// Commands and view notices produced by a transition.
#[derive(Debug, Default, PartialEq)]
pub struct Effects {
    pub commands: Vec<OutboundCommand>,
    pub notices: Vec<ViewNotice>,
}

impl Effects {
    fn command(command: OutboundCommand) -> Self {
        Self {
            commands: vec![command],
            notices: Vec::new(),
        }
    }

    fn notice(notice: ViewNotice) -> Self {
        Self {
            commands: Vec::new(),
            notices: vec![notice],
        }
    }
}

/// Owner of the identity, room membership and room directory.
#[derive(Debug, Default)]
pub struct Session {
    identity: Option<String>,
    room: Option<String>,
    directory: Vec<String>,
    game_active: bool,
    list_rooms_when_roomless: bool,
}

impl Session {
    /// Create an unidentified session.
    ///
    /// With `list_rooms_when_roomless`, every prompt for a room is paired with
    /// a `ListRooms` request so the view has a directory to choose from.
    pub fn new(list_rooms_when_roomless: bool) -> Self {
        Self {
            list_rooms_when_roomless,
            ..Self::default()
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        match (&self.identity, &self.room) {
            (None, _) => SessionState::Unidentified,
            (Some(_), None) => SessionState::Identified,
            (Some(_), Some(_)) => SessionState::InRoom,
        }
    }

    /// The display name, if set.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// The joined room, if any.
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// The latest room directory snapshot.
    pub fn directory(&self) -> &[String] {
        &self.directory
    }

    /// Whether the game subsession reports a running game.
    pub fn game_active(&self) -> bool {
        self.game_active
    }

    /// Updated by the dispatcher whenever the game subsession changes phase.
    pub fn set_game_active(&mut self, active: bool) {
        self.game_active = active;
    }

    /// Set (or change) the display name.
    pub fn set_name(&mut self, name: String) -> Effects {
        let first = self.identity.is_none();
        self.identity = Some(name.clone());

        let mut effects = Effects::command(OutboundCommand::SetName(name));
        if first && self.room.is_none() {
            self.prompt_for_room(&mut effects);
        }
        effects
    }

    /// Join (or switch to) a room.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotIdentified`] before a name is set and
    /// [`SessionError::GameInProgress`] while a game is running.
    pub fn join_room(&mut self, room: String) -> Result<Effects, SessionError> {
        if self.identity.is_none() {
            return Err(SessionError::NotIdentified);
        }
        if self.game_active {
            return Err(SessionError::GameInProgress { room });
        }
        self.room = Some(room.clone());
        Ok(Effects::command(OutboundCommand::JoinRoom(room)))
    }

    /// Replay identity and room after the connection opened.
    pub fn on_connection_opened(&mut self) -> Effects {
        let mut effects = Effects::default();
        let Some(name) = &self.identity else {
            effects.notices.push(ViewNotice::NeedIdentity);
            return effects;
        };
        effects
            .commands
            .push(OutboundCommand::SetName(name.clone()));

        match &self.room {
            Some(room) => effects
                .commands
                .push(OutboundCommand::JoinRoom(room.clone())),
            None => self.prompt_for_room(&mut effects),
        }
        effects
    }

    /// Replace the room directory with a fresh snapshot.
    pub fn on_rooms_updated(&mut self, rooms: Vec<String>) -> Effects {
        self.directory.clone_from(&rooms);
        Effects::notice(ViewNotice::RoomsUpdated(rooms))
    }

    /// Surface a server rejection. The session state is left as is.
    pub fn on_error(&mut self, message: String) -> Effects {
        Effects::notice(ViewNotice::Error(message))
    }

    fn prompt_for_room(&self, effects: &mut Effects) {
        effects.notices.push(ViewNotice::NeedRoom);
        if self.list_rooms_when_roomless {
            effects.commands.push(OutboundCommand::ListRooms);
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

    #[test]
    fn starts_unidentified() {
        let session = Session::new(true);
        assert_eq!(session.state(), SessionState::Unidentified);
        assert!(session.identity().is_none());
        assert!(session.room().is_none());
    }

    #[test]
    fn first_name_prompts_for_room() {
        let mut session = Session::new(true);
        let effects = session.set_name("alice".into());
        assert_eq!(
            effects.commands,
            vec![
                OutboundCommand::SetName("alice".into()),
                OutboundCommand::ListRooms
            ]
        );
        assert_eq!(effects.notices, vec![ViewNotice::NeedRoom]);
        assert_eq!(session.state(), SessionState::Identified);
    }

    #[test]
    fn room_prompt_without_listing() {
        let mut session = Session::new(false);
        let effects = session.set_name("alice".into());
        assert_eq!(effects.commands, vec![OutboundCommand::SetName("alice".into())]);
        assert_eq!(effects.notices, vec![ViewNotice::NeedRoom]);
    }

    #[test]
    fn renaming_keeps_state() {
        let mut session = Session::new(true);
        session.set_name("alice".into());
        session.join_room("lobby".into()).unwrap();

        let effects = session.set_name("alicia".into());
        assert_eq!(effects.commands, vec![OutboundCommand::SetName("alicia".into())]);
        assert!(effects.notices.is_empty());
        assert_eq!(session.state(), SessionState::InRoom);
        assert_eq!(session.identity(), Some("alicia"));
    }

    #[test]
    fn join_requires_identity() {
        let mut session = Session::new(true);
        assert_eq!(
            session.join_room("lobby".into()),
            Err(SessionError::NotIdentified)
        );
        assert_eq!(session.state(), SessionState::Unidentified);
    }

    #[test]
    fn join_is_gated_while_game_runs() {
        let mut session = Session::new(true);
        session.set_name("alice".into());
        session.join_room("lobby".into()).unwrap();
        session.set_game_active(true);

        assert!(matches!(
            session.join_room("arena".into()),
            Err(SessionError::GameInProgress { .. })
        ));
        assert_eq!(session.room(), Some("lobby"));

        session.set_game_active(false);
        let effects = session.join_room("arena".into()).unwrap();
        assert_eq!(effects.commands, vec![OutboundCommand::JoinRoom("arena".into())]);
        assert_eq!(session.room(), Some("arena"));
    }

    #[test]
    fn reopen_replays_name_then_room() {
        let mut session = Session::new(true);
        session.set_name("alice".into());
        session.join_room("lobby".into()).unwrap();

        let effects = session.on_connection_opened();
        assert_eq!(
            effects.commands,
            vec![
                OutboundCommand::SetName("alice".into()),
                OutboundCommand::JoinRoom("lobby".into())
            ]
        );
        assert!(effects.notices.is_empty());
    }

    #[test]
    fn reopen_without_name_asks_for_identity() {
        let mut session = Session::new(true);
        let effects = session.on_connection_opened();
        assert!(effects.commands.is_empty());
        assert_eq!(effects.notices, vec![ViewNotice::NeedIdentity]);
        assert_eq!(session.state(), SessionState::Unidentified);
    }

    #[test]
    fn reopen_without_room_asks_for_room() {
        let mut session = Session::new(true);
        session.set_name("alice".into());
        let effects = session.on_connection_opened();
        assert_eq!(
            effects.commands,
            vec![
                OutboundCommand::SetName("alice".into()),
                OutboundCommand::ListRooms
            ]
        );
        assert_eq!(effects.notices, vec![ViewNotice::NeedRoom]);
    }

    #[test]
    fn rooms_replace_directory_in_any_state() {
        let mut session = Session::new(true);
        session.on_rooms_updated(vec!["a".into(), "b".into()]);
        let effects = session.on_rooms_updated(vec!["lobby".into(), "arena".into()]);
        assert_eq!(session.directory(), ["lobby", "arena"]);
        assert_eq!(
            effects.notices,
            vec![ViewNotice::RoomsUpdated(vec!["lobby".into(), "arena".into()])]
        );
    }

    #[test]
    fn errors_do_not_change_state() {
        let mut session = Session::new(true);
        session.set_name("alice".into());
        let effects = session.on_error("room is full".into());
        assert_eq!(effects.notices, vec![ViewNotice::Error("room is full".into())]);
        assert_eq!(session.state(), SessionState::Identified);
    }
}
