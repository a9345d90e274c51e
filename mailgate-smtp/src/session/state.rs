//! The session state machine, free of I/O.
//!
//! The driver in [`super::Session`] reads a line, feeds it through [`step`],
//! writes the reply and performs the returned [`Effect`].

use mailgate_common::{config::Encryption, message::Message};

use super::response::Reply;
use crate::{command::Command, policy::PolicyFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Greeting,
    /// STARTTLS listeners before the upgrade.
    StartTlsGate,
    CommandLoop,
    DataCapture,
    Terminal,
}

/// What the driver must do after sending the reply of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    UpgradeTls,
    ReadData,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: State,
    pub reply: Option<Reply>,
    pub effect: Effect,
}

impl Transition {
    const fn stay(state: State, reply: Reply) -> Self {
        Self {
            state,
            reply: Some(reply),
            effect: Effect::None,
        }
    }

    const fn close(reply: Reply) -> Self {
        Self {
            state: State::Terminal,
            reply: Some(reply),
            effect: Effect::Close,
        }
    }
}

/// Sender and recipient captured so far. Either may be empty.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: String,
}

/// Leave [`State::Greeting`]: send the banner and pick the first line state.
pub const fn greet(encryption: Encryption) -> Transition {
    Transition::stay(
        match encryption {
            Encryption::StartTls => State::StartTlsGate,
            Encryption::None | Encryption::Tls => State::CommandLoop,
        },
        Reply::greeting(),
    )
}

/// Advance the state machine by one command line.
///
/// Body lines in [`State::DataCapture`] are not commands; the driver collects
/// them and calls [`complete_data`] instead.
pub fn step(
    state: State,
    envelope: &mut Envelope,
    line: &str,
    policy: &PolicyFilter,
) -> Transition {
    match state {
        State::StartTlsGate => gate(line),
        State::CommandLoop => command(envelope, line, policy),
        State::Greeting | State::DataCapture | State::Terminal => Transition {
            state,
            reply: None,
            effect: Effect::None,
        },
    }
}

fn gate(line: &str) -> Transition {
    match Command::from(line) {
        Command::StartTls => Transition {
            state: State::CommandLoop,
            reply: Some(Reply::ready_for_tls()),
            effect: Effect::UpgradeTls,
        },
        Command::Helo(_) | Command::Ehlo(_) => Transition::stay(State::StartTlsGate, Reply::hello()),
        Command::Quit => Transition::close(Reply::bye()),
        _ => Transition::stay(State::StartTlsGate, Reply::must_starttls()),
    }
}

fn command(envelope: &mut Envelope, line: &str, policy: &PolicyFilter) -> Transition {
    match Command::from(line) {
        Command::Helo(_) | Command::Ehlo(_) => Transition::stay(State::CommandLoop, Reply::hello()),
        Command::MailFrom(from) => {
            envelope.from = from;
            Transition::stay(State::CommandLoop, Reply::ok())
        }
        Command::RcptTo(to) => {
            if policy.is_blocked(&to) {
                Transition::stay(State::CommandLoop, Reply::recipient_blocked())
            } else {
                envelope.to = to;
                Transition::stay(State::CommandLoop, Reply::ok())
            }
        }
        Command::Data => Transition {
            state: State::DataCapture,
            reply: Some(Reply::start_mail_input()),
            effect: Effect::ReadData,
        },
        Command::Quit => Transition::close(Reply::bye()),
        Command::StartTls | Command::Invalid(_) => {
            Transition::stay(State::CommandLoop, Reply::unrecognized())
        }
    }
}

/// A line received while capturing a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLine<'a> {
    End,
    Content(&'a [u8]),
}

impl<'a> From<&'a [u8]> for BodyLine<'a> {
    fn from(line: &'a [u8]) -> Self {
        if line == b"." {
            Self::End
        } else {
            Self::Content(line.strip_prefix(b".").unwrap_or(line))
        }
    }
}

/// Leave [`State::DataCapture`] with the captured body.
///
/// The reply is always `250 OK`: delivery happens after acceptance.
pub fn complete_data(envelope: &Envelope, body: Vec<u8>) -> (Message, Transition) {
    (
        Message::new(envelope.from.clone(), envelope.to.clone(), body),
        Transition::stay(State::CommandLoop, Reply::ok()),
    )
}
