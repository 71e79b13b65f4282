//! Interactive commands typed by the user
// (c) 2025 Ross Younger

use bytes::Bytes;

use crate::protocol::{Action, Packet, PacketError};

/// One line of user input, parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UserCommand {
    /// `ls [path]`
    List(String),
    /// `cd path`
    ChangeDir(String),
    /// `pwd`
    PrintDir,
    /// `get file`
    Get(String),
    /// `quit` or `exit`
    Quit,
    /// `help` or `?`
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum CommandError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub(crate) const HELP: &str = "\
Commands:
  ls [path]   list a directory (default: the current one)
  cd path     change directory
  pwd         show the current directory
  get file    download a file
  quit        disconnect";

impl UserCommand {
    /// Parses a line of input. Blank lines yield `None`.
    pub(crate) fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let cmd = match (verb, arg) {
            ("ls", "") => Self::List(".".into()),
            ("ls", path) => Self::List(path.into()),
            ("cd", "") => return Err(CommandError::Usage("cd path")),
            ("cd", path) => Self::ChangeDir(path.into()),
            ("pwd", _) => Self::PrintDir,
            ("get", "") => return Err(CommandError::Usage("get file")),
            ("get", file) => Self::Get(file.into()),
            ("quit" | "exit", _) => Self::Quit,
            ("help" | "?", _) => Self::Help,
            (other, _) => return Err(CommandError::Unknown(other.into())),
        };
        Ok(Some(cmd))
    }

    /// The request to send to the server, if this command needs one
    pub(crate) fn to_packet(&self) -> Result<Option<Packet>, PacketError> {
        let request =
            |action, arg: &str| Packet::new(action, 0, Bytes::copy_from_slice(arg.as_bytes()));
        Ok(Some(match self {
            Self::List(path) => request(Action::ListDir, path)?,
            Self::ChangeDir(path) => request(Action::ChangeDir, path)?,
            Self::PrintDir => Packet::empty(Action::PrintDir, 0),
            Self::Get(file) => request(Action::OpenRead, file)?,
            Self::Quit | Self::Help => return Ok(None),
        }))
    }
}
